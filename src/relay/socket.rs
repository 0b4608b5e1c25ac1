// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Per-relay connection: framing and liveness tracking only.
//!
//! Deliberately thin: no reconnection policy, no subscription awareness, no
//! timers beyond the handshake deadline. All of that lives in the pool actor
//! (`crate::pool::actor`); this type just owns one socket's read/write
//! halves and liveness bookkeeping.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_wsocket::futures_util::{SinkExt, StreamExt};
use async_wsocket::{ConnectionMode, WsMessage};
use tokio::sync::{Mutex as AsyncMutex, RwLock};

use super::error::Error;
use super::ping::PingTracker;
use crate::message::{ClientMessage, RelayMessage};
use crate::transport::websocket::{Sink, Stream};
use crate::transport::WebSocketTransport;
use crate::url::RelayUrl;

/// An inbound occurrence the pool actor reacts to.
#[derive(Debug)]
pub enum SocketEvent {
    /// A parsed relay -> client frame.
    Message(RelayMessage),
    /// A frame that failed to parse as a relay message.
    ProtocolError,
    /// The connection dropped (transport error or stream end).
    Disconnected,
}

/// Thin wrapper around one relay's text-frame WebSocket.
pub struct RelaySocket {
    url: RelayUrl,
    transport: Arc<dyn WebSocketTransport>,
    sink: AsyncMutex<Option<Sink>>,
    read_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    last_activity: RwLock<Instant>,
    connected: AtomicBool,
    reconnect_attempts: AtomicU32,
    ping: PingTracker,
}

impl RelaySocket {
    /// Create a new, not-yet-connected socket for `url`.
    pub fn new(url: RelayUrl, transport: Arc<dyn WebSocketTransport>) -> Arc<Self> {
        Arc::new(Self {
            url,
            transport,
            sink: AsyncMutex::new(None),
            read_task: std::sync::Mutex::new(None),
            last_activity: RwLock::new(Instant::now()),
            connected: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            ping: PingTracker::default(),
        })
    }

    /// This socket's relay URL.
    pub fn url(&self) -> &RelayUrl {
        &self.url
    }

    /// Whether the socket currently believes it's connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Timestamp of the most recent inbound frame (invariant 6: monotone
    /// non-decreasing while connected).
    pub async fn last_activity(&self) -> Instant {
        *self.last_activity.read().await
    }

    /// Consecutive failed reconnect attempts.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Bump and return the new attempt count.
    pub fn increment_reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Reset the attempt counter, e.g. on `ensure_connected()` or a successful connect.
    pub fn reset_reconnect_attempts(&self) {
        self.reconnect_attempts.store(0, Ordering::SeqCst);
    }

    /// The liveness-probe bookkeeping the pool's health check drives.
    pub fn ping(&self) -> &PingTracker {
        &self.ping
    }

    async fn touch_activity(&self) {
        let mut guard = self.last_activity.write().await;
        *guard = Instant::now();
    }

    /// Connect within `timeout` and spawn the frame-read loop that forwards
    /// parsed [`SocketEvent`]s to `inbound`.
    pub async fn connect(
        self: &Arc<Self>,
        mode: ConnectionMode,
        timeout: Duration,
        inbound: tokio::sync::mpsc::UnboundedSender<(RelayUrl, SocketEvent)>,
    ) -> Result<(), Error> {
        let (sink, mut stream) = self.transport.connect(&self.url, &mode, timeout).await?;

        *self.sink.lock().await = Some(sink);
        self.connected.store(true, Ordering::SeqCst);
        self.touch_activity().await;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                match stream.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        this.touch_activity().await;
                        match RelayMessage::from_json(&text) {
                            Ok(msg) => {
                                if inbound
                                    .send((this.url.clone(), SocketEvent::Message(msg)))
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(
                                    relay = %this.url,
                                    error = %e,
                                    "dropping malformed frame"
                                );
                                if inbound
                                    .send((this.url.clone(), SocketEvent::ProtocolError))
                                    .is_err()
                                {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(_other)) => {
                        // Ping/Pong/Binary: liveness signal only.
                        this.touch_activity().await;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(relay = %this.url, error = %e, "transport error");
                        break;
                    }
                    None => break,
                }
            }

            this.connected.store(false, Ordering::SeqCst);
            *this.sink.lock().await = None;
            let _ = inbound.send((this.url.clone(), SocketEvent::Disconnected));
        });

        *self.read_task.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Serialize and send one outbound frame.
    pub async fn send(&self, msg: &ClientMessage) -> Result<(), Error> {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => sink
                .send(WsMessage::Text(msg.to_json()))
                .await
                .map_err(Error::Transport),
            None => Err(Error::NotConnected),
        }
    }

    /// Record that a liveness probe carrying `nonce` was just sent.
    pub async fn note_ping_sent(&self, nonce: u64) {
        self.ping.set_last_nonce(nonce);
        self.ping.set_replied(false);
        self.ping.just_sent().await;
    }

    /// Record that the outstanding liveness probe was answered.
    pub fn note_ping_replied(&self) {
        self.ping.set_replied(true);
    }

    /// Close the socket cleanly without triggering any reconnection (that
    /// policy lives entirely in the pool).
    pub async fn disconnect(&self) {
        if let Some(handle) = self.read_task.lock().unwrap().take() {
            handle.abort();
        }
        *self.sink.lock().await = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}
