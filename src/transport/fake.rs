// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! In-memory transport double used by scenario tests: a local relay stand-in
//! driven by a `#[tokio::test]` script instead of a live network relay.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_wsocket::futures_util::{Sink as FuturesSink, Stream as FuturesStream};
use async_wsocket::{ConnectionMode, WsMessage};

use super::error::TransportError;
use super::websocket::{Sink, Stream};
use super::{BoxedFuture, WebSocketTransport};
use crate::url::RelayUrl;

struct ChannelStream(tokio::sync::mpsc::UnboundedReceiver<Result<WsMessage, TransportError>>);

impl FuturesStream for ChannelStream {
    type Item = Result<WsMessage, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.poll_recv(cx)
    }
}

struct ChannelSink(tokio::sync::mpsc::UnboundedSender<WsMessage>);

impl FuturesSink<WsMessage> for ChannelSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsMessage) -> Result<(), Self::Error> {
        self.0.send(item).map_err(TransportError::sink)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// The test-facing handle for one registered fake relay connection.
pub struct FakeRelayHandle {
    /// Push a raw text frame to the (simulated) client, as if the relay sent it.
    pub server_tx: tokio::sync::mpsc::UnboundedSender<WsMessage>,
    /// Receive a raw frame the client (pool) sent to this relay.
    pub client_rx: tokio::sync::mpsc::UnboundedReceiver<WsMessage>,
}

struct Registered {
    server_rx: tokio::sync::mpsc::UnboundedReceiver<WsMessage>,
    client_tx: tokio::sync::mpsc::UnboundedSender<WsMessage>,
}

/// A [`WebSocketTransport`] backed by in-memory channels instead of a real
/// socket. Each relay URL must be [`FakeTransport::register`]ed before
/// [`RelaySocket::connect`](crate::socket::RelaySocket::connect) is called
/// against it; calling `connect` on an unregistered URL fails as if the
/// handshake was refused.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    registry: Arc<Mutex<HashMap<RelayUrl, Registered>>>,
}

impl std::fmt::Debug for Registered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registered").finish()
    }
}

impl FakeTransport {
    /// Register a relay URL, returning the test-facing handle to script it.
    pub fn register(&self, url: RelayUrl) -> FakeRelayHandle {
        let (server_tx, server_rx) = tokio::sync::mpsc::unbounded_channel::<WsMessage>();
        let (client_tx, client_rx) = tokio::sync::mpsc::unbounded_channel::<WsMessage>();
        self.registry
            .lock()
            .unwrap()
            .insert(url, Registered { server_rx, client_tx });
        FakeRelayHandle {
            server_tx,
            client_rx,
        }
    }
}

impl WebSocketTransport for FakeTransport {
    fn support_ping(&self) -> bool {
        false
    }

    fn connect<'a>(
        &'a self,
        url: &'a RelayUrl,
        _mode: &'a ConnectionMode,
        _timeout: Duration,
    ) -> BoxedFuture<'a, Result<(Sink, Stream), TransportError>> {
        let entry = self.registry.lock().unwrap().remove(url);
        Box::pin(async move {
            let Registered {
                server_rx,
                client_tx,
            } = entry.ok_or(TransportError::Timeout)?;

            let (to_client_tx, to_client_rx) =
                tokio::sync::mpsc::unbounded_channel::<Result<WsMessage, TransportError>>();
            tokio::spawn(async move {
                let mut server_rx = server_rx;
                while let Some(msg) = server_rx.recv().await {
                    if to_client_tx.send(Ok(msg)).is_err() {
                        break;
                    }
                }
            });

            let sink: Sink = Box::new(ChannelSink(client_tx));
            let stream: Stream = Box::new(ChannelStream(to_client_rx));
            Ok((sink, stream))
        })
    }
}
