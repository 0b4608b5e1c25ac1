// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay pool
//!
//! [`RelayPool`] is a cheap-to-clone handle around the single actor task
//! that owns every socket, buffer, and timer (`actor`). Every method here is
//! a thin request/reply over the actor's command channel.

mod actor;
mod command;
pub mod constants;
pub mod error;
pub mod options;

pub use self::actor::RelayPoolNotification;
pub use self::error::Error;
pub use self::options::{QuerySource, RelayPoolOptions};

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};

use self::command::Command;
use crate::event::Event;
use crate::filter::Filter;
use crate::optimizer::Request;
use crate::policy::EventFilter;
use crate::publish::PublishResponse;
use crate::subscription::SubscriptionId;
use crate::transport::websocket::{DefaultWebsocketTransport, IntoWebSocketTransport};
use crate::url::RelayUrl;

/// Handle to a running relay pool.
///
/// Cloning is cheap: every clone shares the same actor and notification
/// broadcast channel.
#[derive(Debug, Clone)]
pub struct RelayPool {
    cmd_tx: mpsc::UnboundedSender<Command>,
    notify_tx: broadcast::Sender<RelayPoolNotification>,
    disposed: Arc<AtomicBool>,
}

impl RelayPool {
    /// Spawn a new pool using the default (`async-wsocket`-backed) transport.
    pub fn new(options: RelayPoolOptions) -> Self {
        Self::with_transport(DefaultWebsocketTransport, options)
    }

    /// Spawn a new pool against a custom transport (e.g. the in-memory fake
    /// used by tests).
    pub fn with_transport<T>(transport: T, options: RelayPoolOptions) -> Self
    where
        T: IntoWebSocketTransport,
    {
        let (cmd_tx, notify_tx) = actor::spawn(transport.into_transport(), options);
        Self {
            cmd_tx,
            notify_tx,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to pool notifications (events, state snapshots, publish
    /// results, shutdown).
    pub fn notifications(&self) -> broadcast::Receiver<RelayPoolNotification> {
        self.notify_tx.subscribe()
    }

    /// `Err(Error::Disposed)` once [`RelayPool::dispose`] has resolved on any
    /// clone of this handle; every other public method calls this before
    /// touching the actor's command channel.
    fn ensure_not_disposed(&self) -> Result<(), Error> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    /// Issue a blocking query: waits until every target relay reports EOSE
    /// (or the response timeout elapses), then resolves with whatever was
    /// deduplicated so far.
    pub async fn query(
        &self,
        subscription_id: SubscriptionId,
        filters: Vec<Filter>,
        relays: HashSet<RelayUrl>,
        event_filter: Option<EventFilter>,
    ) -> Result<Vec<Event>, Error> {
        self.ensure_not_disposed()?;
        let (tx, rx) = oneshot::channel();
        let mut source = QuerySource::blocking(relays);
        if let Some(filter) = event_filter {
            source = source.event_filter(filter);
        }
        let request = Request {
            subscription_id,
            filters,
        };
        self.cmd_tx
            .send(Command::Query {
                request,
                source,
                completer: Some(tx),
            })
            .map_err(|_| Error::ActorGone)?;
        rx.await.map_err(|_| Error::ActorGone)
    }

    /// Start a streaming subscription. Matching events arrive as
    /// [`RelayPoolNotification::Events`] on every receiver returned by
    /// [`RelayPool::notifications`], until [`RelayPool::unsubscribe`] is
    /// called.
    pub fn subscribe(
        &self,
        subscription_id: SubscriptionId,
        filters: Vec<Filter>,
        relays: HashSet<RelayUrl>,
        event_filter: Option<EventFilter>,
    ) -> Result<(), Error> {
        self.ensure_not_disposed()?;
        let mut source = QuerySource::streaming(relays);
        if let Some(filter) = event_filter {
            source = source.event_filter(filter);
        }
        let request = Request {
            subscription_id,
            filters,
        };
        self.cmd_tx
            .send(Command::Query {
                request,
                source,
                completer: None,
            })
            .map_err(|_| Error::ActorGone)
    }

    /// Close a subscription, sending `CLOSE` to every connected target relay.
    pub fn unsubscribe(&self, subscription_id: SubscriptionId) -> Result<(), Error> {
        self.ensure_not_disposed()?;
        self.cmd_tx
            .send(Command::Unsubscribe { subscription_id })
            .map_err(|_| Error::ActorGone)
    }

    /// Publish one or more events to `relays`, waiting for every relay's
    /// `OK` verdict (or the response timeout).
    pub async fn publish(&self, events: Vec<Event>, relays: HashSet<RelayUrl>) -> Result<PublishResponse, Error> {
        self.ensure_not_disposed()?;
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Publish {
                events,
                relays,
                reply: tx,
            })
            .map_err(|_| Error::ActorGone)?;
        rx.await.map_err(|_| Error::ActorGone)
    }

    /// Reset backoff and force an immediate reconnect attempt for any relay
    /// currently `waiting`/`failed`/`disconnected` with a live subscription.
    pub fn ensure_connected(&self) -> Result<(), Error> {
        self.ensure_not_disposed()?;
        self.cmd_tx.send(Command::EnsureConnected).map_err(|_| Error::ActorGone)
    }

    /// Tear down every socket, timer, and buffer. Calls made after this
    /// resolves fail with [`Error::Disposed`]. Idempotent: disposing an
    /// already-disposed pool is a no-op.
    pub async fn dispose(&self) -> Result<(), Error> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Dispose { reply: tx })
            .map_err(|_| Error::ActorGone)?;
        rx.await.map_err(|_| Error::ActorGone)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_wsocket::WsMessage;
    use serde_json::json;

    use super::*;
    use crate::event::{Event, EventId};
    use crate::transport::fake::{FakeRelayHandle, FakeTransport};

    fn relay(n: u8) -> RelayUrl {
        RelayUrl::parse(&format!("wss://r{n}.example")).unwrap()
    }

    fn sample_event(id_byte: u8, created_at: u64) -> Event {
        Event {
            id: EventId::from_bytes([id_byte; 32]),
            pubkey: "a".repeat(64),
            created_at,
            kind: 1,
            tags: vec![],
            content: String::new(),
            sig: "b".repeat(128),
        }
    }

    fn send_event_frame(handle: &FakeRelayHandle, subscription_id: &SubscriptionId, event: &Event) {
        let frame = json!(["EVENT", subscription_id.to_string(), event]).to_string();
        handle.server_tx.send(WsMessage::Text(frame)).unwrap();
    }

    fn send_eose(handle: &FakeRelayHandle, subscription_id: &SubscriptionId) {
        let frame = json!(["EOSE", subscription_id.to_string()]).to_string();
        handle.server_tx.send(WsMessage::Text(frame)).unwrap();
    }

    fn send_ok(handle: &FakeRelayHandle, event_id: EventId, accepted: bool, message: &str) {
        let frame = json!(["OK", event_id.to_string(), accepted, message]).to_string();
        handle.server_tx.send(WsMessage::Text(frame)).unwrap();
    }

    /// Read the next outbound client frame and pull out the REQ's subscription id.
    async fn recv_req_sub_id(handle: &mut FakeRelayHandle) -> String {
        match handle.client_rx.recv().await.expect("relay never received a frame") {
            WsMessage::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value[0], "REQ");
                value[1].as_str().unwrap().to_string()
            }
            other => panic!("unexpected outbound frame: {other:?}"),
        }
    }

    // S1 — dedup across two relays for a blocking query.
    #[tokio::test]
    async fn dedup_across_two_relays() {
        let transport = FakeTransport::default();
        let r1 = relay(1);
        let r2 = relay(2);
        let mut h1 = transport.register(r1.clone());
        let mut h2 = transport.register(r2.clone());

        let pool = RelayPool::with_transport(transport, RelayPoolOptions::default());
        let relays: HashSet<RelayUrl> = [r1.clone(), r2.clone()].into_iter().collect();
        let sub_id = SubscriptionId::generate("s1");
        let filters = vec![Filter::new().kinds(vec![1])];

        let query = tokio::spawn({
            let pool = pool.clone();
            let sub_id = sub_id.clone();
            async move { pool.query(sub_id, filters, relays, None).await.unwrap() }
        });

        let wire_sub_id = recv_req_sub_id(&mut h1).await;
        let _ = recv_req_sub_id(&mut h2).await;
        let wire_sub_id = SubscriptionId::new(wire_sub_id);

        let a = sample_event(0xAA, 1);
        let b = sample_event(0xBB, 2);
        let c = sample_event(0xCC, 3);
        let d = sample_event(0xDD, 4);

        send_event_frame(&h1, &wire_sub_id, &a);
        send_event_frame(&h1, &wire_sub_id, &b);
        send_event_frame(&h1, &wire_sub_id, &c);
        send_eose(&h1, &wire_sub_id);

        send_event_frame(&h2, &wire_sub_id, &b);
        send_event_frame(&h2, &wire_sub_id, &c);
        send_event_frame(&h2, &wire_sub_id, &d);
        send_eose(&h2, &wire_sub_id);

        let events = tokio::time::timeout(Duration::from_secs(1), query)
            .await
            .expect("query timed out")
            .unwrap();

        let ids: HashSet<EventId> = events.iter().map(|e| e.id).collect();
        assert_eq!(
            ids,
            [a.id, b.id, c.id, d.id].into_iter().collect::<HashSet<_>>()
        );

        // Completion tears the subscription down on the wire on both relays.
        match h1.client_rx.recv().await.unwrap() {
            WsMessage::Text(text) => assert!(text.starts_with(r#"["CLOSE","#)),
            other => panic!("unexpected frame: {other:?}"),
        }
        match h2.client_rx.recv().await.unwrap() {
            WsMessage::Text(text) => assert!(text.starts_with(r#"["CLOSE","#)),
            other => panic!("unexpected frame: {other:?}"),
        }

        pool.dispose().await.unwrap();
    }

    // S2 — blocking query resolves at the response timeout when one relay
    // never answers.
    #[tokio::test]
    async fn blocking_timeout_with_one_silent_relay() {
        let transport = FakeTransport::default();
        let r1 = relay(1);
        let r2 = relay(2);
        let mut h1 = transport.register(r1.clone());
        let _h2 = transport.register(r2.clone());

        let options = RelayPoolOptions::default().response_timeout(Duration::from_millis(200));
        let pool = RelayPool::with_transport(transport, options);
        let relays: HashSet<RelayUrl> = [r1.clone(), r2.clone()].into_iter().collect();
        let sub_id = SubscriptionId::generate("s2");
        let filters = vec![Filter::new().kinds(vec![1])];

        let query = tokio::spawn({
            let pool = pool.clone();
            let sub_id = sub_id.clone();
            async move { pool.query(sub_id, filters, relays, None).await.unwrap() }
        });

        let wire_sub_id = SubscriptionId::new(recv_req_sub_id(&mut h1).await);

        let a = sample_event(0xAA, 1);
        send_event_frame(&h1, &wire_sub_id, &a);
        send_eose(&h1, &wire_sub_id);
        // r2 never answers; only the response timeout resolves the query.

        let started = tokio::time::Instant::now();
        let events = tokio::time::timeout(Duration::from_secs(1), query)
            .await
            .expect("query timed out")
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(180));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, a.id);

        pool.dispose().await.unwrap();
    }

    // S3 — a streaming subscription's flush window batches events that
    // arrive close together, and opens a fresh batch for later ones.
    #[tokio::test]
    async fn streaming_flush_window_batches_events() {
        let transport = FakeTransport::default();
        let r1 = relay(1);
        let mut h1 = transport.register(r1.clone());

        let options = RelayPoolOptions::default().streaming_buffer_window(Duration::from_millis(100));
        let pool = RelayPool::with_transport(transport, options);
        let mut notifications = pool.notifications();
        let relays: HashSet<RelayUrl> = [r1.clone()].into_iter().collect();
        let sub_id = SubscriptionId::generate("s3");
        let filters = vec![Filter::new().kinds(vec![1])];

        pool.subscribe(sub_id.clone(), filters, relays, None).unwrap();
        let wire_sub_id = SubscriptionId::new(recv_req_sub_id(&mut h1).await);

        send_eose(&h1, &wire_sub_id);

        let e1 = sample_event(1, 1);
        let e2 = sample_event(2, 2);
        let e3 = sample_event(3, 3);
        let e4 = sample_event(4, 4);
        let e5 = sample_event(5, 5);

        send_event_frame(&h1, &wire_sub_id, &e1);
        tokio::time::sleep(Duration::from_millis(30)).await;
        send_event_frame(&h1, &wire_sub_id, &e2);
        tokio::time::sleep(Duration::from_millis(30)).await;
        send_event_frame(&h1, &wire_sub_id, &e3);
        tokio::time::sleep(Duration::from_millis(30)).await;
        send_event_frame(&h1, &wire_sub_id, &e4);

        let first = tokio::time::timeout(Duration::from_millis(500), notifications.recv())
            .await
            .expect("timed out waiting for first flush")
            .unwrap();
        let RelayPoolNotification::Events { events, .. } = first else {
            panic!("expected an Events notification");
        };
        let first_ids: HashSet<EventId> = events.iter().map(|e| e.id).collect();
        assert_eq!(
            first_ids,
            [e1.id, e2.id, e3.id, e4.id].into_iter().collect::<HashSet<_>>()
        );

        tokio::time::sleep(Duration::from_millis(160)).await;
        send_event_frame(&h1, &wire_sub_id, &e5);

        let second = tokio::time::timeout(Duration::from_millis(500), notifications.recv())
            .await
            .expect("timed out waiting for second flush")
            .unwrap();
        let RelayPoolNotification::Events { events, .. } = second else {
            panic!("expected an Events notification");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, e5.id);

        pool.dispose().await.unwrap();
    }

    // S4 — since-injection: the same canonical request issued twice against
    // one relay carries a raised `since` the second time, while the caller's
    // own filters stay untouched.
    #[tokio::test]
    async fn since_injection_across_two_queries() {
        let transport = FakeTransport::default();
        let r1 = relay(1);

        let pool = RelayPool::with_transport(transport.clone(), RelayPoolOptions::default());
        let relays: HashSet<RelayUrl> = [r1.clone()].into_iter().collect();
        let filters = vec![Filter::new().kinds(vec![1])];

        let mut h1 = transport.register(r1.clone());
        let sub_id_a = SubscriptionId::generate("feed");
        let query_a = tokio::spawn({
            let pool = pool.clone();
            let filters = filters.clone();
            let relays = relays.clone();
            async move { pool.query(sub_id_a, filters, relays, None).await.unwrap() }
        });
        let wire_sub_id_a = SubscriptionId::new(recv_req_sub_id(&mut h1).await);
        let e1 = sample_event(1, 1_700_000_000);
        send_event_frame(&h1, &wire_sub_id_a, &e1);
        send_eose(&h1, &wire_sub_id_a);
        let first_events = tokio::time::timeout(Duration::from_secs(1), query_a)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first_events.len(), 1);

        // The socket opened for the first query stays connected across
        // queries, so the second query's REQ rides the same transport pair.
        let sub_id_b = SubscriptionId::generate("feed");
        let query_b = tokio::spawn({
            let pool = pool.clone();
            let filters = filters.clone();
            let relays = relays.clone();
            async move { pool.query(sub_id_b, filters, relays, None).await.unwrap() }
        });

        let frame = match h1.client_rx.recv().await.unwrap() {
            WsMessage::Text(text) => text,
            other => panic!("unexpected frame: {other:?}"),
        };
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        let since = value[2]["since"].as_u64().expect("since should be injected");
        assert!(since >= 1_700_000_000);

        let wire_sub_id_b = SubscriptionId::new(value[1].as_str().unwrap().to_string());
        send_eose(&h1, &wire_sub_id_b);
        let second_events = tokio::time::timeout(Duration::from_secs(1), query_b)
            .await
            .unwrap()
            .unwrap();
        assert!(second_events.is_empty());

        // The caller's own filter list is never mutated in place.
        assert_eq!(filters[0].since, None);

        pool.dispose().await.unwrap();
    }

    // S5 — publish with mixed per-relay verdicts: accepted, explicitly
    // rejected, and silently timed out.
    #[tokio::test]
    async fn publish_with_mixed_verdicts() {
        let transport = FakeTransport::default();
        let r1 = relay(1);
        let r2 = relay(2);
        let r3 = relay(3);
        let h1 = transport.register(r1.clone());
        let h2 = transport.register(r2.clone());
        let _h3 = transport.register(r3.clone());

        let options = RelayPoolOptions::default().response_timeout(Duration::from_millis(200));
        let pool = RelayPool::with_transport(transport, options);
        let relays: HashSet<RelayUrl> = [r1.clone(), r2.clone(), r3.clone()].into_iter().collect();
        let event = sample_event(0xEE, 1);
        let event_id = event.id;

        let publish = tokio::spawn({
            let pool = pool.clone();
            let relays = relays.clone();
            let event = event.clone();
            async move { pool.publish(vec![event], relays).await.unwrap() }
        });

        // Drain each relay's inbound EVENT frame before answering.
        let _ = h1.client_rx.recv().await.unwrap();
        let _ = h2.client_rx.recv().await.unwrap();

        send_ok(&h1, event_id, true, "");
        send_ok(&h2, event_id, false, "blocked");
        // r3 never answers.

        let response = tokio::time::timeout(Duration::from_secs(1), publish)
            .await
            .expect("publish timed out")
            .unwrap();

        assert_eq!(
            response.accepted.get(&r1).unwrap(),
            &[event_id].into_iter().collect::<HashSet<_>>()
        );
        assert_eq!(
            response.rejected.get(&r2).unwrap().get(&event_id).unwrap(),
            "blocked"
        );
        assert_eq!(
            response.rejected.get(&r3).unwrap().get(&event_id).unwrap(),
            "timeout"
        );

        pool.dispose().await.unwrap();
    }

    // S6 — ensure_connected forces an immediate reconnect attempt (instead of
    // waiting out the scheduled backoff) and resends every live subscription's
    // REQ once the relay is back.
    #[tokio::test]
    async fn ensure_connected_forces_immediate_reconnect() {
        let transport = FakeTransport::default();
        let r1 = relay(1);

        // r1 is not registered yet, so the first connect attempt fails and the
        // subscription's relay phase falls back to `Waiting` with a scheduled
        // (long) backoff.
        let pool = RelayPool::with_transport(transport.clone(), RelayPoolOptions::default());
        let relays: HashSet<RelayUrl> = [r1.clone()].into_iter().collect();
        let sub_id = SubscriptionId::generate("s6");
        let filters = vec![Filter::new().kinds(vec![1])];
        pool.subscribe(sub_id, filters, relays, None).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        // Relay comes up; ensure_connected should retry right away rather than
        // waiting for the scheduled backoff to fire.
        let mut h1 = transport.register(r1.clone());
        pool.ensure_connected().unwrap();

        let _ = tokio::time::timeout(Duration::from_secs(1), recv_req_sub_id(&mut h1))
            .await
            .expect("ensure_connected never resent the subscription's REQ");

        pool.dispose().await.unwrap();
    }

    // Calls made after dispose() fail with Error::Disposed, on every clone.
    #[tokio::test]
    async fn calls_after_dispose_return_disposed_error() {
        let transport = FakeTransport::default();
        let r1 = relay(1);
        let _h1 = transport.register(r1.clone());

        let pool = RelayPool::with_transport(transport, RelayPoolOptions::default());
        let other_clone = pool.clone();

        pool.dispose().await.unwrap();

        let relays: HashSet<RelayUrl> = [r1].into_iter().collect();
        let filters = vec![Filter::new().kinds(vec![1])];
        let sub_id = SubscriptionId::generate("disposed");

        assert!(matches!(
            other_clone.query(sub_id.clone(), filters, relays, None).await,
            Err(Error::Disposed)
        ));
        assert!(matches!(other_clone.unsubscribe(sub_id), Err(Error::Disposed)));
        assert!(matches!(other_clone.ensure_connected(), Err(Error::Disposed)));

        // Disposing again is a no-op, not an error.
        assert!(other_clone.dispose().await.is_ok());
    }
}
