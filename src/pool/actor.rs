// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! The pool's single-actor-inbox task.
//!
//! One spawned task owns every mutable piece of pool state (sockets,
//! per-subscription buffers, the since-optimizer, publish trackers) and
//! drains a single `mpsc` channel carrying both caller [`Command`]s and
//! internally-generated events (inbound frames, timers). Nothing outside
//! this file ever locks or mutates that state directly, which is what keeps
//! every mutation serialized even though the surrounding runtime is
//! multi-threaded.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_wsocket::ConnectionMode;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::command::Command;
use super::constants;
use super::options::{QuerySource, RelayPoolOptions};
use crate::buffer::{AddEventOutcome, EoseOutcome, FlushPolicy, SubscriptionBuffer};
use crate::event::{Event, EventId};
use crate::filter::Filter;
use crate::message::{ClientMessage, RelayMessage};
use crate::optimizer::{Request, RequestOptimizer};
use crate::policy::EventFilter;
use crate::publish::{PublishResponse, PublishTracker};
use crate::relay::socket::{RelaySocket, SocketEvent};
use crate::state::{LogEntry, LogLevel, LogRing, PoolState, RelaySubPhase, Subscription as StateSubscription};
use crate::subscription::SubscriptionId;
use crate::transport::WebSocketTransport;
use crate::url::RelayUrl;

/// Subscription-id prefix used for the zero-limit liveness probe. Never
/// surfaced to callers.
const HEALTH_PROBE_PREFIX: &str = "health";

/// Pool -> embedder notifications.
#[derive(Debug, Clone)]
pub enum RelayPoolNotification {
    /// A flush of deduplicated events for one subscription. For a streaming
    /// subscription this fires repeatedly, once per `batch_window`; a
    /// blocking query's events are delivered through the oneshot returned by
    /// the call instead, never through this variant.
    Events {
        /// Subscription the flush belongs to
        subscription_id: SubscriptionId,
        /// Deduplicated events accumulated since the last flush
        events: Vec<Event>,
        /// Every relay that delivered each event id
        relays_for_id: HashMap<EventId, std::collections::HashSet<RelayUrl>>,
    },
    /// A fresh immutable snapshot of the whole pool's state.
    State(Arc<PoolState>),
    /// The terminal result of one `publish` call.
    PublishResponse {
        /// Id of the publish call this result belongs to
        publish_id: u64,
        /// Aggregated per-relay verdicts
        response: PublishResponse,
    },
    /// The pool has been disposed; no further notifications will follow.
    Shutdown,
}

/// Everything the actor tracks for one live subscription.
struct SubEntry {
    buffer: SubscriptionBuffer,
    /// Original, un-optimized request (re-sent verbatim on reconnect; the
    /// optimizer re-derives the since-injection per relay each time).
    request: Request,
    relay_phases: HashMap<RelayUrl, RelaySubPhase>,
    event_filter: Option<EventFilter>,
    batch_flush_armed: bool,
}

/// Everything the actor tracks for one in-flight `publish` call.
struct PublishEntry {
    tracker: PublishTracker,
    reply: Option<oneshot::Sender<PublishResponse>>,
}

/// Internally-generated events that share the actor's single inbox with
/// [`Command`]s.
enum Internal {
    /// A parsed frame, or a disconnect, from one relay's read loop.
    Inbound(RelayUrl, SocketEvent),
    /// A debounced per-subscription flush is due.
    BatchFlush(SubscriptionId),
    /// A blocking query's overall deadline elapsed.
    FinalTimeout(SubscriptionId),
    /// A publish call's response timeout elapsed.
    PublishTimeout(u64),
    /// Backoff for a `waiting` relay has elapsed; try again.
    ReconnectDue(RelayUrl),
    /// A liveness probe went unanswered past `relay_timeout`.
    PingTimeout(RelayUrl),
    /// Time to sweep every socket for idleness.
    HealthCheckTick,
    /// The debounced state-snapshot timer is due.
    StateEmitTick,
}

/// The single message type drained by the actor's one inbox.
enum Msg {
    Cmd(Command),
    Internal(Internal),
}

/// Owns all pool state; reachable only through its `mpsc` inbox.
struct Actor {
    transport: Arc<dyn WebSocketTransport>,
    options: RelayPoolOptions,
    sockets: HashMap<RelayUrl, Arc<RelaySocket>>,
    subs: HashMap<SubscriptionId, SubEntry>,
    optimizer: RequestOptimizer,
    publishes: HashMap<u64, PublishEntry>,
    next_publish_id: u64,
    notify_tx: broadcast::Sender<RelayPoolNotification>,
    logs: LogRing,
    inbound_tx: mpsc::UnboundedSender<(RelayUrl, SocketEvent)>,
    msg_tx: mpsc::UnboundedSender<Msg>,
    state_emit_scheduled: bool,
    disposed: bool,
    protocol_errors: HashMap<RelayUrl, VecDeque<Instant>>,
}

/// Spawn the actor and the two bridging tasks that funnel commands and
/// per-socket events into its single inbox. Returns the command sender and a
/// fresh notification receiver (further receivers via
/// `notify_tx.subscribe()`, exposed by [`super::RelayPool`]).
pub fn spawn(
    transport: Arc<dyn WebSocketTransport>,
    options: RelayPoolOptions,
) -> (
    mpsc::UnboundedSender<Command>,
    broadcast::Sender<RelayPoolNotification>,
) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (msg_tx, msg_rx) = mpsc::unbounded_channel::<Msg>();
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<(RelayUrl, SocketEvent)>();
    let (notify_tx, _) = broadcast::channel(options.notification_channel_size);

    let bridge = msg_tx.clone();
    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            if bridge.send(Msg::Cmd(cmd)).is_err() {
                break;
            }
        }
    });

    let bridge = msg_tx.clone();
    tokio::spawn(async move {
        while let Some((url, event)) = inbound_rx.recv().await {
            if bridge.send(Msg::Internal(Internal::Inbound(url, event))).is_err() {
                break;
            }
        }
    });

    let actor = Actor {
        transport,
        options,
        sockets: HashMap::new(),
        subs: HashMap::new(),
        optimizer: RequestOptimizer::new(),
        publishes: HashMap::new(),
        next_publish_id: 0,
        notify_tx: notify_tx.clone(),
        logs: LogRing::default(),
        inbound_tx,
        msg_tx,
        state_emit_scheduled: false,
        disposed: false,
        protocol_errors: HashMap::new(),
    };

    actor.schedule_health_check_tick();
    tokio::spawn(actor.run(msg_rx));

    (cmd_tx, notify_tx)
}

impl Actor {
    async fn run(mut self, mut msg_rx: mpsc::UnboundedReceiver<Msg>) {
        while let Some(msg) = msg_rx.recv().await {
            match msg {
                Msg::Cmd(cmd) => self.handle_command(cmd).await,
                Msg::Internal(internal) => self.handle_internal(internal).await,
            }
            if self.disposed {
                break;
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Query {
                request,
                source,
                completer,
            } => self.handle_query(request, source, completer).await,
            Command::Unsubscribe { subscription_id } => self.handle_unsubscribe(subscription_id).await,
            Command::Publish { events, relays, reply } => self.handle_publish(events, relays, reply).await,
            Command::EnsureConnected => self.handle_ensure_connected().await,
            Command::Dispose { reply } => self.handle_dispose(reply).await,
        }
    }

    async fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Inbound(relay, event) => self.handle_inbound(relay, event).await,
            Internal::BatchFlush(subscription_id) => self.handle_batch_flush(subscription_id).await,
            Internal::FinalTimeout(subscription_id) => self.handle_final_timeout(subscription_id).await,
            Internal::PublishTimeout(publish_id) => self.finish_publish(publish_id),
            Internal::ReconnectDue(relay) => self.handle_reconnect_due(relay).await,
            Internal::PingTimeout(relay) => self.handle_ping_timeout(relay).await,
            Internal::HealthCheckTick => self.handle_health_check_tick().await,
            Internal::StateEmitTick => self.handle_state_emit_tick(),
        }
    }

    // -- Query / subscribe -------------------------------------------------

    async fn handle_query(
        &mut self,
        request: Request,
        source: QuerySource,
        completer: Option<oneshot::Sender<Vec<Event>>>,
    ) {
        let subscription_id = request.subscription_id.clone();
        let is_streaming = source.stream;
        let flush_policy = match completer {
            Some(tx) => FlushPolicy::Batched(Some(tx)),
            None => FlushPolicy::Progressive,
        };
        let relay_phases = source
            .relays
            .iter()
            .cloned()
            .map(|r| (r, RelaySubPhase::Disconnected))
            .collect();
        let buffer = SubscriptionBuffer::new(source.relays.clone(), flush_policy);

        self.subs.insert(
            subscription_id.clone(),
            SubEntry {
                buffer,
                request: request.clone(),
                relay_phases,
                event_filter: source.event_filter,
                batch_flush_armed: false,
            },
        );
        self.mark_dirty();

        let relays: Vec<RelayUrl> = source.relays.into_iter().collect();
        for relay in relays {
            self.start_subscription_on_relay(subscription_id.clone(), relay).await;
        }

        if !is_streaming {
            self.arm_final_timeout(subscription_id);
        }
    }

    async fn start_subscription_on_relay(&mut self, subscription_id: SubscriptionId, relay: RelayUrl) {
        if let Some(entry) = self.subs.get_mut(&subscription_id) {
            entry.relay_phases.insert(relay.clone(), RelaySubPhase::Connecting);
        }
        self.mark_dirty();

        match self.connect_relay(&relay).await {
            Ok(()) => self.send_req_for(&subscription_id, &relay).await,
            Err(_) => self.handle_connect_failure(&relay),
        }
    }

    async fn send_req_for(&mut self, subscription_id: &SubscriptionId, relay: &RelayUrl) {
        let Some(socket) = self.sockets.get(relay).cloned() else {
            return;
        };
        let Some(entry) = self.subs.get(subscription_id) else {
            return;
        };
        let request = if entry.buffer.is_streaming() {
            entry.request.clone()
        } else {
            self.optimizer.optimize(relay, &entry.request)
        };

        let msg = ClientMessage::Req {
            subscription_id: request.subscription_id,
            filters: request.filters,
        };
        match socket.send(&msg).await {
            Ok(()) => {
                if let Some(entry) = self.subs.get_mut(subscription_id) {
                    entry.relay_phases.insert(relay.clone(), RelaySubPhase::Loading);
                }
            }
            Err(_) => self.handle_connect_failure(relay),
        }
        self.mark_dirty();
    }

    async fn handle_unsubscribe(&mut self, subscription_id: SubscriptionId) {
        if let Some(entry) = self.subs.remove(&subscription_id) {
            let relays: Vec<RelayUrl> = entry.relay_phases.keys().cloned().collect();
            for relay in relays {
                if let Some(socket) = self.sockets.get(&relay) {
                    if socket.is_connected() {
                        let _ = socket.send(&ClientMessage::Close(subscription_id.clone())).await;
                    }
                }
            }
            entry.buffer.dispose();
        }
        self.mark_dirty();
    }

    async fn handle_ensure_connected(&mut self) {
        let targets: Vec<(SubscriptionId, RelayUrl)> = self
            .subs
            .iter()
            .flat_map(|(id, entry)| {
                entry
                    .relay_phases
                    .iter()
                    .filter(|(_, phase)| {
                        matches!(
                            phase,
                            RelaySubPhase::Waiting | RelaySubPhase::Failed | RelaySubPhase::Disconnected
                        )
                    })
                    .map(move |(relay, _)| (id.clone(), relay.clone()))
            })
            .collect();

        for (subscription_id, relay) in targets {
            if let Some(socket) = self.sockets.get(&relay) {
                socket.reset_reconnect_attempts();
            }
            self.start_subscription_on_relay(subscription_id, relay).await;
        }
    }

    // -- Publish -------------------------------------------------------------

    async fn handle_publish(
        &mut self,
        events: Vec<Event>,
        relays: std::collections::HashSet<RelayUrl>,
        reply: oneshot::Sender<PublishResponse>,
    ) {
        let event_ids: Vec<EventId> = events.iter().map(|e| e.id).collect();
        let mut tracker = PublishTracker::new(&relays, &event_ids);
        let publish_id = self.next_publish_id;
        self.next_publish_id += 1;

        for relay in &relays {
            match self.connect_relay(relay).await {
                Ok(()) => {
                    if let Some(socket) = self.sockets.get(relay).cloned() {
                        for event in &events {
                            let msg = ClientMessage::Event(Box::new(event.clone()));
                            if socket.send(&msg).await.is_err() {
                                tracker.mark_not_connected(relay.clone(), event.id);
                            }
                        }
                    }
                }
                Err(_) => {
                    self.handle_connect_failure(relay);
                    for id in &event_ids {
                        tracker.mark_not_connected(relay.clone(), *id);
                    }
                }
            }
        }

        self.publishes.insert(publish_id, PublishEntry {
            tracker,
            reply: Some(reply),
        });

        let complete = self.publishes[&publish_id].tracker.is_complete();
        if complete {
            self.finish_publish(publish_id);
        } else {
            self.schedule_publish_timeout(publish_id);
        }
    }

    fn handle_relay_ok(&mut self, relay: RelayUrl, event_id: EventId, accepted: bool, message: String) {
        let mut completed = Vec::new();
        for (publish_id, entry) in self.publishes.iter_mut() {
            if entry.tracker.record_ok(relay.clone(), event_id, accepted, message.clone())
                && entry.tracker.is_complete()
            {
                completed.push(*publish_id);
            }
        }
        for publish_id in completed {
            self.finish_publish(publish_id);
        }
    }

    fn finish_publish(&mut self, publish_id: u64) {
        if let Some(entry) = self.publishes.remove(&publish_id) {
            let response = entry.tracker.finish();
            if let Some(reply) = entry.reply {
                let _ = reply.send(response.clone());
            }
            let _ = self.notify_tx.send(RelayPoolNotification::PublishResponse {
                publish_id,
                response,
            });
        }
    }

    fn schedule_publish_timeout(&self, publish_id: u64) {
        let delay = self.options.get_response_timeout();
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = msg_tx.send(Msg::Internal(Internal::PublishTimeout(publish_id)));
        });
    }

    // -- Connection lifecycle -------------------------------------------------

    async fn connect_relay(&mut self, relay: &RelayUrl) -> Result<(), ()> {
        let socket = self
            .sockets
            .entry(relay.clone())
            .or_insert_with(|| RelaySocket::new(relay.clone(), Arc::clone(&self.transport)))
            .clone();

        if socket.is_connected() {
            return Ok(());
        }

        socket
            .connect(ConnectionMode::Direct, constants::RELAY_TIMEOUT, self.inbound_tx.clone())
            .await
            .map_err(|_| ())?;
        socket.reset_reconnect_attempts();
        Ok(())
    }

    fn handle_connect_failure(&mut self, relay: &RelayUrl) {
        let attempts = self
            .sockets
            .get(relay)
            .map(|s| s.increment_reconnect_attempts())
            .unwrap_or(1);
        let failed = attempts >= constants::MAX_RETRIES;
        let phase = if failed { RelaySubPhase::Failed } else { RelaySubPhase::Waiting };

        for entry in self.subs.values_mut() {
            if entry.relay_phases.contains_key(relay) {
                entry.relay_phases.insert(relay.clone(), phase);
            }
        }

        self.log(LogLevel::Warn, format!("connect failed (attempt {attempts})"), Some(relay.clone()));
        if !failed {
            self.schedule_reconnect(relay.clone(), attempts);
        }
        self.mark_dirty();
    }

    fn schedule_reconnect(&self, relay: RelayUrl, attempt: u32) {
        let delay = Self::backoff_delay(attempt);
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = msg_tx.send(Msg::Internal(Internal::ReconnectDue(relay)));
        });
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let initial = constants::INITIAL_RECONNECT_DELAY.as_millis();
        let scaled = initial.saturating_mul(1u128 << attempt.min(16));
        let capped = scaled.min(constants::MAX_RECONNECT_DELAY.as_millis());
        Duration::from_millis(capped as u64)
    }

    async fn handle_reconnect_due(&mut self, relay: RelayUrl) {
        let subscription_ids: Vec<SubscriptionId> = self
            .subs
            .iter()
            .filter(|(_, entry)| matches!(entry.relay_phases.get(&relay), Some(RelaySubPhase::Waiting)))
            .map(|(id, _)| id.clone())
            .collect();

        if subscription_ids.is_empty() {
            return;
        }

        match self.connect_relay(&relay).await {
            Ok(()) => {
                for subscription_id in subscription_ids {
                    self.send_req_for(&subscription_id, &relay).await;
                }
            }
            Err(_) => self.handle_connect_failure(&relay),
        }
    }

    async fn handle_disconnected(&mut self, relay: RelayUrl) {
        if let Some(socket) = self.sockets.get(&relay) {
            socket.disconnect().await;
        }
        let attempts = self
            .sockets
            .get(&relay)
            .map(|s| s.increment_reconnect_attempts())
            .unwrap_or(1);
        let failed = attempts >= constants::MAX_RETRIES;
        let phase = if failed { RelaySubPhase::Failed } else { RelaySubPhase::Waiting };

        for entry in self.subs.values_mut() {
            if entry.relay_phases.contains_key(&relay) {
                entry.relay_phases.insert(relay.clone(), phase);
            }
        }

        self.log(LogLevel::Warn, "relay disconnected".to_string(), Some(relay.clone()));
        if !failed {
            self.schedule_reconnect(relay, attempts);
        }
        self.mark_dirty();
    }

    /// Track a malformed frame from `relay`; force a reconnect once
    /// [`constants::PROTOCOL_ERROR_RECONNECT_THRESHOLD`] occurrences land
    /// within [`constants::PROTOCOL_ERROR_WINDOW`].
    async fn handle_protocol_error(&mut self, relay: RelayUrl) {
        let now = Instant::now();
        let occurrences = self.protocol_errors.entry(relay.clone()).or_default();
        occurrences.push_back(now);
        while let Some(&oldest) = occurrences.front() {
            if now.duration_since(oldest) > constants::PROTOCOL_ERROR_WINDOW {
                occurrences.pop_front();
            } else {
                break;
            }
        }

        if occurrences.len() as u32 >= constants::PROTOCOL_ERROR_RECONNECT_THRESHOLD {
            occurrences.clear();
            self.log(
                LogLevel::Warn,
                "forcing reconnect after repeated protocol errors".to_string(),
                Some(relay.clone()),
            );
            self.handle_disconnected(relay).await;
        }
    }

    // -- Inbound frames ---------------------------------------------------

    async fn handle_inbound(&mut self, relay: RelayUrl, event: SocketEvent) {
        match event {
            SocketEvent::Disconnected => self.handle_disconnected(relay).await,
            SocketEvent::ProtocolError => self.handle_protocol_error(relay).await,
            SocketEvent::Message(RelayMessage::Event { subscription_id, event }) => {
                if Self::is_health_probe(&subscription_id) {
                    self.note_ping_replied(&relay);
                } else {
                    self.handle_event_frame(relay, subscription_id, *event);
                }
            }
            SocketEvent::Message(RelayMessage::Eose(subscription_id)) => {
                if Self::is_health_probe(&subscription_id) {
                    self.note_ping_replied(&relay);
                } else {
                    self.handle_eose(relay, subscription_id).await;
                }
            }
            SocketEvent::Message(RelayMessage::Closed { subscription_id, message }) => {
                if Self::is_health_probe(&subscription_id) {
                    self.note_ping_replied(&relay);
                } else {
                    self.log(
                        LogLevel::Debug,
                        format!("relay closed subscription: {message}"),
                        Some(relay.clone()),
                    );
                    self.handle_eose(relay, subscription_id).await;
                }
            }
            SocketEvent::Message(RelayMessage::Ok { event_id, accepted, message }) => {
                self.handle_relay_ok(relay, event_id, accepted, message);
            }
            SocketEvent::Message(RelayMessage::Notice(message)) => {
                self.log(LogLevel::Warn, message, Some(relay));
            }
        }
        self.mark_dirty();
    }

    fn handle_event_frame(&mut self, relay: RelayUrl, subscription_id: SubscriptionId, event: Event) {
        let Some(entry) = self.subs.get_mut(&subscription_id) else {
            return;
        };
        if let Some(filter) = &entry.event_filter {
            if !filter.admits(&event) {
                return;
            }
        }

        let created_at = event.created_at;
        let request = entry.request.clone();
        let outcome = entry.buffer.add_event(relay.clone(), event);
        let should_arm =
            matches!(outcome, AddEventOutcome::Inserted { should_arm_batch_flush: true }) && !entry.batch_flush_armed;
        if should_arm {
            entry.batch_flush_armed = true;
        }

        self.optimizer.record(&relay, &request, created_at);
        if should_arm {
            self.arm_batch_flush(subscription_id);
        }
    }

    async fn handle_eose(&mut self, relay: RelayUrl, subscription_id: SubscriptionId) {
        let Some(entry) = self.subs.get_mut(&subscription_id) else {
            return;
        };
        entry.relay_phases.insert(relay.clone(), RelaySubPhase::Streaming);
        let is_streaming = entry.buffer.is_streaming();
        let outcome = entry.buffer.mark_eose(relay);

        match outcome {
            EoseOutcome::AlreadyReceived => {}
            EoseOutcome::FirstOfMany => {
                if is_streaming && !entry.batch_flush_armed {
                    entry.batch_flush_armed = true;
                    self.arm_batch_flush(subscription_id);
                }
            }
            EoseOutcome::AllComplete => self.flush_subscription(subscription_id, true).await,
        }
    }

    // -- Flush scheduling ---------------------------------------------------

    fn arm_batch_flush(&self, subscription_id: SubscriptionId) {
        let delay = self.options.get_streaming_buffer_window();
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = msg_tx.send(Msg::Internal(Internal::BatchFlush(subscription_id)));
        });
    }

    fn arm_final_timeout(&self, subscription_id: SubscriptionId) {
        let delay = self.options.get_response_timeout();
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = msg_tx.send(Msg::Internal(Internal::FinalTimeout(subscription_id)));
        });
    }

    async fn handle_batch_flush(&mut self, subscription_id: SubscriptionId) {
        if let Some(entry) = self.subs.get_mut(&subscription_id) {
            entry.batch_flush_armed = false;
        }
        self.flush_subscription(subscription_id, false).await;
    }

    async fn handle_final_timeout(&mut self, subscription_id: SubscriptionId) {
        if self.subs.contains_key(&subscription_id) {
            self.flush_subscription(subscription_id, true).await;
        }
    }

    async fn flush_subscription(&mut self, subscription_id: SubscriptionId, complete: bool) {
        let Some(entry) = self.subs.get_mut(&subscription_id) else {
            return;
        };
        let is_streaming = entry.buffer.is_streaming();
        let snapshot = entry.buffer.flush();

        if is_streaming && !snapshot.events.is_empty() {
            let _ = self.notify_tx.send(RelayPoolNotification::Events {
                subscription_id: subscription_id.clone(),
                events: snapshot.events,
                relays_for_id: snapshot.relays_for_id,
            });
        }

        if !is_streaming && complete {
            if let Some(entry) = self.subs.remove(&subscription_id) {
                let relays: Vec<RelayUrl> = entry.relay_phases.keys().cloned().collect();
                for relay in relays {
                    if let Some(socket) = self.sockets.get(&relay) {
                        if socket.is_connected() {
                            let _ = socket.send(&ClientMessage::Close(subscription_id.clone())).await;
                        }
                    }
                }
                entry.buffer.dispose();
            }
        }
        self.mark_dirty();
    }

    // -- Health checks ------------------------------------------------------

    fn schedule_health_check_tick(&self) {
        let delay = constants::HEALTH_CHECK_INTERVAL;
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = msg_tx.send(Msg::Internal(Internal::HealthCheckTick));
        });
    }

    async fn handle_health_check_tick(&mut self) {
        let relays: Vec<RelayUrl> = self.sockets.keys().cloned().collect();
        for relay in relays {
            let Some(socket) = self.sockets.get(&relay).cloned() else {
                continue;
            };
            if !socket.is_connected() {
                continue;
            }
            if socket.last_activity().await.elapsed() <= constants::PING_IDLE_THRESHOLD {
                continue;
            }

            let probe_id = SubscriptionId::generate(HEALTH_PROBE_PREFIX);
            let nonce = rand::random::<u64>();
            socket.note_ping_sent(nonce).await;

            let msg = ClientMessage::Req {
                subscription_id: probe_id,
                filters: vec![Filter::new().limit(0)],
            };
            if socket.send(&msg).await.is_err() {
                self.handle_disconnected(relay.clone()).await;
                continue;
            }

            let msg_tx = self.msg_tx.clone();
            let relay_for_timeout = relay.clone();
            tokio::spawn(async move {
                tokio::time::sleep(constants::RELAY_TIMEOUT).await;
                let _ = msg_tx.send(Msg::Internal(Internal::PingTimeout(relay_for_timeout)));
            });
        }
        self.schedule_health_check_tick();
    }

    async fn handle_ping_timeout(&mut self, relay: RelayUrl) {
        let still_waiting = self.sockets.get(&relay).map(|s| !s.ping().replied()).unwrap_or(false);
        if still_waiting {
            self.log(LogLevel::Warn, "liveness probe timed out".to_string(), Some(relay.clone()));
            self.handle_disconnected(relay).await;
        }
    }

    fn is_health_probe(subscription_id: &SubscriptionId) -> bool {
        subscription_id.prefix() == HEALTH_PROBE_PREFIX
    }

    fn note_ping_replied(&self, relay: &RelayUrl) {
        if let Some(socket) = self.sockets.get(relay) {
            socket.note_ping_replied();
        }
    }

    // -- State + logging ------------------------------------------------------

    fn mark_dirty(&mut self) {
        if self.disposed || self.state_emit_scheduled {
            return;
        }
        self.state_emit_scheduled = true;
        let delay = self.options.get_streaming_buffer_window();
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = msg_tx.send(Msg::Internal(Internal::StateEmitTick));
        });
    }

    fn handle_state_emit_tick(&mut self) {
        self.state_emit_scheduled = false;
        self.emit_state();
    }

    fn emit_state(&self) {
        let subscriptions = self
            .subs
            .iter()
            .map(|(id, entry)| {
                (
                    id.clone(),
                    StateSubscription {
                        relay_phases: entry.relay_phases.clone(),
                        is_streaming: entry.buffer.is_streaming(),
                    },
                )
            })
            .collect();
        let state = PoolState {
            subscriptions,
            logs: self.logs.clone(),
        };
        let _ = self.notify_tx.send(RelayPoolNotification::State(Arc::new(state)));
    }

    fn log(&mut self, level: LogLevel, message: String, relay_url: Option<RelayUrl>) {
        match level {
            LogLevel::Debug => tracing::debug!(relay = ?relay_url, "{message}"),
            LogLevel::Warn => tracing::warn!(relay = ?relay_url, "{message}"),
            LogLevel::Error => tracing::error!(relay = ?relay_url, "{message}"),
        }
        self.logs.push(LogEntry {
            level,
            message,
            relay_url,
        });
        self.mark_dirty();
    }

    // -- Shutdown ------------------------------------------------------------

    async fn handle_dispose(&mut self, reply: oneshot::Sender<()>) {
        self.disposed = true;

        let subscription_ids: Vec<SubscriptionId> = self.subs.keys().cloned().collect();
        for subscription_id in subscription_ids {
            if let Some(entry) = self.subs.remove(&subscription_id) {
                entry.buffer.dispose();
            }
        }

        let publish_ids: Vec<u64> = self.publishes.keys().copied().collect();
        for publish_id in publish_ids {
            self.finish_publish(publish_id);
        }

        for socket in self.sockets.values() {
            socket.disconnect().await;
        }
        self.sockets.clear();

        let _ = self.notify_tx.send(RelayPoolNotification::Shutdown);
        let _ = reply.send(());
    }
}
