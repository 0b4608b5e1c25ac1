// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Pool-wide configuration surface
//!
//! Builder-style setters over `Arc<Atomic*>` fields so options stay cheap to
//! clone and can be retuned at runtime without a restart.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::policy::EventFilter;
use crate::url::RelayUrl;

/// Default notification broadcast channel capacity (teacher's
/// `DEFAULT_NOTIFICATION_CHANNEL_SIZE`, `src/pool/constants.rs`).
pub const DEFAULT_NOTIFICATION_CHANNEL_SIZE: usize = 4096;

/// Default batch-flush window for streaming subscriptions.
pub const DEFAULT_STREAMING_BUFFER_WINDOW: Duration = Duration::from_millis(100);

/// Pool-wide, runtime-tunable options.
#[derive(Debug, Clone)]
pub struct RelayPoolOptions {
    response_timeout_ms: Arc<AtomicU64>,
    streaming_buffer_window_ms: Arc<AtomicU64>,
    /// Capacity of the `RelayPoolNotification` broadcast channel.
    pub notification_channel_size: usize,
}

impl Default for RelayPoolOptions {
    fn default() -> Self {
        Self {
            response_timeout_ms: Arc::new(AtomicU64::new(
                super::constants::DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64,
            )),
            streaming_buffer_window_ms: Arc::new(AtomicU64::new(
                DEFAULT_STREAMING_BUFFER_WINDOW.as_millis() as u64,
            )),
            notification_channel_size: DEFAULT_NOTIFICATION_CHANNEL_SIZE,
        }
    }
}

impl RelayPoolOptions {
    /// Builder: override the blocking-query / publish deadline.
    pub fn response_timeout(self, timeout: Duration) -> Self {
        self.response_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Builder: override the streaming batch-flush window.
    pub fn streaming_buffer_window(self, window: Duration) -> Self {
        self.streaming_buffer_window_ms
            .store(window.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Builder: override the notification channel capacity.
    pub fn notification_channel_size(mut self, size: usize) -> Self {
        self.notification_channel_size = size;
        self
    }

    /// Current response timeout.
    pub fn get_response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms.load(Ordering::SeqCst))
    }

    /// Current streaming buffer window.
    pub fn get_streaming_buffer_window(&self) -> Duration {
        Duration::from_millis(self.streaming_buffer_window_ms.load(Ordering::SeqCst))
    }

    /// Update the response timeout at runtime.
    pub fn update_response_timeout(&self, timeout: Duration) {
        self.response_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::SeqCst);
    }
}

/// Describes one `query`/`publish` call's targets and behavior.
#[derive(Clone)]
pub struct QuerySource {
    /// Target relays
    pub relays: HashSet<RelayUrl>,
    /// Streaming (`true`) vs. blocking (`false`)
    pub stream: bool,
    /// Optional ingest-time predicate
    pub event_filter: Option<EventFilter>,
    /// Forces `stream = false`. This crate holds no event store of its own
    /// (the database is a named out-of-scope collaborator), so a `cached_for`
    /// query still round-trips to every target relay; the field only
    /// expresses the caller's intent that a blocking wait is acceptable here,
    /// and is otherwise carried through unused by the actor. The actual
    /// savings on repeat queries come from [`crate::optimizer::RequestOptimizer`]'s
    /// since-injection, which applies to every non-streaming query regardless
    /// of this field.
    pub cached_for: Option<Duration>,
}

impl QuerySource {
    /// A blocking query against `relays` with no filter or cache override.
    pub fn blocking(relays: HashSet<RelayUrl>) -> Self {
        Self {
            relays,
            stream: false,
            event_filter: None,
            cached_for: None,
        }
    }

    /// A streaming subscription against `relays`.
    pub fn streaming(relays: HashSet<RelayUrl>) -> Self {
        Self {
            relays,
            stream: true,
            event_filter: None,
            cached_for: None,
        }
    }

    /// Builder: attach an event filter.
    pub fn event_filter(mut self, filter: EventFilter) -> Self {
        self.event_filter = Some(filter);
        self
    }

    /// Builder: set `cached_for`, forcing `stream = false`.
    pub fn cached_for(mut self, duration: Duration) -> Self {
        self.cached_for = Some(duration);
        self.stream = false;
        self
    }
}
