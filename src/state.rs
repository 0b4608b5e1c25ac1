// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Snapshotable pool state: an immutable `{subscriptions, logs}` view
//! broadcast after every state-changing transition.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::subscription::SubscriptionId;
use crate::url::RelayUrl;

/// Maximum number of log entries retained in [`PoolState`].
pub const MAX_LOG_ENTRIES: usize = 200;

/// Per-(subscription, relay) lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelaySubPhase {
    /// No socket, or socket not yet dialing for this subscription.
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Connected, REQ sent, awaiting EOSE.
    Loading,
    /// EOSE seen; live events only from here on.
    Streaming,
    /// Reconnect backoff in progress.
    Waiting,
    /// `max_retries` exhausted; no further automatic reconnects.
    Failed,
}

impl fmt::Display for RelaySubPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Loading => "loading",
            Self::Streaming => "streaming",
            Self::Waiting => "waiting",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Severity of a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Informational
    Debug,
    /// Worth surfacing but not actionable
    Warn,
    /// Unrecoverable for the affected component
    Error,
}

/// A single entry in the bounded log ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Severity
    pub level: LogLevel,
    /// Human-readable message
    pub message: String,
    /// Relay the entry concerns, if any
    pub relay_url: Option<RelayUrl>,
}

/// A bounded FIFO ring of the last [`MAX_LOG_ENTRIES`] log entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogRing {
    entries: std::collections::VecDeque<LogEntry>,
}

impl LogRing {
    /// Push a new entry, evicting the oldest if at capacity.
    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() >= MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Iterate entries oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Derived view of one tracked subscription, exposed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Per-relay phase for every target relay
    pub relay_phases: HashMap<RelayUrl, RelaySubPhase>,
    /// Whether this subscription is streaming (vs. blocking)
    pub is_streaming: bool,
}

impl Subscription {
    /// Relays currently past the handshake (`Loading` or `Streaming`).
    pub fn active_relay_count(&self) -> usize {
        self.relay_phases
            .values()
            .filter(|p| matches!(p, RelaySubPhase::Loading | RelaySubPhase::Streaming))
            .count()
    }

    /// Total number of target relays.
    pub fn total_relay_count(&self) -> usize {
        self.relay_phases.len()
    }

    /// Whether every target relay has reached `Streaming`.
    pub fn all_eose_received(&self) -> bool {
        !self.relay_phases.is_empty()
            && self
                .relay_phases
                .values()
                .all(|p| matches!(p, RelaySubPhase::Streaming))
    }

    /// Whether every target relay is in `Failed`.
    pub fn all_failed(&self) -> bool {
        !self.relay_phases.is_empty()
            && self
                .relay_phases
                .values()
                .all(|p| matches!(p, RelaySubPhase::Failed))
    }

    /// A short human-readable summary, e.g. `"2/3 streaming"`.
    pub fn status_text(&self) -> String {
        if self.all_failed() {
            return "failed".to_string();
        }
        format!(
            "{}/{} streaming",
            self.relay_phases
                .values()
                .filter(|p| matches!(p, RelaySubPhase::Streaming))
                .count(),
            self.total_relay_count()
        )
    }
}

/// Immutable snapshot of the whole pool, emitted to observers after every
/// state-changing transition (debounced to at most one per `batch_window`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolState {
    /// All currently tracked subscriptions
    pub subscriptions: HashMap<SubscriptionId, Subscription>,
    /// Bounded log ring
    pub logs: LogRing,
}

impl PoolState {
    /// Relays that any live subscription currently targets.
    pub fn all_target_relays(&self) -> HashSet<RelayUrl> {
        self.subscriptions
            .values()
            .flat_map(|s| s.relay_phases.keys().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phases(values: &[RelaySubPhase]) -> HashMap<RelayUrl, RelaySubPhase> {
        values
            .iter()
            .enumerate()
            .map(|(i, p)| (RelayUrl::parse(&format!("wss://r{i}.example")).unwrap(), *p))
            .collect()
    }

    #[test]
    fn log_ring_evicts_oldest_past_capacity() {
        let mut ring = LogRing::default();
        for i in 0..(MAX_LOG_ENTRIES + 1) {
            ring.push(LogEntry {
                level: LogLevel::Debug,
                message: format!("entry-{i}"),
                relay_url: None,
            });
        }
        assert_eq!(ring.len(), MAX_LOG_ENTRIES);
        assert_eq!(ring.iter().next().unwrap().message, "entry-1");
    }

    #[test]
    fn subscription_derives_all_eose_received() {
        let sub = Subscription {
            relay_phases: phases(&[RelaySubPhase::Streaming, RelaySubPhase::Streaming]),
            is_streaming: false,
        };
        assert!(sub.all_eose_received());
        assert_eq!(sub.active_relay_count(), 2);
    }

    #[test]
    fn subscription_not_all_eose_when_one_loading() {
        let sub = Subscription {
            relay_phases: phases(&[RelaySubPhase::Streaming, RelaySubPhase::Loading]),
            is_streaming: false,
        };
        assert!(!sub.all_eose_received());
        assert_eq!(sub.status_text(), "1/2 streaming");
    }

    #[test]
    fn subscription_all_failed() {
        let sub = Subscription {
            relay_phases: phases(&[RelaySubPhase::Failed, RelaySubPhase::Failed]),
            is_streaming: true,
        };
        assert!(sub.all_failed());
        assert_eq!(sub.status_text(), "failed");
    }
}
