// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Publish tracker: per-(relay, event) OK-response aggregation.

use std::collections::{HashMap, HashSet};

use crate::event::EventId;
use crate::url::RelayUrl;

/// Terminal result of one `publish` call across all of its target relays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishResponse {
    /// Relays that returned `OK true` for an event, and which event ids
    pub accepted: HashMap<RelayUrl, HashSet<EventId>>,
    /// Relays that rejected (or never answered for) an event, with the
    /// reason — `"not-connected"` or `"timeout"` for the two non-OK cases.
    pub rejected: HashMap<RelayUrl, HashMap<EventId, String>>,
}

impl PublishResponse {
    fn accept(&mut self, relay: RelayUrl, event_id: EventId) {
        self.accepted.entry(relay).or_default().insert(event_id);
    }

    fn reject(&mut self, relay: RelayUrl, event_id: EventId, reason: String) {
        self.rejected
            .entry(relay)
            .or_default()
            .insert(event_id, reason);
    }
}

/// Tracks outstanding (relay, event) verdicts for one publish call until
/// every pair has an answer or the response timeout elapses.
pub struct PublishTracker {
    pending: HashSet<(RelayUrl, EventId)>,
    response: PublishResponse,
}

impl PublishTracker {
    /// Start tracking every (relay, event) pair this publish targets.
    pub fn new(relays: &HashSet<RelayUrl>, event_ids: &[EventId]) -> Self {
        let pending = relays
            .iter()
            .flat_map(|r| event_ids.iter().map(move |id| (r.clone(), *id)))
            .collect();
        Self {
            pending,
            response: PublishResponse::default(),
        }
    }

    /// Mark a pair as failed up front because the relay isn't connected.
    pub fn mark_not_connected(&mut self, relay: RelayUrl, event_id: EventId) {
        if self.pending.remove(&(relay.clone(), event_id)) {
            self.response.reject(relay, event_id, "not-connected".to_string());
        }
    }

    /// Record an inbound `OK` verdict for a pair this tracker owns. Returns
    /// `false` if the pair was unknown (already resolved, or never targeted)
    /// so the caller can decide whether to log it at debug level.
    pub fn record_ok(
        &mut self,
        relay: RelayUrl,
        event_id: EventId,
        accepted: bool,
        message: String,
    ) -> bool {
        if !self.pending.remove(&(relay.clone(), event_id)) {
            return false;
        }
        if accepted {
            self.response.accept(relay, event_id);
        } else {
            self.response.reject(relay, event_id, message);
        }
        true
    }

    /// Whether every pair has a verdict.
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Finalize: any pair still pending at timeout is rejected with
    /// `"timeout"`, then the response is returned.
    pub fn finish(mut self) -> PublishResponse {
        for (relay, event_id) in self.pending.drain() {
            self.response.reject(relay, event_id, "timeout".to_string());
        }
        self.response
    }
}
