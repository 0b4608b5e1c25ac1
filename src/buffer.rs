// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Per-subscription event buffer: dedup, EOSE tracking, flush scheduling.
//!
//! This is deliberately a plain synchronous state machine with no timers or
//! socket awareness of its own — the pool's actor (see [`crate::pool`]) owns
//! the `tokio::time` timers and calls into this type at the right moments.
//! That split is what makes the dedup/EOSE/flush logic testable with plain
//! `#[test]` functions.

use std::collections::{HashMap, HashSet};

use tokio::sync::oneshot;

use crate::event::{Event, EventId};
use crate::url::RelayUrl;

/// Distinguishes the two query semantics via a sum type rather than a
/// nullable `query_completer`.
pub enum FlushPolicy {
    /// Blocking query: resolves `completer` exactly once, then the
    /// subscription is torn down by the caller.
    Batched(Option<oneshot::Sender<Vec<Event>>>),
    /// Streaming subscription: no completer; flushes repeat until
    /// `unsubscribe`.
    Progressive,
}

impl FlushPolicy {
    /// Whether this is a blocking (`Batched`) policy.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Batched(_))
    }
}

/// What the buffer wants the actor to do after [`SubscriptionBuffer::add_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddEventOutcome {
    /// Event id already seen; only `relays_for_id` was updated.
    Duplicate,
    /// First delivery of this id; for streaming buffers the actor should
    /// make sure a batch-flush timer is armed.
    Inserted { should_arm_batch_flush: bool },
}

/// What the buffer wants the actor to do after [`SubscriptionBuffer::mark_eose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EoseOutcome {
    /// This relay had already reported EOSE; no-op.
    AlreadyReceived,
    /// First EOSE for this subscription, but not all target relays yet —
    /// the actor should arm the `eose_first_flush` timer if not already
    /// armed.
    FirstOfMany,
    /// Every target relay has now reported EOSE. The actor must flush
    /// immediately and, for blocking buffers, resolve the completer.
    AllComplete,
}

/// The result of a [`SubscriptionBuffer::flush`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushSnapshot {
    /// Deduplicated events accumulated since the last flush (or ever, for a
    /// blocking buffer).
    pub events: Vec<Event>,
    /// Every relay that delivered each event id.
    pub relays_for_id: HashMap<EventId, HashSet<RelayUrl>>,
}

/// Per-subscription dedup + EOSE-tracking + flush-scheduling state.
pub struct SubscriptionBuffer {
    target_relays: HashSet<RelayUrl>,
    flush_policy: FlushPolicy,
    events_by_id: HashMap<EventId, Event>,
    relays_for_id: HashMap<EventId, HashSet<RelayUrl>>,
    eose_received: HashSet<RelayUrl>,
    total_events_received: usize,
}

impl SubscriptionBuffer {
    /// Create a new buffer. `target_relays` is frozen for the buffer's
    /// lifetime (invariant: a subscription's relay set never changes after
    /// creation).
    pub fn new(target_relays: HashSet<RelayUrl>, flush_policy: FlushPolicy) -> Self {
        Self {
            target_relays,
            flush_policy,
            events_by_id: HashMap::new(),
            relays_for_id: HashMap::new(),
            eose_received: HashSet::new(),
            total_events_received: 0,
        }
    }

    /// Target relay set, frozen at creation.
    pub fn target_relays(&self) -> &HashSet<RelayUrl> {
        &self.target_relays
    }

    /// Whether this buffer is in streaming (`Progressive`) mode.
    pub fn is_streaming(&self) -> bool {
        matches!(self.flush_policy, FlushPolicy::Progressive)
    }

    /// Total distinct events ingested across the buffer's lifetime.
    pub fn total_events_received(&self) -> usize {
        self.total_events_received
    }

    /// Ingest one event delivered by `relay`. Always records `relay` as a
    /// contributor for `event.id`; only inserts into `events_by_id` on first
    /// delivery ("first delivery wins").
    pub fn add_event(&mut self, relay: RelayUrl, event: Event) -> AddEventOutcome {
        let id = event.id;
        self.relays_for_id.entry(id).or_default().insert(relay);

        if self.events_by_id.contains_key(&id) {
            return AddEventOutcome::Duplicate;
        }

        self.events_by_id.insert(id, event);
        self.total_events_received += 1;

        AddEventOutcome::Inserted {
            should_arm_batch_flush: self.is_streaming(),
        }
    }

    /// Record that `relay` has reported EOSE (or an equivalent `CLOSED`).
    pub fn mark_eose(&mut self, relay: RelayUrl) -> EoseOutcome {
        if !self.eose_received.insert(relay) {
            return EoseOutcome::AlreadyReceived;
        }

        if self.is_complete() {
            EoseOutcome::AllComplete
        } else {
            EoseOutcome::FirstOfMany
        }
    }

    /// Whether every target relay has reported EOSE.
    pub fn is_complete(&self) -> bool {
        self.target_relays.is_subset(&self.eose_received)
            && !self.target_relays.is_empty()
    }

    /// Relays in `target_relays` that have reported EOSE so far.
    pub fn eose_received(&self) -> &HashSet<RelayUrl> {
        &self.eose_received
    }

    /// Snapshot current state and, per policy, clear it or retain it.
    ///
    /// For `Progressive` buffers the maps are cleared afterward so a
    /// long-lived streaming subscription doesn't grow unbounded. For
    /// `Batched` buffers the maps are retained (the subscription is about to
    /// be torn down by the caller anyway). A flush on an empty buffer still
    /// resolves a pending completer with an empty list.
    pub fn flush(&mut self) -> FlushSnapshot {
        let events: Vec<Event> = self.events_by_id.values().cloned().collect();
        let relays_for_id = self.relays_for_id.clone();

        if let FlushPolicy::Batched(completer) = &mut self.flush_policy {
            if let Some(tx) = completer.take() {
                let _ = tx.send(events.clone());
            }
        }

        if self.is_streaming() {
            self.events_by_id.clear();
            self.relays_for_id.clear();
        }

        FlushSnapshot {
            events,
            relays_for_id,
        }
    }

    /// Tear down the buffer. If a completer is still pending, resolve it with
    /// whatever is currently buffered (possibly empty).
    pub fn dispose(mut self) {
        if let FlushPolicy::Batched(completer) = &mut self.flush_policy {
            if let Some(tx) = completer.take() {
                let events: Vec<Event> = self.events_by_id.values().cloned().collect();
                let _ = tx.send(events);
            }
        }
    }
}
