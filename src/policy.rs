// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event admission predicate
//!
//! A plain synchronous predicate: the `event_filter` attached to a query is
//! applied inline on ingest, before dedup, with no backend I/O of its own.

use std::fmt;
use std::sync::Arc;

use crate::event::Event;

/// A predicate applied to every event on ingest, before deduplication and
/// buffering. Rejected events are dropped silently and don't count toward
/// metrics.
#[derive(Clone)]
pub struct EventFilter(Arc<dyn Fn(&Event) -> bool + Send + Sync>);

impl EventFilter {
    /// Wrap a predicate closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Evaluate the predicate.
    pub fn admits(&self, event: &Event) -> bool {
        (self.0)(event)
    }
}

impl fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventFilter(..)")
    }
}
