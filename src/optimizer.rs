// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Since-filter injection, LRU-cached per (relay, canonical request).
//!
//! Uses the `lru` crate already relied on elsewhere for id caches, plus
//! `sha2` for the cache key's hash.

use std::num::NonZeroUsize;

use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::filter::Filter;
use crate::subscription::SubscriptionId;
use crate::url::RelayUrl;

/// Max entries retained by the optimizer's LRU cache.
pub const MAX_ENTRIES: usize = 1000;

/// A `{subscription_id, filters}` request as sent to one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Subscription id (only the prefix is used for the cache key)
    pub subscription_id: SubscriptionId,
    /// Conjunctive filters
    pub filters: Vec<Filter>,
}

fn cache_key(relay: &RelayUrl, request: &Request) -> [u8; 32] {
    let canonical_filters: Vec<Filter> = request
        .filters
        .iter()
        .map(Filter::with_zeroed_since)
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(relay.as_str().as_bytes());
    hasher.update(request.subscription_id.prefix().as_bytes());
    for filter in &canonical_filters {
        // `Filter`'s map-based Serialize produces a stable key order (BTreeMap
        // for generic_tags, fixed field order otherwise) so this is a stable
        // canonical representation across runs.
        let encoded = serde_json::to_vec(filter).unwrap_or_default();
        hasher.update(encoded);
    }
    hasher.finalize().into()
}

/// LRU-cached since-filter injector.
///
/// A no-op for streaming subscriptions (invariant 7): the pool never calls
/// `optimize` for those, but the type doesn't need to know that — it's the
/// pool's responsibility to only route non-streaming requests through it.
pub struct RequestOptimizer {
    cache: LruCache<[u8; 32], u64>,
}

impl RequestOptimizer {
    /// Create a fresh optimizer with the standard 1000-entry capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAX_ENTRIES)
    }

    /// Create an optimizer with a custom capacity (used by tests exercising
    /// the LRU eviction boundary).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Produce the request that should actually be sent to `relay`: unchanged
    /// if nothing is cached for this (relay, canonical-request) pair,
    /// otherwise with every filter's `since` raised to the cached watermark.
    pub fn optimize(&mut self, relay: &RelayUrl, request: &Request) -> Request {
        let key = cache_key(relay, request);
        match self.cache.get(&key) {
            Some(&since) => {
                let filters = request
                    .filters
                    .iter()
                    .cloned()
                    .map(|mut filter| {
                        filter.since = Some(filter.since.map_or(since, |s| s.max(since)));
                        filter
                    })
                    .collect();
                Request {
                    subscription_id: request.subscription_id.clone(),
                    filters,
                }
            }
            None => request.clone(),
        }
    }

    /// Record that `event_time` was observed for (relay, canonical-request),
    /// raising the stored watermark and touching LRU order.
    pub fn record(&mut self, relay: &RelayUrl, request: &Request, event_time: u64) {
        let key = cache_key(relay, request);
        let updated = match self.cache.get(&key) {
            Some(&existing) => existing.max(event_time),
            None => event_time,
        };
        self.cache.put(key, updated);
    }

    /// Wipe the entire cache.
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

impl Default for RequestOptimizer {
    fn default() -> Self {
        Self::new()
    }
}
