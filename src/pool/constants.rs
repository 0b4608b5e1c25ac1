// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Fixed, non-configurable pool constants.

use std::time::Duration;

/// WebSocket handshake deadline.
pub const RELAY_TIMEOUT: Duration = Duration::from_secs(5);
/// Ceiling on exponential reconnect backoff.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
/// Floor of exponential reconnect backoff.
pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(100);
/// How long a connected relay may stay silent before a liveness probe is sent.
pub const PING_IDLE_THRESHOLD: Duration = Duration::from_secs(55);
/// How often the pool sweeps all sockets for idleness.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);
/// Consecutive reconnect failures before a relay is marked `failed` for a subscription.
pub const MAX_RETRIES: u32 = 20;
/// Bound on [`crate::state::PoolState`]'s log ring (mirrors `crate::state::MAX_LOG_ENTRIES`).
pub const MAX_LOG_ENTRIES: usize = crate::state::MAX_LOG_ENTRIES;
/// Bound on [`crate::optimizer::RequestOptimizer`]'s LRU cache.
pub const OPTIMIZER_MAX_ENTRIES: usize = crate::optimizer::MAX_ENTRIES;
/// Default blocking-query / publish deadline.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
/// Protocol errors from the same relay within this window count toward a forced reconnect.
pub const PROTOCOL_ERROR_WINDOW: Duration = Duration::from_secs(10);
/// Protocol error count within [`PROTOCOL_ERROR_WINDOW`] that forces a reconnect.
pub const PROTOCOL_ERROR_RECONNECT_THRESHOLD: u32 = 3;
