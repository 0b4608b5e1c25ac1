// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use thiserror::Error;

use crate::relay;
use crate::url;

/// [`RelayPool`](super::RelayPool) error
#[derive(Debug, Error)]
pub enum Error {
    /// Relay URL failed to parse/normalize
    #[error(transparent)]
    Url(#[from] url::Error),
    /// Per-relay transport/framing error
    #[error(transparent)]
    Relay(#[from] relay::Error),
    /// The pool has been disposed; this is the one case that rejects the
    /// caller instead of resolving with partial data.
    #[error("pool has been disposed")]
    Disposed,
    /// The actor hung up unexpectedly (a bug, not a normal shutdown path).
    #[error("pool actor is no longer running")]
    ActorGone,
}
