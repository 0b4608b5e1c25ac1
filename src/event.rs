// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event id parse error
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid hex length (must be 32 bytes / 64 hex chars)
    #[error("invalid event id length")]
    InvalidLength,
    /// Invalid hex encoding
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
}

/// 32-byte event identifier, the hex-encoded sha256 of the event's signed content.
///
/// The pool treats this as opaque; it never computes or verifies it (that is the
/// signer/verifier's job, out of scope here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventId([u8; 32]);

impl EventId {
    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: Vec<u8> = hex::decode(s)?;
        let array: [u8; 32] = bytes.try_into().map_err(|_| Error::InvalidLength)?;
        Ok(Self(array))
    }
}

impl TryFrom<String> for EventId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl From<EventId> for String {
    fn from(value: EventId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// An opaque pub/sub event record.
///
/// The pool only inspects `id`, `kind`, and `created_at`; everything else
/// passes through untouched, including fields it doesn't know about, since
/// signature verification and the kind/tag domain model live outside this
/// crate (see the [`Event`] module doc).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event id (hex)
    pub id: EventId,
    /// Public key of the author (hex, opaque to this crate)
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind
    pub kind: u16,
    /// Tags, each an ordered list of strings
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    /// Event content
    pub content: String,
    /// Signature (hex, opaque to this crate)
    pub sig: String,
}
