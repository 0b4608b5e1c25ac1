// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Subscription id

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A client-issued subscription identifier of the form `"<prefix>-<nonce>"`.
///
/// Only `prefix` is stable across re-subscribes with a fresh nonce; the full
/// id is what's threaded through REQ/CLOSE/EVENT/EOSE frames.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Wrap an already-formed id verbatim (e.g. one received from the wire).
    pub fn new<S>(id: S) -> Self
    where
        S: Into<String>,
    {
        Self(id.into())
    }

    /// Generate a fresh id from a stable prefix plus a random nonce.
    pub fn generate(prefix: &str) -> Self {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        Self(format!("{prefix}-{nonce}"))
    }

    /// The stable prefix, i.e. everything before the last `-`.
    pub fn prefix(&self) -> &str {
        match self.0.rsplit_once('-') {
            Some((prefix, _nonce)) => prefix,
            None => &self.0,
        }
    }

    /// Borrow the full id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_uses_stable_prefix() {
        let a = SubscriptionId::generate("feed");
        let b = SubscriptionId::generate("feed");
        assert_ne!(a, b);
        assert_eq!(a.prefix(), "feed");
        assert_eq!(b.prefix(), "feed");
    }

    #[test]
    fn wrapped_id_without_dash_has_itself_as_prefix() {
        let id = SubscriptionId::new("plain");
        assert_eq!(id.prefix(), "plain");
    }
}
