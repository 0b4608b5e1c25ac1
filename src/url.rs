// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay URL

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Relay URL parse error
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed URL
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Unsupported scheme
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
}

/// A normalized relay URL (`ws://` or `wss://`).
///
/// Parsing delegates to the `url` crate for the actual scheme/authority/path
/// grammar; this type only adds the ws/wss scheme check and strips a bare
/// trailing `/` so that `wss://Relay.Example/` and `wss://relay.example`
/// compare and hash equal (`url::Url` already lower-cases scheme and host).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelayUrl(String);

impl RelayUrl {
    /// Parse and normalize a relay URL.
    pub fn parse(url: &str) -> Result<Self, Error> {
        let parsed: Url = Url::parse(url.trim())?;

        match parsed.scheme() {
            "ws" | "wss" => {}
            scheme => return Err(Error::UnsupportedScheme(scheme.to_string())),
        }

        let mut normalized: String = parsed.as_str().to_string();
        if parsed.path() == "/" && parsed.query().is_none() && parsed.fragment().is_none() {
            normalized.pop();
        }

        Ok(Self(normalized))
    }

    /// Borrow the normalized URL string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RelayUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RelayUrl {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RelayUrl> for String {
    fn from(value: RelayUrl) -> Self {
        value.0
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_trailing_slash() {
        let a = RelayUrl::parse("wss://Relay.Example.com/").unwrap();
        let b = RelayUrl::parse("WSS://relay.example.com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "wss://relay.example.com");
    }

    #[test]
    fn rejects_unsupported_scheme() {
        assert!(matches!(
            RelayUrl::parse("https://relay.example.com"),
            Err(Error::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(matches!(RelayUrl::parse("  "), Err(Error::Url(_))));
        assert!(matches!(RelayUrl::parse("wss://"), Err(Error::Url(_))));
    }

    #[test]
    fn preserves_path() {
        let url = RelayUrl::parse("wss://relay.example.com/nostr").unwrap();
        assert_eq!(url.as_str(), "wss://relay.example.com/nostr");
    }
}
