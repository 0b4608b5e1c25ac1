// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Filter

use std::collections::{BTreeMap, BTreeSet};

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::event::EventId;

/// A conjunctive filter over events.
///
/// Every populated field narrows the match (AND); multiple [`Filter`]s inside
/// one [`crate::message::ClientMessage::Req`] are disjoined (OR) by the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Match specific event ids
    pub ids: Option<Vec<EventId>>,
    /// Match specific authors (hex pubkeys)
    pub authors: Option<Vec<String>>,
    /// Match specific kinds
    pub kinds: Option<Vec<u16>>,
    /// Match events with `created_at >= since`
    pub since: Option<u64>,
    /// Match events with `created_at <= until`
    pub until: Option<u64>,
    /// Cap the number of stored events a relay should return
    pub limit: Option<usize>,
    /// Single-letter tag filters (`#e`, `#p`, ...), keyed by the letter without the `#`
    pub generic_tags: BTreeMap<char, BTreeSet<String>>,
}

impl Filter {
    /// A filter with all fields empty, matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set `since`.
    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    /// Builder: set `kinds`.
    pub fn kinds(mut self, kinds: Vec<u16>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Builder: set `limit`.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Return a copy with `since` forced to `0`, used by the optimizer to build
    /// a canonical cache key that is insensitive to a previously-injected `since`.
    pub fn with_zeroed_since(&self) -> Self {
        let mut clone = self.clone();
        clone.since = Some(0);
        clone
    }
}

impl Serialize for Filter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut len = 0;
        if self.ids.is_some() {
            len += 1;
        }
        if self.authors.is_some() {
            len += 1;
        }
        if self.kinds.is_some() {
            len += 1;
        }
        if self.since.is_some() {
            len += 1;
        }
        if self.until.is_some() {
            len += 1;
        }
        if self.limit.is_some() {
            len += 1;
        }
        len += self.generic_tags.len();

        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(ids) = &self.ids {
            map.serialize_entry("ids", ids)?;
        }
        if let Some(authors) = &self.authors {
            map.serialize_entry("authors", authors)?;
        }
        if let Some(kinds) = &self.kinds {
            map.serialize_entry("kinds", kinds)?;
        }
        if let Some(since) = &self.since {
            map.serialize_entry("since", since)?;
        }
        if let Some(until) = &self.until {
            map.serialize_entry("until", until)?;
        }
        if let Some(limit) = &self.limit {
            map.serialize_entry("limit", limit)?;
        }
        for (letter, values) in &self.generic_tags {
            map.serialize_entry(&format!("#{letter}"), values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FilterVisitor;

        impl<'de> Visitor<'de> for FilterVisitor {
            type Value = Filter;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a filter object")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut filter = Filter::new();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "ids" => filter.ids = Some(map.next_value()?),
                        "authors" => filter.authors = Some(map.next_value()?),
                        "kinds" => filter.kinds = Some(map.next_value()?),
                        "since" => filter.since = Some(map.next_value()?),
                        "until" => filter.until = Some(map.next_value()?),
                        "limit" => filter.limit = Some(map.next_value()?),
                        _ => {
                            if let Some(letter) = key.strip_prefix('#').and_then(|s| {
                                let mut chars = s.chars();
                                let c = chars.next()?;
                                chars.next().is_none().then_some(c)
                            }) {
                                let values: BTreeSet<String> = map.next_value()?;
                                filter.generic_tags.insert(letter, values);
                            } else {
                                let _: de::IgnoredAny = map.next_value()?;
                            }
                        }
                    }
                }
                Ok(filter)
            }
        }

        deserializer.deserialize_map(FilterVisitor)
    }
}
