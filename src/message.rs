// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Client/relay wire messages
//!
//! Frames are JSON arrays tagged by a leading string. Negentropy (`NEG-*`)
//! and NIP-42 `AUTH`/`COUNT` variants are intentionally absent: they are out
//! of this crate's scope.

use serde_json::{json, Value};
use thiserror::Error;

use crate::event::{Event, EventId};
use crate::filter::Filter;
use crate::subscription::SubscriptionId;

/// Message (de)serialization error
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed JSON
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// Frame is not a JSON array
    #[error("frame is not a json array")]
    NotAnArray,
    /// Frame array is empty
    #[error("empty frame")]
    Empty,
    /// Unknown frame tag
    #[error("unknown frame type: {0}")]
    UnknownType(String),
    /// Frame is missing a required field at the given position
    #[error("malformed frame: missing field at index {0}")]
    MissingField(usize),
}

/// Client -> relay frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `["REQ", sub_id, filter1, filter2, ...]`
    Req {
        /// Subscription id
        subscription_id: SubscriptionId,
        /// Filters (disjoined)
        filters: Vec<Filter>,
    },
    /// `["CLOSE", sub_id]`
    Close(SubscriptionId),
    /// `["EVENT", event]`
    Event(Box<Event>),
}

impl ClientMessage {
    /// Serialize to the wire JSON array form.
    pub fn to_json(&self) -> String {
        match self {
            Self::Req {
                subscription_id,
                filters,
            } => {
                let mut arr: Vec<Value> = vec![
                    Value::String("REQ".into()),
                    Value::String(subscription_id.to_string()),
                ];
                for filter in filters {
                    arr.push(serde_json::to_value(filter).unwrap_or(Value::Null));
                }
                Value::Array(arr).to_string()
            }
            Self::Close(sub_id) => json!(["CLOSE", sub_id.to_string()]).to_string(),
            Self::Event(event) => {
                json!(["EVENT", event]).to_string()
            }
        }
    }
}

/// Relay -> client frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// `["EVENT", sub_id, event]`
    Event {
        /// Subscription id
        subscription_id: SubscriptionId,
        /// Delivered event
        event: Box<Event>,
    },
    /// `["EOSE", sub_id]`
    Eose(SubscriptionId),
    /// `["OK", event_id, accepted, message]`
    Ok {
        /// Event id the verdict is about
        event_id: EventId,
        /// Accepted?
        accepted: bool,
        /// Human-readable reason
        message: String,
    },
    /// `["NOTICE", message]`
    Notice(String),
    /// `["CLOSED", sub_id, reason]`
    Closed {
        /// Subscription id
        subscription_id: SubscriptionId,
        /// Reason given by the relay
        message: String,
    },
}

impl RelayMessage {
    /// Parse a raw text frame into a typed [`RelayMessage`].
    ///
    /// Unknown frame tags and malformed frames return an [`Error`]; the
    /// caller is expected to log and drop them, never to propagate them
    /// further.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text)?;
        let arr: &Vec<Value> = value.as_array().ok_or(Error::NotAnArray)?;
        let tag: &str = arr
            .first()
            .and_then(Value::as_str)
            .ok_or(Error::Empty)?;

        match tag {
            "EVENT" => {
                let sub_id: String = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or(Error::MissingField(1))?
                    .to_string();
                let event_value: &Value = arr.get(2).ok_or(Error::MissingField(2))?;
                let event: Event = serde_json::from_value(event_value.clone())?;
                Ok(Self::Event {
                    subscription_id: SubscriptionId::new(sub_id),
                    event: Box::new(event),
                })
            }
            "EOSE" => {
                let sub_id: String = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or(Error::MissingField(1))?
                    .to_string();
                Ok(Self::Eose(SubscriptionId::new(sub_id)))
            }
            "OK" => {
                let event_id: String = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or(Error::MissingField(1))?
                    .to_string();
                let accepted: bool = arr
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or(Error::MissingField(2))?;
                let message: String = arr
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let event_id: EventId = event_id
                    .parse()
                    .map_err(|_| Error::MissingField(1))?;
                Ok(Self::Ok {
                    event_id,
                    accepted,
                    message,
                })
            }
            "NOTICE" => {
                let message: String = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Self::Notice(message))
            }
            "CLOSED" => {
                let sub_id: String = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or(Error::MissingField(1))?
                    .to_string();
                let message: String = arr
                    .get(2)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Self::Closed {
                    subscription_id: SubscriptionId::new(sub_id),
                    message,
                })
            }
            other => Err(Error::UnknownType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            id: "a".repeat(64).parse().unwrap(),
            pubkey: "b".repeat(64),
            created_at: 1,
            kind: 1,
            tags: vec![],
            content: "hello".into(),
            sig: "c".repeat(128),
        }
    }

    #[test]
    fn req_serializes_as_tagged_array() {
        let msg = ClientMessage::Req {
            subscription_id: SubscriptionId::new("sub-1"),
            filters: vec![Filter::new().kinds(vec![1])],
        };
        let json = msg.to_json();
        assert!(json.starts_with(r#"["REQ","sub-1","#));
    }

    #[test]
    fn parses_event_frame() {
        let event = sample_event();
        let frame = json!(["EVENT", "sub-1", event]).to_string();
        let parsed = RelayMessage::from_json(&frame).unwrap();
        match parsed {
            RelayMessage::Event {
                subscription_id,
                event: parsed_event,
            } => {
                assert_eq!(subscription_id, SubscriptionId::new("sub-1"));
                assert_eq!(*parsed_event, event);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parses_eose_ok_notice_closed() {
        assert!(matches!(
            RelayMessage::from_json(r#"["EOSE","sub-1"]"#).unwrap(),
            RelayMessage::Eose(_)
        ));
        let event_id = "d".repeat(64);
        let ok_frame = format!(r#"["OK","{event_id}",false,"blocked"]"#);
        match RelayMessage::from_json(&ok_frame).unwrap() {
            RelayMessage::Ok {
                accepted, message, ..
            } => {
                assert!(!accepted);
                assert_eq!(message, "blocked");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(matches!(
            RelayMessage::from_json(r#"["NOTICE","hello"]"#).unwrap(),
            RelayMessage::Notice(_)
        ));
        assert!(matches!(
            RelayMessage::from_json(r#"["CLOSED","sub-1","reason"]"#).unwrap(),
            RelayMessage::Closed { .. }
        ));
    }

    #[test]
    fn unknown_frame_type_is_an_error_not_a_panic() {
        assert!(matches!(
            RelayMessage::from_json(r#"["AUTH","challenge"]"#),
            Err(Error::UnknownType(_))
        ));
    }
}
