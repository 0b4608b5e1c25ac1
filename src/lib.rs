// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay pool: the concurrency core of a local-first Nostr-style pub/sub
//! client. Owns every relay socket, deduplicates and buffers incoming
//! events, injects since-filters on repeat queries, and tracks publish
//! verdicts — all serialized onto a single actor task per [`pool::RelayPool`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]
#![allow(unknown_lints)]
#![allow(clippy::arc_with_non_send_sync)]

pub mod buffer;
pub mod event;
pub mod filter;
pub mod message;
pub mod optimizer;
pub mod policy;
pub mod pool;
pub mod prelude;
pub mod publish;
pub mod relay;
pub mod state;
pub mod subscription;
pub mod transport;
pub mod url;

pub use self::buffer::{AddEventOutcome, EoseOutcome, FlushPolicy, SubscriptionBuffer};
pub use self::event::{Event, EventId};
pub use self::filter::Filter;
pub use self::message::{ClientMessage, RelayMessage};
pub use self::policy::EventFilter;
pub use self::pool::{QuerySource, RelayPool, RelayPoolNotification, RelayPoolOptions};
pub use self::publish::{PublishResponse, PublishTracker};
pub use self::relay::{RelaySocket, SocketEvent};
pub use self::state::{LogEntry, LogLevel, PoolState, RelaySubPhase, Subscription};
pub use self::subscription::SubscriptionId;
pub use self::transport::websocket::WebSocketTransport;
pub use self::url::RelayUrl;
