// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Pluggable websocket transport
//!
//! [`RelaySocket`](crate::socket::RelaySocket) talks to whatever implements
//! [`websocket::WebSocketTransport`] — the real `async-wsocket`-backed one in
//! production, an in-memory fake in tests (see `transport::fake`: a local
//! double used instead of a live network relay).

use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod websocket;

pub use self::error::TransportError;
pub use self::websocket::{DefaultWebsocketTransport, WebSocketTransport};

/// A boxed, possibly-borrowing future, used for the object-safe async trait
/// methods on [`WebSocketTransport`].
pub type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[cfg(test)]
pub mod fake;
