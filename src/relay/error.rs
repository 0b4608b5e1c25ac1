// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use thiserror::Error;

use crate::message;
use crate::transport::TransportError;

/// [`RelaySocket`](super::socket::RelaySocket) error
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure (connect, read, write)
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Frame could not be parsed
    #[error(transparent)]
    Message(#[from] message::Error),
    /// Handshake did not complete within the deadline
    #[error("connect timed out")]
    Timeout,
    /// Operation requires a live connection
    #[error("relay not connected")]
    NotConnected,
}
