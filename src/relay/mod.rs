// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Per-relay connection layer

pub mod error;
mod ping;
pub mod socket;

pub use self::error::Error;
pub use self::socket::{RelaySocket, SocketEvent};
