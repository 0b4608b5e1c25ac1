// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! The pool actor's single command inbox.
//!
//! Every public [`RelayPool`](super::RelayPool) method is a thin wrapper that
//! builds one of these and sends it down the actor's `mpsc` channel. There is
//! no `add_relay`/`remove_relay`: a relay's socket is created lazily the
//! first time a `Query` or `Publish` names it as a target, and it simply
//! stops being reconnected once no subscription targets it anymore.

use std::collections::HashSet;

use tokio::sync::oneshot;

use super::options::QuerySource;
use crate::event::Event;
use crate::optimizer::Request;
use crate::publish::PublishResponse;
use crate::subscription::SubscriptionId;
use crate::url::RelayUrl;

/// A message sent to the pool actor.
pub enum Command {
    /// Issue a query. `completer` is `Some` for a blocking query and `None`
    /// for a streaming subscription.
    Query {
        /// Subscription id + filters
        request: Request,
        /// Target relays, streaming flag, event filter, cache override
        source: QuerySource,
        /// Present iff this is a blocking query
        completer: Option<oneshot::Sender<Vec<Event>>>,
    },
    /// Close a subscription and send CLOSE to each connected target relay.
    Unsubscribe {
        /// Subscription id
        subscription_id: SubscriptionId,
    },
    /// Publish events to a set of relays, tracking OK verdicts.
    Publish {
        /// Events to send
        events: Vec<Event>,
        /// Target relays
        relays: HashSet<RelayUrl>,
        /// Reply with the aggregated verdicts once complete or timed out
        reply: oneshot::Sender<PublishResponse>,
    },
    /// Reset backoff and force an immediate reconnect attempt for any relay
    /// currently `waiting`/`failed`/`disconnected` with a live subscription.
    EnsureConnected,
    /// Tear down every socket, timer, and buffer.
    Dispose {
        /// Reply once torn down
        reply: oneshot::Sender<()>,
    },
}
