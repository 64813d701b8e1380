//! # Notifykit client
//!
//! Wallet-side notify engine. A `NotifyClient` discovers dapp identities
//! through their well-known documents, negotiates per-subscription encrypted
//! channels over a pub/sub relay, authorizes every protocol action with a
//! signed claim set, ingests encrypted notifications, and keeps its local
//! subscription mirror reconciled against the notify server's authoritative
//! state through a watch channel.
//!
//! External collaborators (relay transport, crypto primitives, identity
//! keyserver, persistent stores, expiry timers) are consumed through the
//! seams declared in `notifykit-lib`, so hosts control transport and
//! persistence while the engine owns protocol semantics.

pub mod auth;
pub mod client;
pub mod events;
pub mod ledger;
pub mod rpc;
pub mod stores;

mod dispatcher;
mod handlers;
mod reconciler;

pub use client::{
    NotifyClient, NotifyClientConfig, NotifyStores, SubscribeResult,
};
pub use events::NotifyEvent;
pub use ledger::{PendingRequest, PendingRequestData, RequestLedger};
pub use stores::{MessageStore, SubscriptionStore, TopicMessages};
