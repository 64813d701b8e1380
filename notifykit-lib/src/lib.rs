//! # Notifykit primitives
//!
//! Core types, key handling and external collaborator seams for the Notifykit
//! engine. The engine itself lives in `notifykit-client`; this crate holds
//! everything it shares with hosts: the domain records, topic derivation, DID
//! codecs, the well-known document resolver, the envelope cipher suite, and
//! the traits a host implements to supply its own relay, identity service,
//! stores and timers.

pub mod crypto;
pub mod did;
pub mod errors;
pub mod expirer;
pub mod identity;
pub mod keychain;
pub mod relay;
pub mod resolver;
pub mod storage;
pub mod topics;
pub mod types;

pub use crypto::{CipherSuite, CryptoService, EncodeOptions};
pub use errors::{NotifyError, Result};
pub use expirer::{Expiration, Expirer, TokioExpirer};
pub use identity::{
    AccountSigner, IdentityService, RegisterIdentityParams, LIMITED_IDENTITY_STATEMENT,
    UNLIMITED_IDENTITY_STATEMENT,
};
pub use keychain::{KeyChain, KeyPairTag};
pub use relay::{PublishOptions, Relay, RelayMessage};
pub use resolver::WellKnownResolver;
pub use storage::{KeyValueStore, MemoryStore, StoreEvent};
pub use types::{
    Account, DappIdentity, DappMetadata, MessageRecord, NotifyConfig, NotifyConfigType,
    NotifyMessage, RelayProtocol, ScopeEntry, ServerSubscription, Subscription,
};
