//! Domain records shared between the engine and its stores.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{NotifyError, Result};

/// A CAIP-10 blockchain account: `namespace:chain:address`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(String);

impl Account {
    /// Parse a CAIP-10 account string.
    pub fn new(account: impl Into<String>) -> Result<Self> {
        let account = account.into();
        if account.splitn(3, ':').count() != 3 || account.ends_with(':') {
            return Err(NotifyError::InvalidMessagePayload(format!(
                "not a CAIP-10 account: {account}"
            )));
        }
        Ok(Self(account))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single decrypted notification as delivered to the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyMessage {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub url: String,
    /// Scope name this notification was published under.
    #[serde(rename = "type")]
    pub kind: String,
}

/// One notification category declared by a dapp, with its local opt-in state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeEntry {
    pub description: String,
    pub enabled: bool,
}

/// Dapp presentation metadata attached to a subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DappMetadata {
    pub name: String,
    pub description: String,
    pub icons: Vec<String>,
    pub app_domain: String,
}

/// Relay routing parameters for a subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayProtocol {
    pub protocol: String,
}

impl Default for RelayProtocol {
    fn default() -> Self {
        Self {
            protocol: "irn".to_string(),
        }
    }
}

/// Persisted record of one active subscription, keyed by its derived topic.
///
/// The topic is always the SHA-256 of the symmetric key, and the symmetric
/// key is mirrored in the key chain under the same topic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub topic: String,
    pub account: Account,
    /// Unix seconds after which the server considers the subscription stale.
    pub expiry: u64,
    pub sym_key: String,
    pub scope: HashMap<String, ScopeEntry>,
    pub metadata: DappMetadata,
    pub relay: RelayProtocol,
}

/// One received notification, stored under `messages[topic][id]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: u64,
    pub topic: String,
    pub message: NotifyMessage,
    /// Milliseconds since the epoch, taken from the signed `iat` claim.
    pub published_at: i64,
}

/// Server-authoritative subscription entry carried in `sbs[]` claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSubscription {
    pub account: Account,
    pub sym_key: String,
    pub scope: Vec<String>,
    pub expiry: u64,
    pub app_domain: String,
}

/// One notification type from a dapp's `wc-notify-config.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfigType {
    pub name: String,
    pub description: String,
}

/// A dapp's notify configuration, defining its allowed scope names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub icons: Vec<String>,
    pub types: Vec<NotifyConfigType>,
}

impl NotifyConfig {
    /// All declared scope names, in config order.
    pub fn scope_names(&self) -> Vec<String> {
        self.types.iter().map(|t| t.name.clone()).collect()
    }

    /// Build a scope map by intersecting the config types with a granted set.
    ///
    /// Every configured type appears in the result; a type is enabled iff its
    /// name is in `granted`.
    pub fn scope_map(&self, granted: &[String]) -> HashMap<String, ScopeEntry> {
        self.types
            .iter()
            .map(|t| {
                (
                    t.name.clone(),
                    ScopeEntry {
                        description: t.description.clone(),
                        enabled: granted.iter().any(|g| g == &t.name),
                    },
                )
            })
            .collect()
    }
}

/// A dapp's cryptographic identity, resolved from its `did.json`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DappIdentity {
    /// X25519 key-agreement public key, lowercase hex.
    pub key_agreement: String,
    /// Ed25519 authentication public key, lowercase hex.
    pub authentication: String,
}
