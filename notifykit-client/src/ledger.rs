//! Outbound request ledger.
//!
//! Every outbound JSON-RPC request is recorded here before it reaches the
//! wire, keyed by its id, so an instantaneous response still finds its
//! context. Entries leave exactly once: taken when the response arrives, or
//! reaped when the expirer fires. The ledger also answers "which method was
//! this id?" for response routing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use notifykit_lib::errors::Result;
use notifykit_lib::expirer::Expirer;
use notifykit_lib::storage::KeyValueStore;
use notifykit_lib::types::Account;

const TARGET_PREFIX: &str = "request:";

/// Context captured alongside an outbound request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    /// Topic the response will arrive on.
    pub topic: String,
    pub method: String,
    pub request: PendingRequestData,
}

/// Method-specific request context.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequestData {
    pub account: Option<Account>,
    pub app_domain: Option<String>,
    /// Ephemeral public key a subscribe request was sent from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_update: Option<Vec<String>>,
}

/// Id-indexed ledger of in-flight requests.
pub struct RequestLedger {
    store: Arc<dyn KeyValueStore<PendingRequest>>,
    expirer: Arc<dyn Expirer>,
}

impl RequestLedger {
    pub fn new(
        store: Arc<dyn KeyValueStore<PendingRequest>>,
        expirer: Arc<dyn Expirer>,
    ) -> Self {
        Self { store, expirer }
    }

    /// Expirer target for a request id.
    pub fn target(id: u64) -> String {
        format!("{TARGET_PREFIX}{id}")
    }

    /// Parse an expirer target back to a request id.
    pub fn id_from_target(target: &str) -> Option<u64> {
        target.strip_prefix(TARGET_PREFIX)?.parse().ok()
    }

    /// Record a request and arm its expiry. Must complete before the request
    /// is published.
    pub async fn insert(&self, id: u64, pending: PendingRequest, expiry_unix: u64) -> Result<()> {
        self.store.set(&id.to_string(), pending).await?;
        self.expirer.set(&Self::target(id), expiry_unix).await
    }

    /// Look up a request without removing it.
    pub async fn get(&self, id: u64) -> Result<Option<PendingRequest>> {
        self.store.get(&id.to_string()).await
    }

    /// Remove an entry because its response arrived; disarms the expiry.
    pub async fn take(&self, id: u64) -> Result<Option<PendingRequest>> {
        let pending = self.store.get(&id.to_string()).await?;
        if pending.is_some() {
            self.store.delete(&id.to_string(), "response received").await?;
            self.expirer.del(&Self::target(id)).await?;
        }
        Ok(pending)
    }

    /// Remove an entry because its expiry fired. The timer is already gone.
    pub async fn take_expired(&self, id: u64) -> Result<Option<PendingRequest>> {
        let pending = self.store.get(&id.to_string()).await?;
        if pending.is_some() {
            self.store.delete(&id.to_string(), "request expired").await?;
        }
        Ok(pending)
    }
}
