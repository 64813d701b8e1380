//! Well-known document resolution.
//!
//! Dapps (and the notify server itself) publish their cryptographic identity
//! at `/.well-known/did.json` and their notification categories at
//! `/.well-known/wc-notify-config.json`. Both documents are immutable for the
//! lifetime of a process, so results are cached after the first fetch and a
//! given URL costs at most one network round trip per document kind.

use std::collections::HashMap;

use base64::Engine;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::{NotifyError, Result};
use crate::types::{DappIdentity, NotifyConfig};

pub const DID_DOC_PATH: &str = "/.well-known/did.json";
pub const NOTIFY_CONFIG_PATH: &str = "/.well-known/wc-notify-config.json";

#[derive(Debug, Deserialize)]
struct DidDocument {
    #[serde(rename = "verificationMethod", default)]
    verification_method: Vec<VerificationMethod>,
    #[serde(rename = "keyAgreement", default)]
    key_agreement: Vec<String>,
    #[serde(default)]
    authentication: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VerificationMethod {
    id: String,
    #[serde(rename = "publicKeyJwk")]
    public_key_jwk: Option<PublicKeyJwk>,
}

#[derive(Debug, Deserialize)]
struct PublicKeyJwk {
    x: String,
}

/// Resolves and caches a domain's well-known documents.
pub struct WellKnownResolver {
    http: reqwest::Client,
    identities: RwLock<HashMap<String, DappIdentity>>,
    configs: RwLock<HashMap<String, NotifyConfig>>,
}

impl WellKnownResolver {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Create a resolver sharing an existing HTTP client.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            identities: RwLock::new(HashMap::new()),
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Normalize a bare domain or URL into a scheme-qualified base URL.
    fn base_url(dapp_url: &str) -> String {
        let trimmed = dapp_url.trim_end_matches('/');
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        }
    }

    /// Resolve a dapp's key-agreement and authentication keys from its
    /// `did.json`.
    pub async fn resolve_keys(&self, dapp_url: &str) -> Result<DappIdentity> {
        let base = Self::base_url(dapp_url);
        if let Some(identity) = self.identities.read().await.get(&base) {
            return Ok(identity.clone());
        }

        let url = format!("{base}{DID_DOC_PATH}");
        let doc: DidDocument = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| NotifyError::DidDocUnavailable {
                url: url.clone(),
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| NotifyError::DidDocMalformed(format!("{url}: {e}")))?;

        let identity = DappIdentity {
            key_agreement: extract_key(&doc, doc.key_agreement.first(), "keyAgreement")?,
            authentication: extract_key(&doc, doc.authentication.first(), "authentication")?,
        };
        debug!(%base, "resolved did.json");

        self.identities
            .write()
            .await
            .insert(base, identity.clone());
        Ok(identity)
    }

    /// Resolve a dapp's `wc-notify-config.json`.
    pub async fn resolve_notify_config(&self, dapp_url: &str) -> Result<NotifyConfig> {
        let base = Self::base_url(dapp_url);
        if let Some(config) = self.configs.read().await.get(&base) {
            return Ok(config.clone());
        }

        let url = format!("{base}{NOTIFY_CONFIG_PATH}");
        let config: NotifyConfig = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| NotifyError::ConfigUnavailable {
                url: url.clone(),
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| NotifyError::ConfigUnavailable {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        debug!(%base, types = config.types.len(), "resolved notify config");

        self.configs.write().await.insert(base, config.clone());
        Ok(config)
    }
}

impl Default for WellKnownResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Locate the verification method referenced by a relationship entry and
/// decode its JWK `x` coordinate to hex.
fn extract_key(
    doc: &DidDocument,
    reference: Option<&String>,
    relationship: &str,
) -> Result<String> {
    let reference = reference.ok_or_else(|| {
        NotifyError::DidDocMalformed(format!("missing {relationship} relationship"))
    })?;
    let method = doc
        .verification_method
        .iter()
        .find(|m| &m.id == reference)
        .ok_or_else(|| {
            NotifyError::DidDocMalformed(format!(
                "verification method {reference} not found for {relationship}"
            ))
        })?;
    let jwk = method.public_key_jwk.as_ref().ok_or_else(|| {
        NotifyError::DidDocMalformed(format!("verification method {reference} has no publicKeyJwk"))
    })?;
    let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(&jwk.x)
        .map_err(|e| {
            NotifyError::DidDocMalformed(format!("bad base64url in {reference} x: {e}"))
        })?;
    Ok(hex::encode(raw))
}
