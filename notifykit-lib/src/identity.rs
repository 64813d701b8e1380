//! Identity service seam.
//!
//! A keyserver binds an Ed25519 identity key to a blockchain account via a
//! user-signed statement. The engine registers once per (account, device)
//! and afterwards asks the service to sign claim sets on the identity key's
//! behalf; the raw identity key never passes through the engine.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::Account;

/// Statement a user signs to authorize notifications from a single dapp.
pub const LIMITED_IDENTITY_STATEMENT: &str =
    "I further authorize this app to send me notifications. Read more at https://walletconnect.com/notifications";

/// Statement a user signs to authorize notification management across all
/// dapps.
pub const UNLIMITED_IDENTITY_STATEMENT: &str =
    "I further authorize this app to view and manage my notifications for ALL apps. Read more at https://walletconnect.com/notifications-all-apps";

/// Host-supplied signer for the registration statement (e.g. the wallet's
/// blockchain key).
#[async_trait]
pub trait AccountSigner: Send + Sync {
    /// Sign a human-readable statement, returning the signature in the
    /// account namespace's canonical encoding.
    async fn sign(&self, message: &str) -> Result<String>;
}

/// Parameters for a one-time identity registration.
#[derive(Clone, Debug)]
pub struct RegisterIdentityParams {
    pub account: Account,
    pub statement: String,
    /// Domain shown to the user in the signed statement.
    pub domain: String,
}

/// Keyserver-backed identity key registry and JWT signer.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Register an identity key for the account, driving `on_sign` for the
    /// user-visible statement. Returns the identity public key as hex.
    async fn register_identity(
        &self,
        params: RegisterIdentityParams,
        on_sign: Arc<dyn AccountSigner>,
    ) -> Result<String>;

    /// The registered identity public key for an account, as hex.
    async fn get_identity(&self, account: &Account) -> Result<String>;

    /// Sign a claim set with the account's identity key, returning a compact
    /// JWS.
    async fn generate_id_auth(
        &self,
        account: &Account,
        claims: serde_json::Value,
    ) -> Result<String>;
}
