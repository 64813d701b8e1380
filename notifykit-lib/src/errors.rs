//! Error types for Notifykit operations.

/// Result type used across the Notifykit crates.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Comprehensive error type for notify-engine operations.
///
/// Variants map one-to-one onto the failure kinds a host application needs to
/// distinguish: missing prerequisites surface synchronously, transport errors
/// propagate, and inbound-handling errors are reported to the peer where a
/// request id exists.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// An operation was attempted before the account was registered.
    #[error("account not registered: {0}")]
    NotInitialized(String),

    /// No subscription is known for the given topic.
    #[error("no subscription for topic {0}")]
    UnknownSubscription(String),

    /// The dapp's `did.json` could not be fetched.
    #[error("did document unavailable at {url}: {reason}")]
    DidDocUnavailable { url: String, reason: String },

    /// The dapp's `did.json` was fetched but could not be interpreted.
    #[error("did document malformed: {0}")]
    DidDocMalformed(String),

    /// The dapp's `wc-notify-config.json` could not be fetched or parsed.
    #[error("notify config unavailable at {url}: {reason}")]
    ConfigUnavailable { url: String, reason: String },

    /// A JWT could not be decoded into the expected claim set.
    #[error("jwt decode failed: {0}")]
    JwtDecodeFailed(String),

    /// A JWT carried an unexpected `act` discriminator.
    #[error("unexpected jwt act: expected {expected}, got {actual}")]
    JwtActMismatch { expected: String, actual: String },

    /// A JWT was outside its validity window.
    #[error("jwt expired or not yet valid")]
    JwtExpired,

    /// Key agreement, sealing or opening failed.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// The relay rejected a publish/subscribe/unsubscribe.
    #[error("relay failure: {0}")]
    RelayFailure(String),

    /// A persistent store operation failed.
    #[error("store failure: {0}")]
    StoreFailure(String),

    /// The identity service failed to register or sign.
    #[error("identity service failure: {0}")]
    IdentityFailure(String),

    /// An inbound payload did not match the protocol shape.
    #[error("invalid message payload: {0}")]
    InvalidMessagePayload(String),
}

impl From<serde_json::Error> for NotifyError {
    fn from(e: serde_json::Error) -> Self {
        NotifyError::InvalidMessagePayload(e.to_string())
    }
}
