//! JWT claim sets and compact JWS handling.
//!
//! Every protocol action travels as an EdDSA JWS over a typed claim set. The
//! `act` claim discriminates the action and must be checked before any other
//! field is trusted. On receipt only the claims are decoded; signature trust
//! derives from the encrypted channel the JWT arrived on.

use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use notifykit_lib::errors::{NotifyError, Result};
use notifykit_lib::types::{NotifyMessage, ServerSubscription};

/// Separator for scope names in the `scp` claim.
pub const JWT_SCP_SEPARATOR: &str = " ";

/// Validity of claims issued by this engine, seconds.
pub const CLAIMS_TTL_SECS: u64 = 86400;

/// Tolerated clock skew when validating `iat`, seconds.
const CLOCK_SKEW_SECS: u64 = 5;

/// `act` discriminator values.
pub mod act {
    pub const SUBSCRIPTION: &str = "notify_subscription";
    pub const UPDATE: &str = "notify_update";
    pub const DELETE: &str = "notify_delete";
    pub const MESSAGE: &str = "notify_message";
    pub const MESSAGE_RESPONSE: &str = "notify_message_response";
    pub const WATCH_SUBSCRIPTIONS: &str = "notify_watch_subscriptions";
    pub const WATCH_SUBSCRIPTIONS_RESPONSE: &str = "notify_watch_subscriptions_response";
    pub const SUBSCRIPTIONS_CHANGED: &str = "notify_subscriptions_changed";
}

/// Claims common to every protocol action.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SharedClaims {
    /// Issued-at, unix seconds.
    pub iat: u64,
    /// Expiry, unix seconds.
    pub exp: u64,
    /// `did:key` of the issuer's Ed25519 key.
    pub iss: String,
    /// `did:key` of the intended audience's Ed25519 key.
    pub aud: String,
    /// `did:pkh` of the wallet account.
    pub sub: String,
    /// Keyserver URL the identity key is registered with.
    pub ksu: String,
    /// Action discriminator.
    pub act: String,
}

impl SharedClaims {
    /// Build claims valid from now for [`CLAIMS_TTL_SECS`].
    pub fn new(act: &str, iss: String, aud: String, sub: String, ksu: String) -> Self {
        let iat = now_unix();
        Self {
            iat,
            exp: iat + CLAIMS_TTL_SECS,
            iss,
            aud,
            sub,
            ksu,
            act: act.to_string(),
        }
    }

    /// Check the discriminator and validity window.
    pub fn validate(&self, expected_act: &str) -> Result<()> {
        if self.act != expected_act {
            return Err(NotifyError::JwtActMismatch {
                expected: expected_act.to_string(),
                actual: self.act.clone(),
            });
        }
        let now = now_unix();
        if self.iat > now + CLOCK_SKEW_SECS || self.exp < now {
            return Err(NotifyError::JwtExpired);
        }
        Ok(())
    }
}

/// `notify_subscription`: wallet requests a subscription from a dapp.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionAuth {
    #[serde(flatten)]
    pub shared: SharedClaims,
    /// Space-separated scope names being enabled.
    pub scp: String,
    /// `did:web` of the dapp.
    pub app: String,
}

/// `notify_update`: wallet changes a subscription's scope set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateAuth {
    #[serde(flatten)]
    pub shared: SharedClaims,
    pub scp: String,
    pub app: String,
}

/// `notify_delete`: wallet tears a subscription down.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteAuth {
    #[serde(flatten)]
    pub shared: SharedClaims,
    pub app: String,
}

/// `notify_message`: dapp pushes a notification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageAuth {
    #[serde(flatten)]
    pub shared: SharedClaims,
    pub msg: NotifyMessage,
    /// `did:web` of the sending dapp, echoed back in the acknowledgement.
    #[serde(default)]
    pub app: String,
}

/// `notify_message_response`: wallet acknowledges a notification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageResponseAuth {
    #[serde(flatten)]
    pub shared: SharedClaims,
    pub app: String,
}

/// `notify_watch_subscriptions`: device asks the notify server to stream
/// subscription state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchSubscriptionsAuth {
    #[serde(flatten)]
    pub shared: SharedClaims,
}

/// `notify_watch_subscriptions_response`: server-authoritative list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchSubscriptionsResponseAuth {
    #[serde(flatten)]
    pub shared: SharedClaims,
    pub sbs: Vec<ServerSubscription>,
}

/// `notify_subscriptions_changed`: server pushes an updated list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionsChangedAuth {
    #[serde(flatten)]
    pub shared: SharedClaims,
    pub sbs: Vec<ServerSubscription>,
}

#[derive(Serialize, Deserialize)]
struct JwtHeader {
    typ: String,
    alg: String,
}

pub fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn b64_decode(part: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|e| NotifyError::JwtDecodeFailed(format!("bad base64url segment: {e}")))
}

/// Sign a claim set into a compact JWS with an Ed25519 key.
///
/// Production signing happens inside the identity service; this function is
/// the signing primitive it (and the test keyserver) uses.
pub fn sign_jwt<T: Serialize>(claims: &T, key: &SigningKey) -> Result<String> {
    let header = serde_json::to_vec(&JwtHeader {
        typ: "JWT".to_string(),
        alg: "EdDSA".to_string(),
    })
    .map_err(|e| NotifyError::JwtDecodeFailed(e.to_string()))?;
    let payload =
        serde_json::to_vec(claims).map_err(|e| NotifyError::JwtDecodeFailed(e.to_string()))?;

    let signing_input = format!("{}.{}", b64(&header), b64(&payload));
    let signature = key.sign(signing_input.as_bytes());
    Ok(format!("{signing_input}.{}", b64(&signature.to_bytes())))
}

/// Decode a compact JWS into a typed claim set without verifying the
/// signature.
pub fn from_jwt<T: DeserializeOwned>(jwt: &str) -> Result<T> {
    let mut parts = jwt.split('.');
    let (header, payload, signature) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s)) if parts.next().is_none() => (h, p, s),
        _ => {
            return Err(NotifyError::JwtDecodeFailed(
                "expected three dot-separated segments".to_string(),
            ))
        }
    };
    if signature.is_empty() {
        return Err(NotifyError::JwtDecodeFailed("empty signature".to_string()));
    }

    let header: JwtHeader = serde_json::from_slice(&b64_decode(header)?)
        .map_err(|e| NotifyError::JwtDecodeFailed(format!("bad header: {e}")))?;
    if header.alg != "EdDSA" {
        return Err(NotifyError::JwtDecodeFailed(format!(
            "unsupported alg {}",
            header.alg
        )));
    }

    serde_json::from_slice(&b64_decode(payload)?)
        .map_err(|e| NotifyError::JwtDecodeFailed(format!("bad claims: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifykit_lib::types::Account;

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn shared(act: &str) -> SharedClaims {
        SharedClaims::new(
            act,
            "did:key:z6MkissuerIssuerIssuer".to_string(),
            "did:key:z6MkaudienceAudience".to_string(),
            notifykit_lib::did::encode_did_pkh(&Account::new("eip155:1:0xABC").unwrap()),
            "https://keys.walletconnect.com".to_string(),
        )
    }

    #[test]
    fn sign_and_decode_round_trip() {
        let claims = SubscriptionAuth {
            shared: shared(act::SUBSCRIPTION),
            scp: "gm_hourly alerts".to_string(),
            app: "did:web:gm.example".to_string(),
        };
        let jwt = sign_jwt(&claims, &signing_key()).unwrap();
        assert_eq!(jwt.split('.').count(), 3);

        let decoded: SubscriptionAuth = from_jwt(&jwt).unwrap();
        assert_eq!(decoded.scp, claims.scp);
        assert_eq!(decoded.shared.act, act::SUBSCRIPTION);
        decoded.shared.validate(act::SUBSCRIPTION).unwrap();
    }

    #[test]
    fn act_mismatch_is_detected() {
        let claims = shared(act::MESSAGE);
        let err = claims.validate(act::SUBSCRIPTION).unwrap_err();
        assert!(matches!(err, NotifyError::JwtActMismatch { .. }));
    }

    #[test]
    fn expired_claims_are_rejected() {
        let mut claims = shared(act::MESSAGE);
        claims.iat = claims.iat.saturating_sub(10_000);
        claims.exp = claims.iat + 1;
        assert!(matches!(
            claims.validate(act::MESSAGE).unwrap_err(),
            NotifyError::JwtExpired
        ));
    }

    #[test]
    fn future_iat_beyond_skew_is_rejected() {
        let mut claims = shared(act::MESSAGE);
        claims.iat = now_unix() + 60;
        claims.exp = claims.iat + CLAIMS_TTL_SECS;
        assert!(matches!(
            claims.validate(act::MESSAGE).unwrap_err(),
            NotifyError::JwtExpired
        ));
    }

    #[test]
    fn malformed_tokens_fail_to_decode() {
        assert!(from_jwt::<SharedClaims>("only.two").is_err());
        assert!(from_jwt::<SharedClaims>("a.b.c.d").is_err());
        assert!(from_jwt::<SharedClaims>("!!!.###.$$$").is_err());
    }
}
