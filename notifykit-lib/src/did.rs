//! DID method codecs used inside JWT claims.
//!
//! Three methods appear on the wire: `did:key` wraps Ed25519 public keys
//! (multicodec `ed25519-pub` + base58btc), `did:pkh` wraps CAIP-10 accounts,
//! and `did:web` wraps bare dapp domains.

use crate::errors::{NotifyError, Result};
use crate::types::Account;

pub const DID_KEY_PREFIX: &str = "did:key:";
pub const DID_PKH_PREFIX: &str = "did:pkh:";
pub const DID_WEB_PREFIX: &str = "did:web:";

/// Multicodec prefix for an Ed25519 public key (varint 0xed).
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Multibase prefix for base58btc.
const BASE58_BTC: char = 'z';

/// Encode a 32-byte Ed25519 public key (hex) as a `did:key` identifier.
pub fn encode_ed25519_did_key(public_key_hex: &str) -> Result<String> {
    let raw = hex::decode(public_key_hex)
        .map_err(|e| NotifyError::CryptoFailure(format!("public key is not valid hex: {e}")))?;
    if raw.len() != 32 {
        return Err(NotifyError::CryptoFailure(format!(
            "ed25519 public key must be 32 bytes, got {}",
            raw.len()
        )));
    }
    let mut prefixed = Vec::with_capacity(34);
    prefixed.extend_from_slice(&ED25519_MULTICODEC);
    prefixed.extend_from_slice(&raw);
    Ok(format!(
        "{DID_KEY_PREFIX}{BASE58_BTC}{}",
        bs58::encode(prefixed).into_string()
    ))
}

/// Decode a `did:key` identifier back to its Ed25519 public key, hex encoded.
pub fn decode_ed25519_did_key(did: &str) -> Result<String> {
    let body = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| NotifyError::JwtDecodeFailed(format!("not a did:key: {did}")))?;
    let encoded = body
        .strip_prefix(BASE58_BTC)
        .ok_or_else(|| NotifyError::JwtDecodeFailed(format!("unsupported multibase in {did}")))?;
    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| NotifyError::JwtDecodeFailed(format!("bad base58 in {did}: {e}")))?;
    match decoded.as_slice() {
        [0xed, 0x01, raw @ ..] if raw.len() == 32 => Ok(hex::encode(raw)),
        _ => Err(NotifyError::JwtDecodeFailed(format!(
            "not an ed25519 did:key: {did}"
        ))),
    }
}

/// Wrap a CAIP-10 account in a `did:pkh` identifier.
pub fn encode_did_pkh(account: &Account) -> String {
    format!("{DID_PKH_PREFIX}{account}")
}

/// Extract the CAIP-10 account from a `did:pkh` identifier.
pub fn decode_did_pkh(did: &str) -> Result<Account> {
    let account = did
        .strip_prefix(DID_PKH_PREFIX)
        .ok_or_else(|| NotifyError::JwtDecodeFailed(format!("not a did:pkh: {did}")))?;
    Account::new(account)
}

/// Wrap a dapp domain in a `did:web` identifier.
pub fn encode_did_web(domain: &str) -> String {
    let bare = domain
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    format!("{DID_WEB_PREFIX}{bare}")
}

/// Extract the bare domain from a `did:web` identifier.
pub fn decode_did_web(did: &str) -> Result<String> {
    did.strip_prefix(DID_WEB_PREFIX)
        .map(str::to_string)
        .ok_or_else(|| NotifyError::JwtDecodeFailed(format!("not a did:web: {did}")))
}
