//! Topic derivation.
//!
//! Relay topics are 32-byte lowercase hex strings derived by hashing key
//! material: the subscribe topic hashes the dapp's key-agreement public key,
//! and every live subscription topic hashes its symmetric key. Response
//! topics fall out of key agreement (see `crypto::CryptoService`), which
//! derives the symmetric key first and hashes it the same way.

use sha2::{Digest, Sha256};

use crate::errors::{NotifyError, Result};

/// SHA-256 of raw bytes, as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn decode_hex(label: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value)
        .map_err(|e| NotifyError::CryptoFailure(format!("{label} is not valid hex: {e}")))
}

/// Topic a dapp listens on for subscribe requests: SHA-256 of its
/// key-agreement public key. Both parties derive it from the DID document.
pub fn subscribe_topic(dapp_public_key_hex: &str) -> Result<String> {
    Ok(sha256_hex(&decode_hex("dapp public key", dapp_public_key_hex)?))
}

/// Topic of an established subscription: SHA-256 of its symmetric key.
pub fn subscription_topic(sym_key_hex: &str) -> Result<String> {
    Ok(sha256_hex(&decode_hex("sym key", sym_key_hex)?))
}
