//! In-memory key chain.
//!
//! The key chain is the only owner of raw private material: per-topic
//! symmetric keys and X25519 keypairs. Secrets are zeroized when entries are
//! dropped. Host applications that need persistence wrap this type behind
//! their own storage; the engine only ever goes through these methods.
//!
//! # Thread Safety
//!
//! Uses `RwLock` for thread-safe access. Lock poisoning is reported as a
//! store failure rather than a panic.

use std::collections::HashMap;
use std::sync::RwLock;

use zeroize::Zeroizing;

use crate::errors::{NotifyError, Result};

/// Lifecycle of an X25519 keypair.
///
/// The subscribe keypair is ephemeral and may be discarded once its
/// subscription is established; the watch keypair is persistent so the
/// device's watch response topic stays stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPairTag {
    Ephemeral,
    Persistent,
}

struct StoredKeyPair {
    secret: Zeroizing<[u8; 32]>,
    tag: KeyPairTag,
}

/// In-memory key chain holding symmetric keys and keypairs.
pub struct KeyChain {
    sym_keys: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
    key_pairs: RwLock<HashMap<String, StoredKeyPair>>,
    /// Receiver keypair bound to a topic, for opening type-1 envelopes.
    topic_bindings: RwLock<HashMap<String, String>>,
}

fn lock_error(context: &str) -> NotifyError {
    NotifyError::StoreFailure(format!("key chain lock poisoned during {context}"))
}

impl KeyChain {
    pub fn new() -> Self {
        Self {
            sym_keys: RwLock::new(HashMap::new()),
            key_pairs: RwLock::new(HashMap::new()),
            topic_bindings: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_sym_key(&self, topic: &str, sym_key_hex: &str) -> Result<()> {
        let raw = hex::decode(sym_key_hex)
            .map_err(|e| NotifyError::CryptoFailure(format!("sym key is not valid hex: {e}")))?;
        self.sym_keys
            .write()
            .map_err(|_| lock_error("set_sym_key"))?
            .insert(topic.to_string(), Zeroizing::new(raw));
        Ok(())
    }

    pub fn sym_key(&self, topic: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .sym_keys
            .read()
            .map_err(|_| lock_error("sym_key"))?
            .get(topic)
            .map(|k| k.to_vec()))
    }

    pub fn has_sym_key(&self, topic: &str) -> bool {
        self.sym_keys
            .read()
            .map(|keys| keys.contains_key(topic))
            .unwrap_or(false)
    }

    pub fn delete_sym_key(&self, topic: &str) -> Result<()> {
        self.sym_keys
            .write()
            .map_err(|_| lock_error("delete_sym_key"))?
            .remove(topic);
        self.topic_bindings
            .write()
            .map_err(|_| lock_error("delete_sym_key"))?
            .remove(topic);
        Ok(())
    }

    /// Store a keypair under its public key hex.
    pub fn insert_key_pair(&self, public_hex: &str, secret: [u8; 32], tag: KeyPairTag) -> Result<()> {
        self.key_pairs
            .write()
            .map_err(|_| lock_error("insert_key_pair"))?
            .insert(
                public_hex.to_string(),
                StoredKeyPair {
                    secret: Zeroizing::new(secret),
                    tag,
                },
            );
        Ok(())
    }

    /// The private half of a stored keypair.
    pub fn secret_for(&self, public_hex: &str) -> Result<Option<[u8; 32]>> {
        Ok(self
            .key_pairs
            .read()
            .map_err(|_| lock_error("secret_for"))?
            .get(public_hex)
            .map(|kp| *kp.secret))
    }

    pub fn key_pair_tag(&self, public_hex: &str) -> Result<Option<KeyPairTag>> {
        Ok(self
            .key_pairs
            .read()
            .map_err(|_| lock_error("key_pair_tag"))?
            .get(public_hex)
            .map(|kp| kp.tag))
    }

    pub fn delete_key_pair(&self, public_hex: &str) -> Result<()> {
        self.key_pairs
            .write()
            .map_err(|_| lock_error("delete_key_pair"))?
            .remove(public_hex);
        Ok(())
    }

    /// Bind a topic to the keypair that can open its type-1 envelopes.
    pub fn bind_topic(&self, topic: &str, public_hex: &str) -> Result<()> {
        self.topic_bindings
            .write()
            .map_err(|_| lock_error("bind_topic"))?
            .insert(topic.to_string(), public_hex.to_string());
        Ok(())
    }

    pub fn key_pair_for_topic(&self, topic: &str) -> Result<Option<String>> {
        Ok(self
            .topic_bindings
            .read()
            .map_err(|_| lock_error("key_pair_for_topic"))?
            .get(topic)
            .cloned())
    }
}

impl Default for KeyChain {
    fn default() -> Self {
        Self::new()
    }
}
