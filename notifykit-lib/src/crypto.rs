//! Key agreement and envelope sealing.
//!
//! Protocol payloads travel inside one of two envelope frames:
//!
//! ```text
//! type 0: [0x00][12 bytes nonce][ciphertext + tag]
//! type 1: [0x01][32 bytes sender public key][12 bytes nonce][ciphertext + tag]
//! ```
//!
//! Type 0 is the default once both peers share a symmetric key for the topic.
//! Type 1 carries the sender's X25519 public key and is used for the first
//! message to a recipient whose key is known from a DID document. Frames are
//! base64 encoded for the relay. The AEAD is ChaCha20-Poly1305; symmetric
//! keys come out of X25519 agreement through HKDF-SHA256.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::errors::{NotifyError, Result};
use crate::keychain::{KeyChain, KeyPairTag};
use crate::topics::sha256_hex;

const ENVELOPE_TYPE_0: u8 = 0;
const ENVELOPE_TYPE_1: u8 = 1;
const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// Sender/receiver keys for a type-1 envelope. `None` selects type 0.
#[derive(Clone, Debug)]
pub struct EncodeOptions {
    pub sender_public_key: String,
    pub receiver_public_key: String,
}

/// Cryptographic operations the engine depends on.
#[async_trait]
pub trait CryptoService: Send + Sync {
    /// Generate an X25519 keypair, keep the secret in the key chain, and
    /// return the public key as lowercase hex.
    async fn generate_key_pair(&self, tag: KeyPairTag) -> Result<String>;

    /// Derive the symmetric key shared between `self_public` (whose secret
    /// must be in the key chain) and `peer_public`, store it under its
    /// topic, and return that topic.
    async fn generate_shared_key(&self, self_public: &str, peer_public: &str) -> Result<String>;

    /// Install an externally provided symmetric key for a topic.
    async fn set_sym_key(&self, sym_key_hex: &str, topic: &str) -> Result<()>;

    /// Remove the symmetric key (and any keypair binding) for a topic.
    async fn delete_sym_key(&self, topic: &str) -> Result<()>;

    /// Seal a JSON payload for a topic. `opts` selects a type-1 envelope.
    async fn encode(
        &self,
        topic: &str,
        payload: &serde_json::Value,
        opts: Option<EncodeOptions>,
    ) -> Result<String>;

    /// Open an envelope received on a topic.
    async fn decode(&self, topic: &str, message: &str) -> Result<serde_json::Value>;
}

/// The shipped `CryptoService`: x25519-dalek + ChaCha20-Poly1305 over an
/// in-process key chain.
pub struct CipherSuite {
    key_chain: Arc<KeyChain>,
}

impl CipherSuite {
    pub fn new(key_chain: Arc<KeyChain>) -> Self {
        Self { key_chain }
    }

    pub fn key_chain(&self) -> &Arc<KeyChain> {
        &self.key_chain
    }

    fn parse_public(hex_key: &str) -> Result<PublicKey> {
        let raw: [u8; KEY_SIZE] = hex::decode(hex_key)
            .map_err(|e| NotifyError::CryptoFailure(format!("public key is not valid hex: {e}")))?
            .try_into()
            .map_err(|_| {
                NotifyError::CryptoFailure("x25519 public key must be 32 bytes".to_string())
            })?;
        Ok(PublicKey::from(raw))
    }

    /// X25519 agreement followed by HKDF-SHA256, matching the key schedule
    /// the notify server uses for response channels.
    fn derive_sym_key(secret: &StaticSecret, peer: &PublicKey) -> Result<[u8; KEY_SIZE]> {
        let shared = secret.diffie_hellman(peer);
        let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
        let mut sym_key = [0u8; KEY_SIZE];
        hk.expand(b"", &mut sym_key)
            .map_err(|e| NotifyError::CryptoFailure(format!("hkdf expand failed: {e}")))?;
        Ok(sym_key)
    }

    fn seal(key: &[u8], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_SIZE])> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| NotifyError::CryptoFailure(format!("seal failed: {e}")))?;
        Ok((sealed, nonce))
    }

    fn open(key: &[u8], nonce: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|e| NotifyError::CryptoFailure(format!("open failed: {e}")))
    }

    fn topic_key(&self, topic: &str) -> Result<Vec<u8>> {
        self.key_chain.sym_key(topic)?.ok_or_else(|| {
            NotifyError::CryptoFailure(format!("no sym key in key chain for topic {topic}"))
        })
    }
}

#[async_trait]
impl CryptoService for CipherSuite {
    async fn generate_key_pair(&self, tag: KeyPairTag) -> Result<String> {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = hex::encode(PublicKey::from(&secret).as_bytes());
        self.key_chain
            .insert_key_pair(&public, secret.to_bytes(), tag)?;
        Ok(public)
    }

    async fn generate_shared_key(&self, self_public: &str, peer_public: &str) -> Result<String> {
        let secret_bytes = self.key_chain.secret_for(self_public)?.ok_or_else(|| {
            NotifyError::CryptoFailure(format!("no keypair in key chain for {self_public}"))
        })?;
        let secret = StaticSecret::from(secret_bytes);
        let peer = Self::parse_public(peer_public)?;
        let sym_key = Self::derive_sym_key(&secret, &peer)?;

        let topic = sha256_hex(&sym_key);
        self.key_chain.set_sym_key(&topic, &hex::encode(sym_key))?;
        self.key_chain.bind_topic(&topic, self_public)?;
        Ok(topic)
    }

    async fn set_sym_key(&self, sym_key_hex: &str, topic: &str) -> Result<()> {
        self.key_chain.set_sym_key(topic, sym_key_hex)
    }

    async fn delete_sym_key(&self, topic: &str) -> Result<()> {
        self.key_chain.delete_sym_key(topic)
    }

    async fn encode(
        &self,
        topic: &str,
        payload: &serde_json::Value,
        opts: Option<EncodeOptions>,
    ) -> Result<String> {
        let plaintext = serde_json::to_vec(payload)
            .map_err(|e| NotifyError::CryptoFailure(format!("payload serialization: {e}")))?;

        let frame = match opts {
            None => {
                let key = self.topic_key(topic)?;
                let (sealed, nonce) = Self::seal(&key, &plaintext)?;
                let mut frame = Vec::with_capacity(1 + NONCE_SIZE + sealed.len());
                frame.push(ENVELOPE_TYPE_0);
                frame.extend_from_slice(&nonce);
                frame.extend_from_slice(&sealed);
                frame
            }
            Some(opts) => {
                let secret_bytes = self
                    .key_chain
                    .secret_for(&opts.sender_public_key)?
                    .ok_or_else(|| {
                        NotifyError::CryptoFailure(format!(
                            "no keypair in key chain for {}",
                            opts.sender_public_key
                        ))
                    })?;
                let secret = StaticSecret::from(secret_bytes);
                let receiver = Self::parse_public(&opts.receiver_public_key)?;
                let key = Self::derive_sym_key(&secret, &receiver)?;

                let sender_raw: [u8; KEY_SIZE] = hex::decode(&opts.sender_public_key)
                    .map_err(|e| {
                        NotifyError::CryptoFailure(format!("sender key is not valid hex: {e}"))
                    })?
                    .try_into()
                    .map_err(|_| {
                        NotifyError::CryptoFailure("sender key must be 32 bytes".to_string())
                    })?;

                let (sealed, nonce) = Self::seal(&key, &plaintext)?;
                let mut frame = Vec::with_capacity(1 + KEY_SIZE + NONCE_SIZE + sealed.len());
                frame.push(ENVELOPE_TYPE_1);
                frame.extend_from_slice(&sender_raw);
                frame.extend_from_slice(&nonce);
                frame.extend_from_slice(&sealed);
                frame
            }
        };

        Ok(base64::engine::general_purpose::STANDARD.encode(frame))
    }

    async fn decode(&self, topic: &str, message: &str) -> Result<serde_json::Value> {
        let frame = base64::engine::general_purpose::STANDARD
            .decode(message)
            .map_err(|e| NotifyError::CryptoFailure(format!("envelope is not base64: {e}")))?;

        let plaintext = match frame.split_first() {
            Some((&ENVELOPE_TYPE_0, rest)) => {
                if rest.len() < NONCE_SIZE {
                    return Err(NotifyError::CryptoFailure("truncated envelope".to_string()));
                }
                let (nonce, sealed) = rest.split_at(NONCE_SIZE);
                Self::open(&self.topic_key(topic)?, nonce, sealed)?
            }
            Some((&ENVELOPE_TYPE_1, rest)) => {
                if rest.len() < KEY_SIZE + NONCE_SIZE {
                    return Err(NotifyError::CryptoFailure("truncated envelope".to_string()));
                }
                let (sender_raw, rest) = rest.split_at(KEY_SIZE);
                let (nonce, sealed) = rest.split_at(NONCE_SIZE);

                let receiver_public =
                    self.key_chain.key_pair_for_topic(topic)?.ok_or_else(|| {
                        NotifyError::CryptoFailure(format!(
                            "no receiver keypair bound to topic {topic}"
                        ))
                    })?;
                let secret_bytes =
                    self.key_chain.secret_for(&receiver_public)?.ok_or_else(|| {
                        NotifyError::CryptoFailure(format!(
                            "no keypair in key chain for {receiver_public}"
                        ))
                    })?;
                let secret = StaticSecret::from(secret_bytes);
                let sender_bytes: [u8; KEY_SIZE] = sender_raw
                    .try_into()
                    .map_err(|_| NotifyError::CryptoFailure("truncated envelope".to_string()))?;
                let sender = PublicKey::from(sender_bytes);
                let key = Self::derive_sym_key(&secret, &sender)?;
                Self::open(&key, nonce, sealed)?
            }
            Some((other, _)) => {
                return Err(NotifyError::CryptoFailure(format!(
                    "unknown envelope type {other}"
                )))
            }
            None => return Err(NotifyError::CryptoFailure("empty envelope".to_string())),
        };

        serde_json::from_slice(&plaintext)
            .map_err(|e| NotifyError::CryptoFailure(format!("envelope payload is not JSON: {e}")))
    }
}
