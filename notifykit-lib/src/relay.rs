//! Relay seam.
//!
//! The relay is a pub/sub transport indexed by topic string, carrying opaque
//! base64 payloads. The engine publishes with per-method tag/TTL options and
//! consumes a single inbound message stream.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::Result;

/// One message delivered by the relay.
#[derive(Clone, Debug)]
pub struct RelayMessage {
    pub topic: String,
    /// Base64 envelope frame.
    pub message: String,
    /// Milliseconds since the epoch at which the relay accepted the message.
    pub published_at: i64,
}

/// Publish parameters. Tags identify the protocol method to the relay;
/// notification-shaped traffic never sets `prompt`.
#[derive(Clone, Copy, Debug)]
pub struct PublishOptions {
    pub ttl_secs: u64,
    pub tag: u32,
    pub prompt: bool,
}

/// Pub/sub relay transport consumed by the engine.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn publish(&self, topic: &str, message: &str, opts: PublishOptions) -> Result<()>;
    async fn subscribe(&self, topic: &str) -> Result<()>;
    async fn unsubscribe(&self, topic: &str) -> Result<()>;

    /// Inbound message stream. Each call returns a fresh receiver positioned
    /// at the current end of the stream.
    fn messages(&self) -> broadcast::Receiver<RelayMessage>;
}
