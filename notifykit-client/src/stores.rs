//! Domain wrappers over the key-value store seam.

use std::collections::HashMap;
use std::sync::Arc;

use notifykit_lib::errors::{NotifyError, Result};
use notifykit_lib::storage::KeyValueStore;
use notifykit_lib::types::{Account, MessageRecord, Subscription};

/// Messages received on one topic, keyed by request id.
pub type TopicMessages = HashMap<u64, MessageRecord>;

/// Local mirror of active subscriptions, keyed by derived topic.
#[derive(Clone)]
pub struct SubscriptionStore {
    inner: Arc<dyn KeyValueStore<Subscription>>,
}

impl SubscriptionStore {
    pub fn new(inner: Arc<dyn KeyValueStore<Subscription>>) -> Self {
        Self { inner }
    }

    pub async fn get(&self, topic: &str) -> Result<Option<Subscription>> {
        self.inner.get(topic).await
    }

    /// Fetch a subscription or fail with `UnknownSubscription`.
    pub async fn require(&self, topic: &str) -> Result<Subscription> {
        self.get(topic)
            .await?
            .ok_or_else(|| NotifyError::UnknownSubscription(topic.to_string()))
    }

    pub async fn upsert(&self, subscription: Subscription) -> Result<()> {
        let topic = subscription.topic.clone();
        if self.inner.get(&topic).await?.is_some() {
            self.inner.update(&topic, subscription).await
        } else {
            self.inner.set(&topic, subscription).await
        }
    }

    pub async fn delete(&self, topic: &str, reason: &str) -> Result<()> {
        self.inner.delete(topic, reason).await
    }

    pub async fn topics(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    /// All subscriptions, optionally filtered by account.
    pub async fn all(&self, account: Option<&Account>) -> Result<HashMap<String, Subscription>> {
        Ok(self
            .inner
            .get_all()
            .await?
            .into_iter()
            .filter(|(_, sub)| account.is_none_or(|a| &sub.account == a))
            .collect())
    }
}

/// Per-subscription append-only message history.
#[derive(Clone)]
pub struct MessageStore {
    inner: Arc<dyn KeyValueStore<TopicMessages>>,
}

impl MessageStore {
    pub fn new(inner: Arc<dyn KeyValueStore<TopicMessages>>) -> Self {
        Self { inner }
    }

    /// Create an empty history for a topic if none exists yet.
    pub async fn ensure(&self, topic: &str) -> Result<()> {
        if self.inner.get(topic).await?.is_none() {
            self.inner.set(topic, TopicMessages::new()).await?;
        }
        Ok(())
    }

    /// Append a record under its id. Redelivery overwrites in place.
    pub async fn append(&self, record: MessageRecord) -> Result<()> {
        let topic = record.topic.clone();
        let mut history = self.inner.get(&topic).await?.unwrap_or_default();
        history.insert(record.id, record);
        self.inner.update(&topic, history).await
    }

    pub async fn history(&self, topic: &str) -> Result<TopicMessages> {
        self.inner
            .get(topic)
            .await?
            .ok_or_else(|| NotifyError::UnknownSubscription(topic.to_string()))
    }

    pub async fn topics(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    pub async fn delete_topic(&self, topic: &str, reason: &str) -> Result<()> {
        self.inner.delete(topic, reason).await
    }

    /// Remove a single message by id, wherever it is stored.
    pub async fn delete_message(&self, id: u64) -> Result<()> {
        for (topic, mut history) in self.inner.get_all().await? {
            if history.remove(&id).is_some() {
                self.inner.update(&topic, history).await?;
                return Ok(());
            }
        }
        Err(NotifyError::InvalidMessagePayload(format!(
            "no stored message with id {id}"
        )))
    }
}
