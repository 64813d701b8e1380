//! Persistent key-value store seam.
//!
//! Every persisted entity (subscriptions, messages, pending requests) lives
//! in a store implementing `KeyValueStore`. Stores guarantee atomic
//! get/set/delete per key and emit lifecycle events. `MemoryStore` is the
//! shipped implementation; hosts persist by providing their own.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::errors::Result;

/// Lifecycle event emitted by a store.
#[derive(Clone, Debug)]
pub enum StoreEvent<T> {
    Set { key: String, value: T },
    Update { key: String, value: T },
    Delete { key: String, reason: String },
    Sync,
}

/// Async key-value store with lifecycle events.
#[async_trait]
pub trait KeyValueStore<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<T>>;
    async fn set(&self, key: &str, value: T) -> Result<()>;
    /// Overwrite an existing entry. Distinguished from `set` only by the
    /// lifecycle event it emits.
    async fn update(&self, key: &str, value: T) -> Result<()>;
    async fn delete(&self, key: &str, reason: &str) -> Result<()>;
    async fn keys(&self) -> Result<Vec<String>>;
    async fn get_all(&self) -> Result<Vec<(String, T)>>;

    /// Lifecycle event stream. Each call returns a fresh receiver.
    fn events(&self) -> broadcast::Receiver<StoreEvent<T>>;
}

/// In-memory store.
///
/// State is lost when the process exits; production hosts wrap their own
/// database behind `KeyValueStore` instead.
pub struct MemoryStore<T> {
    entries: RwLock<HashMap<String, T>>,
    events: broadcast::Sender<StoreEvent<T>>,
}

impl<T: Clone + Send + Sync + 'static> MemoryStore<T> {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn emit(&self, event: StoreEvent<T>) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

impl<T: Clone + Send + Sync + 'static> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> KeyValueStore<T> for MemoryStore<T> {
    async fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: T) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        self.emit(StoreEvent::Set {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    async fn update(&self, key: &str, value: T) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        self.emit(StoreEvent::Update {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    async fn delete(&self, key: &str, reason: &str) -> Result<()> {
        if self.entries.write().await.remove(key).is_some() {
            self.emit(StoreEvent::Delete {
                key: key.to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn get_all(&self) -> Result<Vec<(String, T)>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn events(&self) -> broadcast::Receiver<StoreEvent<T>> {
        self.events.subscribe()
    }
}
