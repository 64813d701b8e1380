//! Expiry timer seam.
//!
//! The engine registers a deadline per tracked target (pending requests,
//! expiring subscriptions) and reacts to the expiration stream. `TokioExpirer`
//! is the shipped implementation, running one sleep task per target.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::errors::{NotifyError, Result};

/// A target whose deadline has passed.
#[derive(Clone, Debug)]
pub struct Expiration {
    pub target: String,
    pub expiry: u64,
}

/// Deadline registry with an expiration event stream.
#[async_trait]
pub trait Expirer: Send + Sync {
    /// Register (or move) the deadline for a target, unix seconds.
    async fn set(&self, target: &str, expiry_unix: u64) -> Result<()>;

    /// Drop a target without firing it.
    async fn del(&self, target: &str) -> Result<()>;

    /// Expiration event stream. Each call returns a fresh receiver.
    fn expirations(&self) -> broadcast::Receiver<Expiration>;
}

/// Tokio-timer-backed expirer.
pub struct TokioExpirer {
    tasks: RwLock<HashMap<String, JoinHandle<()>>>,
    events: broadcast::Sender<Expiration>,
}

fn lock_error(context: &str) -> NotifyError {
    NotifyError::StoreFailure(format!("expirer lock poisoned during {context}"))
}

impl TokioExpirer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            tasks: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn now_unix() -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

impl Default for TokioExpirer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TokioExpirer {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.read() {
            for handle in tasks.values() {
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl Expirer for TokioExpirer {
    async fn set(&self, target: &str, expiry_unix: u64) -> Result<()> {
        let delay = expiry_unix.saturating_sub(Self::now_unix());
        let events = self.events.clone();
        let fired_target = target.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            debug!(target = %fired_target, "expiry fired");
            let _ = events.send(Expiration {
                target: fired_target,
                expiry: expiry_unix,
            });
        });

        if let Some(previous) = self
            .tasks
            .write()
            .map_err(|_| lock_error("set"))?
            .insert(target.to_string(), handle)
        {
            previous.abort();
        }
        Ok(())
    }

    async fn del(&self, target: &str) -> Result<()> {
        if let Some(handle) = self
            .tasks
            .write()
            .map_err(|_| lock_error("del"))?
            .remove(target)
        {
            handle.abort();
        }
        Ok(())
    }

    fn expirations(&self) -> broadcast::Receiver<Expiration> {
        self.events.subscribe()
    }
}
