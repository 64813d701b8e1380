//! Typed event stream surfaced to the host.

use tokio::sync::broadcast;
use tracing::debug;

use notifykit_lib::types::{NotifyMessage, Subscription};

use crate::rpc::RpcError;

/// Events the engine emits toward the host application.
#[derive(Clone, Debug)]
pub enum NotifyEvent {
    /// A subscribe request was answered. The authoritative subscription
    /// record arrives separately via `SubscriptionsChanged`.
    Subscription {
        id: u64,
        error: Option<RpcError>,
    },
    /// A notification was received, stored and acknowledged.
    Message {
        id: u64,
        topic: String,
        message: NotifyMessage,
    },
    /// An update request was answered.
    Update {
        id: u64,
        topic: String,
        error: Option<RpcError>,
    },
    /// The dapp deleted the subscription on this topic.
    Delete {
        id: u64,
        topic: String,
    },
    /// The local mirror was reconciled against server state.
    SubscriptionsChanged {
        subscriptions: Vec<Subscription>,
    },
    /// An in-flight request expired without a response.
    RequestExpire {
        id: u64,
    },
}

/// Broadcast emitter for [`NotifyEvent`].
pub struct EventEmitter {
    sender: broadcast::Sender<NotifyEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotifyEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: NotifyEvent) {
        if self.sender.send(event).is_err() {
            debug!("event emitted with no listeners");
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
