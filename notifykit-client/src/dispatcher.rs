//! Inbound relay traffic routing.
//!
//! Every relay message is decoded on arrival. Requests route by their
//! `method` field; responses route by the method recorded in the request
//! ledger under their id. Unknown methods and unmatched responses are logged
//! and dropped.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use notifykit_lib::errors::{NotifyError, Result};
use notifykit_lib::relay::RelayMessage;

use crate::client::Engine;
use crate::rpc::methods;

impl Engine {
    /// Entry point for one inbound relay message. Spawned per message, so a
    /// slow handler never blocks the stream.
    pub(crate) async fn dispatch(self: Arc<Self>, message: RelayMessage) {
        let topic = message.topic.clone();
        if let Err(e) = self.route(message).await {
            warn!(%topic, error = %e, "inbound message dropped");
        }
    }

    async fn route(&self, message: RelayMessage) -> Result<()> {
        let payload = self.crypto.decode(&message.topic, &message.message).await?;

        let method = payload
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        match method {
            Some(method) => {
                self.route_request(&message.topic, method, payload, message.published_at)
                    .await
            }
            None => self.route_response(&message.topic, payload).await,
        }
    }

    async fn route_request(
        &self,
        topic: &str,
        method: String,
        payload: Value,
        published_at: i64,
    ) -> Result<()> {
        debug!(%topic, %method, "inbound request");
        match method.as_str() {
            methods::MESSAGE => {
                self.on_message_request(topic, serde_json::from_value(payload)?, published_at)
                    .await
            }
            methods::DELETE => {
                self.on_delete_request(topic, serde_json::from_value(payload)?)
                    .await
            }
            methods::SUBSCRIPTIONS_CHANGED => {
                self.on_subscriptions_changed_request(topic, serde_json::from_value(payload)?)
                    .await
            }
            other => {
                debug!(%topic, method = other, "ignoring unknown request method");
                Ok(())
            }
        }
    }

    async fn route_response(&self, topic: &str, payload: Value) -> Result<()> {
        let id = payload
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| NotifyError::InvalidMessagePayload("response without id".to_string()))?;

        let Some(pending) = self.ledger.get(id).await? else {
            debug!(%topic, id, "response without a pending request");
            return Ok(());
        };

        debug!(%topic, id, method = %pending.method, "inbound response");
        match pending.method.as_str() {
            methods::SUBSCRIBE => {
                self.on_subscribe_response(topic, serde_json::from_value(payload)?)
                    .await
            }
            methods::UPDATE => {
                self.on_update_response(topic, serde_json::from_value(payload)?)
                    .await
            }
            methods::DELETE => {
                self.on_delete_response(topic, serde_json::from_value(payload)?)
                    .await
            }
            methods::WATCH_SUBSCRIPTIONS => {
                self.on_watch_subscriptions_response(topic, serde_json::from_value(payload)?)
                    .await
            }
            other => {
                debug!(%topic, id, method = other, "ignoring response for unroutable method");
                Ok(())
            }
        }
    }
}
