//! Protocol handlers, one per method.

use serde_json::Value;
use tracing::{debug, warn};

use notifykit_lib::did;
use notifykit_lib::errors::{NotifyError, Result};
use notifykit_lib::types::MessageRecord;

use crate::auth::{self, act, MessageAuth, MessageResponseAuth, SubscriptionsChangedAuth, WatchSubscriptionsResponseAuth};
use crate::client::Engine;
use crate::events::NotifyEvent;
use crate::rpc::{
    self, methods, MessageParams, ResponseAuth, RpcError, RpcRequest, RpcResponse,
    SubscriptionsChangedParams,
};

/// JSON-RPC error code used for protocol-level failures.
const INTERNAL_ERROR: i32 = -32603;

impl Engine {
    pub(crate) async fn on_subscribe_response(
        &self,
        topic: &str,
        response: RpcResponse<Value>,
    ) -> Result<()> {
        let Some(_pending) = self.ledger.take(response.id).await? else {
            debug!(%topic, id = response.id, "subscribe response for unknown request");
            return Ok(());
        };
        if let Some(error) = &response.error {
            warn!(%topic, id = response.id, code = error.code, "subscribe rejected");
        }
        // The authoritative subscription record arrives via the watch
        // channel; the event only correlates the request.
        self.emitter.emit(NotifyEvent::Subscription {
            id: response.id,
            error: response.error,
        });
        Ok(())
    }

    pub(crate) async fn on_message_request(
        &self,
        topic: &str,
        request: RpcRequest<MessageParams>,
        _published_at: i64,
    ) -> Result<()> {
        let claims = match auth::from_jwt::<MessageAuth>(&request.params.message_auth)
            .and_then(|claims| claims.shared.validate(act::MESSAGE).map(|()| claims))
        {
            Ok(claims) => claims,
            Err(e) => {
                warn!(%topic, id = request.id, error = %e, "rejecting notify message");
                return self.send_error(topic, request.id, methods::MESSAGE, &e).await;
            }
        };

        // Archived messages can arrive before the subscription has synced;
        // the history is created on demand.
        self.messages.ensure(topic).await?;
        self.messages
            .append(MessageRecord {
                id: request.id,
                topic: topic.to_string(),
                message: claims.msg.clone(),
                published_at: claims.shared.iat as i64 * 1000,
            })
            .await?;

        let account = did::decode_did_pkh(&claims.shared.sub)?;
        let response_claims = MessageResponseAuth {
            shared: auth::SharedClaims::new(
                act::MESSAGE_RESPONSE,
                self.issuer_for(&account).await?,
                claims.shared.iss.clone(),
                claims.shared.sub.clone(),
                self.config.keyserver_url.clone(),
            ),
            app: claims.app.clone(),
        };
        let response_auth = self
            .identity
            .generate_id_auth(&account, serde_json::to_value(&response_claims)?)
            .await?;

        // The acknowledgement goes out before the host hears about the
        // message.
        let response = RpcResponse::result(request.id, ResponseAuth { response_auth });
        let envelope = self
            .crypto
            .encode(topic, &serde_json::to_value(&response)?, None)
            .await?;
        self.relay
            .publish(topic, &envelope, rpc::response_options(methods::MESSAGE))
            .await?;

        self.emitter.emit(NotifyEvent::Message {
            id: request.id,
            topic: topic.to_string(),
            message: claims.msg,
        });
        Ok(())
    }

    pub(crate) async fn on_delete_request(
        &self,
        topic: &str,
        request: RpcRequest<crate::rpc::DeleteParams>,
    ) -> Result<()> {
        if let Err(e) = auth::from_jwt::<crate::auth::DeleteAuth>(&request.params.delete_auth)
            .and_then(|claims| claims.shared.validate(act::DELETE))
        {
            warn!(%topic, id = request.id, error = %e, "rejecting notify delete");
            return self.send_error(topic, request.id, methods::DELETE, &e).await;
        }

        let response: RpcResponse<bool> = RpcResponse::result(request.id, true);
        let envelope = self
            .crypto
            .encode(topic, &serde_json::to_value(&response)?, None)
            .await?;
        self.relay
            .publish(topic, &envelope, rpc::response_options(methods::DELETE))
            .await?;

        // Local teardown happens when the server confirms via
        // subscriptions_changed.
        self.emitter.emit(NotifyEvent::Delete {
            id: request.id,
            topic: topic.to_string(),
        });
        Ok(())
    }

    pub(crate) async fn on_update_response(
        &self,
        topic: &str,
        response: RpcResponse<Value>,
    ) -> Result<()> {
        let Some(pending) = self.ledger.take(response.id).await? else {
            debug!(%topic, id = response.id, "update response for unknown request");
            return Ok(());
        };
        self.emitter.emit(NotifyEvent::Update {
            id: response.id,
            topic: pending.topic,
            error: response.error,
        });
        Ok(())
    }

    pub(crate) async fn on_delete_response(
        &self,
        topic: &str,
        response: RpcResponse<Value>,
    ) -> Result<()> {
        if self.ledger.take(response.id).await?.is_some() {
            debug!(%topic, id = response.id, "delete acknowledged");
        }
        Ok(())
    }

    pub(crate) async fn on_watch_subscriptions_response(
        &self,
        topic: &str,
        response: RpcResponse<ResponseAuth>,
    ) -> Result<()> {
        let Some(_pending) = self.ledger.take(response.id).await? else {
            debug!(%topic, id = response.id, "watch response for unknown request");
            return Ok(());
        };
        let Some(result) = response.result else {
            warn!(
                %topic,
                id = response.id,
                error = ?response.error,
                "watch_subscriptions rejected"
            );
            return Ok(());
        };

        let claims: WatchSubscriptionsResponseAuth = auth::from_jwt(&result.response_auth)?;
        claims
            .shared
            .validate(act::WATCH_SUBSCRIPTIONS_RESPONSE)?;

        let account = did::decode_did_pkh(&claims.shared.sub)?;
        self.reconcile(&account, &claims.sbs).await?;
        self.emit_subscriptions_changed().await
    }

    pub(crate) async fn on_subscriptions_changed_request(
        &self,
        topic: &str,
        request: RpcRequest<SubscriptionsChangedParams>,
    ) -> Result<()> {
        let claims: SubscriptionsChangedAuth =
            auth::from_jwt(&request.params.subscriptions_changed_auth)?;
        if let Err(e) = claims.shared.validate(act::SUBSCRIPTIONS_CHANGED) {
            warn!(%topic, id = request.id, error = %e, "rejecting subscriptions_changed");
            return Err(e);
        }

        let account = did::decode_did_pkh(&claims.shared.sub)?;
        self.reconcile(&account, &claims.sbs).await?;
        // Fire-and-forget notification; no response goes back.
        self.emit_subscriptions_changed().await
    }

    async fn emit_subscriptions_changed(&self) -> Result<()> {
        let subscriptions = self.subscriptions.all(None).await?.into_values().collect();
        self.emitter
            .emit(NotifyEvent::SubscriptionsChanged { subscriptions });
        Ok(())
    }

    pub(crate) async fn send_error(
        &self,
        topic: &str,
        id: u64,
        method: &str,
        error: &NotifyError,
    ) -> Result<()> {
        let response: RpcResponse<Value> = RpcResponse::error(
            id,
            RpcError {
                code: INTERNAL_ERROR,
                message: error.to_string(),
            },
        );
        let envelope = self
            .crypto
            .encode(topic, &serde_json::to_value(&response)?, None)
            .await?;
        self.relay
            .publish(topic, &envelope, rpc::response_options(method))
            .await
    }
}
