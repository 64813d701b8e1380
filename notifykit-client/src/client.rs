//! The notify client facade.
//!
//! `NotifyClient` wires the external collaborators (relay, crypto, identity
//! service, stores, expirer) into the protocol engine and exposes the public
//! operations: register, subscribe, update, delete, message decryption and
//! history access. Inbound traffic is handled by background tasks started
//! with [`NotifyClient::run`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use notifykit_lib::crypto::{CryptoService, EncodeOptions};
use notifykit_lib::did;
use notifykit_lib::errors::{NotifyError, Result};
use notifykit_lib::expirer::Expirer;
use notifykit_lib::identity::{
    AccountSigner, IdentityService, RegisterIdentityParams, LIMITED_IDENTITY_STATEMENT,
    UNLIMITED_IDENTITY_STATEMENT,
};
use notifykit_lib::keychain::KeyPairTag;
use notifykit_lib::relay::Relay;
use notifykit_lib::resolver::WellKnownResolver;
use notifykit_lib::storage::{KeyValueStore, MemoryStore};
use notifykit_lib::topics;
use notifykit_lib::types::{Account, NotifyMessage, Subscription};

use crate::auth::{
    self, act, DeleteAuth, MessageAuth, SharedClaims, SubscriptionAuth, UpdateAuth,
    WatchSubscriptionsAuth, JWT_SCP_SEPARATOR,
};
use crate::events::{EventEmitter, NotifyEvent};
use crate::ledger::{PendingRequest, PendingRequestData, RequestLedger};
use crate::rpc::{
    self, methods, DeleteParams, MessageParams, RpcRequest, SubscribeParams, UpdateParams,
    WatchSubscriptionsParams,
};
use crate::stores::{MessageStore, SubscriptionStore, TopicMessages};

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct NotifyClientConfig {
    /// Keyserver the identity key is registered with (`ksu` claim).
    pub keyserver_url: String,
    /// Notify server that owns authoritative subscription state.
    pub notify_server_url: String,
}

/// The three persistent stores the engine writes to.
pub struct NotifyStores {
    pub subscriptions: Arc<dyn KeyValueStore<Subscription>>,
    pub messages: Arc<dyn KeyValueStore<TopicMessages>>,
    pub requests: Arc<dyn KeyValueStore<PendingRequest>>,
}

impl NotifyStores {
    /// Volatile in-memory stores, for tests and short-lived hosts.
    pub fn in_memory() -> Self {
        Self {
            subscriptions: Arc::new(MemoryStore::new()),
            messages: Arc::new(MemoryStore::new()),
            requests: Arc::new(MemoryStore::new()),
        }
    }
}

/// Outcome of a subscribe request.
#[derive(Clone, Debug)]
pub struct SubscribeResult {
    pub id: u64,
    /// The signed `notify_subscription` JWT sent to the dapp.
    pub subscription_auth: String,
}

pub(crate) struct Engine {
    pub(crate) config: NotifyClientConfig,
    pub(crate) relay: Arc<dyn Relay>,
    pub(crate) crypto: Arc<dyn CryptoService>,
    pub(crate) identity: Arc<dyn IdentityService>,
    pub(crate) expirer: Arc<dyn Expirer>,
    pub(crate) resolver: Arc<WellKnownResolver>,
    pub(crate) subscriptions: SubscriptionStore,
    pub(crate) messages: MessageStore,
    pub(crate) ledger: RequestLedger,
    pub(crate) emitter: EventEmitter,
    /// Accounts registered in this process, with their identity keys.
    registered: RwLock<HashMap<Account, String>>,
    /// Persistent watch keypair per account.
    watch_keys: RwLock<HashMap<Account, String>>,
}

/// Wallet-side notify engine.
pub struct NotifyClient {
    engine: Arc<Engine>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl NotifyClient {
    pub fn new(
        config: NotifyClientConfig,
        relay: Arc<dyn Relay>,
        crypto: Arc<dyn CryptoService>,
        identity: Arc<dyn IdentityService>,
        expirer: Arc<dyn Expirer>,
        stores: NotifyStores,
    ) -> Self {
        Self::with_resolver(
            config,
            relay,
            crypto,
            identity,
            expirer,
            stores,
            Arc::new(WellKnownResolver::new()),
        )
    }

    /// Construct with a shared resolver (e.g. to reuse one HTTP client
    /// across engines).
    #[allow(clippy::too_many_arguments)]
    pub fn with_resolver(
        config: NotifyClientConfig,
        relay: Arc<dyn Relay>,
        crypto: Arc<dyn CryptoService>,
        identity: Arc<dyn IdentityService>,
        expirer: Arc<dyn Expirer>,
        stores: NotifyStores,
        resolver: Arc<WellKnownResolver>,
    ) -> Self {
        let engine = Engine {
            config,
            relay,
            crypto,
            identity,
            expirer: expirer.clone(),
            resolver,
            subscriptions: SubscriptionStore::new(stores.subscriptions),
            messages: MessageStore::new(stores.messages),
            ledger: RequestLedger::new(stores.requests, expirer),
            emitter: EventEmitter::new(),
            registered: RwLock::new(HashMap::new()),
            watch_keys: RwLock::new(HashMap::new()),
        };
        Self {
            engine: Arc::new(engine),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to the engine's event stream.
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<NotifyEvent> {
        self.engine.emitter.subscribe()
    }

    /// Start the inbound relay pump and the expiry pump.
    pub fn run(&self) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };

        let engine = self.engine.clone();
        let mut relay_rx = engine.relay.messages();
        tasks.push(tokio::spawn(async move {
            while let Ok(message) = relay_rx.recv().await {
                let engine = engine.clone();
                // Handlers run concurrently; per-topic ordering is the
                // relay's concern.
                tokio::spawn(async move { engine.dispatch(message).await });
            }
        }));

        let engine = self.engine.clone();
        let mut expiry_rx = engine.expirer.expirations();
        tasks.push(tokio::spawn(async move {
            while let Ok(expiration) = expiry_rx.recv().await {
                if let Some(id) = RequestLedger::id_from_target(&expiration.target) {
                    engine.on_request_expired(id).await;
                }
            }
        }));
    }

    /// Stop the background tasks.
    pub fn shutdown(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }

    /// Register the account's identity key with the keyserver and start
    /// watching its subscriptions.
    ///
    /// Registration succeeding is the contract; a failing initial watch is
    /// logged and retried implicitly by the next watch-triggering event.
    pub async fn register(
        &self,
        account: &Account,
        on_sign: Arc<dyn AccountSigner>,
        is_limited: bool,
        domain: &str,
    ) -> Result<String> {
        let statement = if is_limited {
            LIMITED_IDENTITY_STATEMENT
        } else {
            UNLIMITED_IDENTITY_STATEMENT
        };
        let identity_key = self
            .engine
            .identity
            .register_identity(
                RegisterIdentityParams {
                    account: account.clone(),
                    statement: statement.to_string(),
                    domain: domain.to_string(),
                },
                on_sign,
            )
            .await?;

        self.engine
            .registered
            .write()
            .await
            .insert(account.clone(), identity_key.clone());

        if let Err(e) = self.engine.watch_subscriptions(account).await {
            warn!(account = %account, error = %e, "initial watch_subscriptions failed");
        }

        Ok(identity_key)
    }

    /// Request a subscription to a dapp's notifications.
    pub async fn subscribe(&self, app_domain: &str, account: &Account) -> Result<SubscribeResult> {
        self.engine.subscribe(app_domain, account).await
    }

    /// Change the enabled scope set of a subscription.
    pub async fn update(&self, topic: &str, scope: &[String]) -> Result<bool> {
        self.engine.update(topic, scope).await
    }

    /// Ask the dapp and notify server to tear a subscription down. Local
    /// state is cleaned up when the server confirms via
    /// `subscriptions_changed`.
    pub async fn delete_subscription(&self, topic: &str) -> Result<()> {
        self.engine.delete_subscription(topic).await
    }

    /// Decrypt a raw notification envelope without touching engine state.
    pub async fn decrypt_message(&self, topic: &str, ciphertext: &str) -> Result<NotifyMessage> {
        self.engine.decrypt_message(topic, ciphertext).await
    }

    /// All stored messages for a subscription topic.
    pub async fn get_message_history(&self, topic: &str) -> Result<TopicMessages> {
        self.engine.messages.history(topic).await
    }

    /// Active subscriptions, optionally filtered by account.
    pub async fn get_active_subscriptions(
        &self,
        account: Option<&Account>,
    ) -> Result<HashMap<String, Subscription>> {
        self.engine.subscriptions.all(account).await
    }

    /// Remove a single stored message by its id.
    pub async fn delete_notify_message(&self, id: u64) -> Result<()> {
        self.engine.messages.delete_message(id).await
    }
}

impl Drop for NotifyClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Engine {
    /// The registered identity key for an account, as a `did:key` issuer.
    pub(crate) async fn issuer_for(&self, account: &Account) -> Result<String> {
        let identity_key = match self.registered.read().await.get(account) {
            Some(key) => key.clone(),
            None => self
                .identity
                .get_identity(account)
                .await
                .map_err(|_| NotifyError::NotInitialized(account.to_string()))?,
        };
        did::encode_ed25519_did_key(&identity_key)
    }

    fn shared_claims(&self, act: &str, iss: String, aud_key_hex: &str, account: &Account) -> Result<SharedClaims> {
        Ok(SharedClaims::new(
            act,
            iss,
            did::encode_ed25519_did_key(aud_key_hex)?,
            did::encode_did_pkh(account),
            self.config.keyserver_url.clone(),
        ))
    }

    pub(crate) async fn subscribe(
        &self,
        app_domain: &str,
        account: &Account,
    ) -> Result<SubscribeResult> {
        let iss = self.issuer_for(account).await?;

        // 1. Discover the dapp.
        let dapp = self.resolver.resolve_keys(app_domain).await?;
        let config = self.resolver.resolve_notify_config(app_domain).await?;

        // 2. Derive the dapp's subscribe topic and our response channel.
        let subscribe_topic = topics::subscribe_topic(&dapp.key_agreement)?;
        let ephemeral_key = self.crypto.generate_key_pair(KeyPairTag::Ephemeral).await?;
        let response_topic = self
            .crypto
            .generate_shared_key(&ephemeral_key, &dapp.key_agreement)
            .await?;
        self.relay.subscribe(&response_topic).await?;

        // 3. Sign the subscription claims.
        let scope_names = config.scope_names();
        let claims = SubscriptionAuth {
            shared: self.shared_claims(act::SUBSCRIPTION, iss, &dapp.authentication, account)?,
            scp: scope_names.join(JWT_SCP_SEPARATOR),
            app: did::encode_did_web(app_domain),
        };
        let subscription_auth = self
            .identity
            .generate_id_auth(account, serde_json::to_value(&claims)?)
            .await?;

        // 4. Record the pending request, then publish.
        let id = rpc::generate_request_id();
        self.ledger
            .insert(
                id,
                PendingRequest {
                    topic: response_topic,
                    method: methods::SUBSCRIBE.to_string(),
                    request: PendingRequestData {
                        account: Some(account.clone()),
                        app_domain: Some(app_domain.to_string()),
                        public_key: Some(ephemeral_key.clone()),
                        scope: Some(scope_names),
                        scope_update: None,
                    },
                },
                auth::now_unix() + rpc::PUBLISH_TTL_SECS,
            )
            .await?;

        let request = RpcRequest::new(
            id,
            methods::SUBSCRIBE,
            SubscribeParams {
                subscription_auth: subscription_auth.clone(),
            },
        );
        let envelope = self
            .crypto
            .encode(
                &subscribe_topic,
                &serde_json::to_value(&request)?,
                Some(EncodeOptions {
                    sender_public_key: ephemeral_key,
                    receiver_public_key: dapp.key_agreement,
                }),
            )
            .await?;
        self.relay
            .publish(
                &subscribe_topic,
                &envelope,
                rpc::request_options(methods::SUBSCRIBE),
            )
            .await?;
        debug!(%subscribe_topic, id, "subscribe request published");

        Ok(SubscribeResult {
            id,
            subscription_auth,
        })
    }

    pub(crate) async fn update(&self, topic: &str, scope: &[String]) -> Result<bool> {
        let subscription = self.subscriptions.require(topic).await?;
        let iss = self.issuer_for(&subscription.account).await?;
        let dapp = self
            .resolver
            .resolve_keys(&subscription.metadata.app_domain)
            .await?;

        let claims = UpdateAuth {
            shared: self.shared_claims(
                act::UPDATE,
                iss,
                &dapp.authentication,
                &subscription.account,
            )?,
            scp: scope.join(JWT_SCP_SEPARATOR),
            app: did::encode_did_web(&subscription.metadata.app_domain),
        };
        let update_auth = self
            .identity
            .generate_id_auth(&subscription.account, serde_json::to_value(&claims)?)
            .await?;

        let id = rpc::generate_request_id();
        self.ledger
            .insert(
                id,
                PendingRequest {
                    topic: topic.to_string(),
                    method: methods::UPDATE.to_string(),
                    request: PendingRequestData {
                        account: Some(subscription.account.clone()),
                        app_domain: Some(subscription.metadata.app_domain.clone()),
                        public_key: None,
                        scope: None,
                        scope_update: Some(scope.to_vec()),
                    },
                },
                auth::now_unix() + rpc::PUBLISH_TTL_SECS,
            )
            .await?;

        let request = RpcRequest::new(id, methods::UPDATE, UpdateParams { update_auth });
        let envelope = self
            .crypto
            .encode(topic, &serde_json::to_value(&request)?, None)
            .await?;
        self.relay
            .publish(topic, &envelope, rpc::request_options(methods::UPDATE))
            .await?;
        debug!(%topic, id, "update request published");

        Ok(true)
    }

    pub(crate) async fn delete_subscription(&self, topic: &str) -> Result<()> {
        let subscription = self.subscriptions.require(topic).await?;
        let iss = self.issuer_for(&subscription.account).await?;
        let dapp = self
            .resolver
            .resolve_keys(&subscription.metadata.app_domain)
            .await?;

        let claims = DeleteAuth {
            shared: self.shared_claims(
                act::DELETE,
                iss,
                &dapp.authentication,
                &subscription.account,
            )?,
            app: did::encode_did_web(&subscription.metadata.app_domain),
        };
        let delete_auth = self
            .identity
            .generate_id_auth(&subscription.account, serde_json::to_value(&claims)?)
            .await?;

        let id = rpc::generate_request_id();
        self.ledger
            .insert(
                id,
                PendingRequest {
                    topic: topic.to_string(),
                    method: methods::DELETE.to_string(),
                    request: PendingRequestData {
                        account: Some(subscription.account.clone()),
                        app_domain: Some(subscription.metadata.app_domain.clone()),
                        ..Default::default()
                    },
                },
                auth::now_unix() + rpc::PUBLISH_TTL_SECS,
            )
            .await?;

        let request = RpcRequest::new(id, methods::DELETE, DeleteParams { delete_auth });
        let envelope = self
            .crypto
            .encode(topic, &serde_json::to_value(&request)?, None)
            .await?;
        self.relay
            .publish(topic, &envelope, rpc::request_options(methods::DELETE))
            .await?;
        debug!(%topic, id, "delete request published");

        Ok(())
    }

    pub(crate) async fn decrypt_message(
        &self,
        topic: &str,
        ciphertext: &str,
    ) -> Result<NotifyMessage> {
        let payload = self.crypto.decode(topic, ciphertext).await?;
        let request: RpcRequest<MessageParams> = serde_json::from_value(payload)
            .map_err(|e| NotifyError::InvalidMessagePayload(format!("not a notify message: {e}")))?;
        let claims: MessageAuth = auth::from_jwt(&request.params.message_auth)?;
        claims.shared.validate(act::MESSAGE)?;
        Ok(claims.msg)
    }

    /// Open (or refresh) the watch channel with the notify server.
    pub(crate) async fn watch_subscriptions(&self, account: &Account) -> Result<()> {
        let iss = self.issuer_for(account).await?;
        let server = self
            .resolver
            .resolve_keys(&self.config.notify_server_url)
            .await?;
        let watch_topic = topics::subscribe_topic(&server.key_agreement)?;

        // The watch keypair is persistent so this device's response topic is
        // stable; reuse it when the account watched before.
        let watch_key = {
            let existing = self.watch_keys.read().await.get(account).cloned();
            match existing {
                Some(key) => key,
                None => {
                    let key = self.crypto.generate_key_pair(KeyPairTag::Persistent).await?;
                    self.watch_keys
                        .write()
                        .await
                        .insert(account.clone(), key.clone());
                    key
                }
            }
        };
        let response_topic = self
            .crypto
            .generate_shared_key(&watch_key, &server.key_agreement)
            .await?;
        self.relay.subscribe(&response_topic).await?;

        let claims = WatchSubscriptionsAuth {
            shared: self.shared_claims(
                act::WATCH_SUBSCRIPTIONS,
                iss,
                &server.authentication,
                account,
            )?,
        };
        let watch_subscriptions_auth = self
            .identity
            .generate_id_auth(account, serde_json::to_value(&claims)?)
            .await?;

        let id = rpc::generate_request_id();
        self.ledger
            .insert(
                id,
                PendingRequest {
                    topic: response_topic,
                    method: methods::WATCH_SUBSCRIPTIONS.to_string(),
                    request: PendingRequestData {
                        account: Some(account.clone()),
                        ..Default::default()
                    },
                },
                auth::now_unix() + rpc::PUBLISH_TTL_SECS,
            )
            .await?;

        let request = RpcRequest::new(
            id,
            methods::WATCH_SUBSCRIPTIONS,
            WatchSubscriptionsParams {
                watch_subscriptions_auth,
            },
        );
        let envelope = self
            .crypto
            .encode(
                &watch_topic,
                &serde_json::to_value(&request)?,
                Some(EncodeOptions {
                    sender_public_key: watch_key,
                    receiver_public_key: server.key_agreement,
                }),
            )
            .await?;
        self.relay
            .publish(
                &watch_topic,
                &envelope,
                rpc::request_options(methods::WATCH_SUBSCRIPTIONS),
            )
            .await?;
        debug!(account = %account, id, "watch_subscriptions published");

        Ok(())
    }

    pub(crate) async fn on_request_expired(&self, id: u64) {
        match self.ledger.take_expired(id).await {
            Ok(Some(_)) => {
                debug!(id, "request expired");
                self.emitter.emit(NotifyEvent::RequestExpire { id });
            }
            Ok(None) => {}
            Err(e) => warn!(id, error = %e, "failed to reap expired request"),
        }
    }
}
