//! Reconciliation of local stores against server-authoritative state.
//!
//! The notify server's `sbs[]` claim lists every subscription an account
//! holds. Reconciling makes the local mirror equal to that list: stale
//! topics are torn down first (serialized, relay unsubscribe strictly before
//! the sym key leaves the key chain), then the server list is upserted
//! concurrently. A failure on one subscription never aborts the rest, and
//! reconciling the same list twice is a no-op.

use std::collections::HashSet;

use tracing::{debug, warn};

use notifykit_lib::errors::Result;
use notifykit_lib::topics;
use notifykit_lib::types::{Account, DappMetadata, RelayProtocol, ServerSubscription, Subscription};

use crate::client::Engine;

impl Engine {
    pub(crate) async fn reconcile(
        &self,
        account: &Account,
        sbs: &[ServerSubscription],
    ) -> Result<()> {
        let server_topics: HashSet<String> = sbs
            .iter()
            .filter_map(|sb| topics::subscription_topic(&sb.sym_key).ok())
            .collect();

        // Tear down topics the server no longer lists for this account.
        // Serialized, so a subscription briefly "moving" between lists can't
        // race its own resubscribe.
        let local = self.subscriptions.all(Some(account)).await?;
        for topic in local.keys().filter(|t| !server_topics.contains(*t)) {
            if let Err(e) = self.cleanup_subscription(topic).await {
                warn!(%topic, error = %e, "failed to clean up dropped subscription");
            }
        }

        // Upsert the authoritative list.
        let applied = futures::future::join_all(
            sbs.iter().map(|sb| self.apply_server_subscription(sb)),
        )
        .await;
        for (sb, result) in sbs.iter().zip(applied) {
            if let Err(e) = result {
                warn!(app_domain = %sb.app_domain, error = %e, "failed to apply server subscription");
            }
        }

        Ok(())
    }

    async fn apply_server_subscription(&self, sb: &ServerSubscription) -> Result<()> {
        let topic = topics::subscription_topic(&sb.sym_key)?;
        let config = self.resolver.resolve_notify_config(&sb.app_domain).await?;

        let is_new = self.subscriptions.get(&topic).await?.is_none();
        let subscription = Subscription {
            topic: topic.clone(),
            account: sb.account.clone(),
            expiry: sb.expiry,
            sym_key: sb.sym_key.clone(),
            scope: config.scope_map(&sb.scope),
            metadata: DappMetadata {
                name: config.name.clone(),
                description: config.description.clone(),
                icons: config.icons.clone(),
                app_domain: sb.app_domain.clone(),
            },
            relay: RelayProtocol::default(),
        };
        self.subscriptions.upsert(subscription).await?;

        if is_new {
            self.crypto.set_sym_key(&sb.sym_key, &topic).await?;
            self.messages.ensure(&topic).await?;
            self.relay.subscribe(&topic).await?;
            debug!(%topic, app_domain = %sb.app_domain, "subscription installed");
        }

        Ok(())
    }

    /// Remove every trace of a subscription. The relay unsubscribe happens
    /// first so an in-flight decrypt can still find the sym key.
    pub(crate) async fn cleanup_subscription(&self, topic: &str) -> Result<()> {
        self.relay.unsubscribe(topic).await?;

        let (subs, msgs, key) = futures::join!(
            self.subscriptions.delete(topic, "no longer on server"),
            self.messages.delete_topic(topic, "subscription removed"),
            self.crypto.delete_sym_key(topic),
        );
        subs?;
        msgs?;
        key?;
        debug!(%topic, "subscription cleaned up");
        Ok(())
    }
}
