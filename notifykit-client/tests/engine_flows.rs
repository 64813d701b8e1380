//! End-to-end engine flows against mock collaborators: subscribe, message
//! ingestion, scope updates, deletion, and request expiry.


use std::time::Duration;

use mock_implementations::{wait_event, TestBed};
use notifykit_client::auth::{self, act, MessageAuth, SharedClaims};
use notifykit_client::events::NotifyEvent;
use notifykit_client::ledger::RequestLedger;
use notifykit_client::rpc::{methods, MessageParams, RpcRequest, RpcResponse};
use notifykit_lib::crypto::CryptoService;
use notifykit_lib::did;
use notifykit_lib::errors::NotifyError;
use notifykit_lib::types::NotifyMessage;

fn gm_message() -> NotifyMessage {
    NotifyMessage {
        title: "Test Message".to_string(),
        body: "Test".to_string(),
        icon: String::new(),
        url: "https://test.coms".to_string(),
        kind: "gm_hourly".to_string(),
    }
}

/// Signed `wc_notifyMessage` request as the dapp would publish it.
fn message_request(bed: &TestBed, id: u64, msg: NotifyMessage, act_claim: &str) -> serde_json::Value {
    let claims = MessageAuth {
        shared: SharedClaims::new(
            act_claim,
            bed.dapp.auth_did_key(),
            did::encode_did_pkh(&bed.account),
            did::encode_did_pkh(&bed.account),
            mock_implementations::KEYSERVER_URL.to_string(),
        ),
        msg,
        app: did::encode_did_web(&bed.dapp.url()),
    };
    let request = RpcRequest::new(
        id,
        methods::MESSAGE,
        MessageParams {
            message_auth: bed.dapp.sign_claims(&claims),
        },
    );
    serde_json::to_value(&request).unwrap()
}

#[tokio::test]
async fn subscribe_happy_path() {
    let bed = TestBed::new().await;
    let mut events = bed.client.events();

    bed.register().await;
    bed.answer_watch(Vec::new()).await;
    wait_event(&mut events, |e| {
        matches!(e, NotifyEvent::SubscriptionsChanged { subscriptions } if subscriptions.is_empty())
    })
    .await;

    let result = bed
        .client
        .subscribe(&bed.dapp.url(), &bed.account)
        .await
        .unwrap();
    let (request_id, sym_key) = bed.answer_subscribe().await;
    assert_eq!(request_id, result.id);

    let event = wait_event(&mut events, |e| matches!(e, NotifyEvent::Subscription { .. })).await;
    match event {
        NotifyEvent::Subscription { id, error } => {
            assert_eq!(id, result.id);
            assert!(error.is_none());
        }
        _ => unreachable!(),
    }

    bed.push_changed(vec![bed.server_subscription(&sym_key, &["gm_hourly"])])
        .await;
    bed.wait_subscription_count(1).await;

    let subscriptions = bed.client.get_active_subscriptions(None).await.unwrap();
    assert_eq!(subscriptions.len(), 1);
    let topic = notifykit_lib::topics::subscription_topic(&sym_key).unwrap();
    let subscription = &subscriptions[&topic];
    assert_eq!(subscription.account, bed.account);
    assert_eq!(subscription.sym_key, sym_key);
    assert!(subscription.scope["gm_hourly"].enabled);

    // The reconciler installed the channel: message history, relay
    // subscription and key chain entry all exist.
    assert!(bed.client.get_message_history(&topic).await.unwrap().is_empty());
    assert!(bed.relay.is_subscribed(&topic));
    assert!(bed.key_chain.has_sym_key(&topic));

    // Exactly one notify_subscription event fired.
    let mut extra_subscription_events = 0;
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        if matches!(event, NotifyEvent::Subscription { .. }) {
            extra_subscription_events += 1;
        }
    }
    assert_eq!(extra_subscription_events, 0);
}

#[tokio::test]
async fn decrypt_message_round_trip() {
    let bed = TestBed::new().await;
    let (topic, _sym_key) = bed.establish_subscription().await;

    let payload = message_request(&bed, 1000, gm_message(), act::MESSAGE);
    let ciphertext = bed.dapp.seal(&topic, &payload).await;

    let msg = bed.client.decrypt_message(&topic, &ciphertext).await.unwrap();
    assert_eq!(msg, gm_message());

    // Purely functional: nothing was stored.
    assert!(bed.client.get_message_history(&topic).await.unwrap().is_empty());
}

#[tokio::test]
async fn inbound_message_is_stored_acked_then_emitted() {
    let bed = TestBed::new().await;
    let mut events = bed.client.events();
    let (topic, _sym_key) = bed.establish_subscription().await;

    let request_id = 4242;
    let payload = message_request(&bed, request_id, gm_message(), act::MESSAGE);
    let frame = bed.dapp.seal(&topic, &payload).await;
    bed.relay.inject(&topic, &frame);

    let event = wait_event(&mut events, |e| matches!(e, NotifyEvent::Message { .. })).await;
    match event {
        NotifyEvent::Message { id, topic: event_topic, message } => {
            assert_eq!(id, request_id);
            assert_eq!(event_topic, topic);
            assert_eq!(message, gm_message());
        }
        _ => unreachable!(),
    }

    // The acknowledgement was on the wire before the event fired.
    let ack = bed
        .relay
        .published()
        .into_iter()
        .find(|r| r.topic == topic && r.tag == 4003)
        .expect("message response published");
    let ack_payload = bed.dapp.cipher.decode(&topic, &ack.message).await.unwrap();
    assert_eq!(ack_payload["id"].as_u64(), Some(request_id));
    let response_auth: serde_json::Value = serde_json::from_slice(
        &base64::Engine::decode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            ack_payload["result"]["responseAuth"]
                .as_str()
                .unwrap()
                .split('.')
                .nth(1)
                .unwrap(),
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(response_auth["act"], "notify_message_response");

    // And the record landed in history with the claim's publish time.
    let history = bed.client.get_message_history(&topic).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[&request_id].message, gm_message());
    assert!(history[&request_id].published_at > 0);
}

#[tokio::test]
async fn invalid_message_auth_gets_error_reply_and_no_event() {
    let bed = TestBed::new().await;
    let mut events = bed.client.events();
    let (topic, _sym_key) = bed.establish_subscription().await;

    // Signed with the wrong act discriminator.
    let payload = message_request(&bed, 7, gm_message(), act::SUBSCRIPTION);
    let frame = bed.dapp.seal(&topic, &payload).await;
    bed.relay.inject(&topic, &frame);

    // An error response goes out on the message-response tag.
    let reply = bed.relay.wait_published(&topic, 0).await;
    assert_eq!(reply.tag, 4003);
    let reply_payload = bed.dapp.cipher.decode(&topic, &reply.message).await.unwrap();
    assert!(reply_payload["error"]["message"]
        .as_str()
        .unwrap()
        .contains("act"));

    // No notify_message event is emitted, and nothing was stored.
    let outcome = tokio::time::timeout(Duration::from_millis(300), async {
        wait_event(&mut events, |e| matches!(e, NotifyEvent::Message { .. })).await
    })
    .await;
    assert!(outcome.is_err());
    assert!(bed.client.get_message_history(&topic).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_disables_all_scopes() {
    let bed = TestBed::new().await;
    let mut events = bed.client.events();
    let (topic, sym_key) = bed.establish_subscription().await;

    assert!(bed.client.update(&topic, &[]).await.unwrap());

    let record = bed.relay.wait_published(&topic, 0).await;
    assert_eq!(record.tag, 4008);
    let payload = bed.dapp.cipher.decode(&topic, &record.message).await.unwrap();
    let update_auth: notifykit_client::auth::UpdateAuth =
        auth::from_jwt(payload["params"]["updateAuth"].as_str().unwrap()).unwrap();
    update_auth.shared.validate(act::UPDATE).unwrap();
    assert_eq!(update_auth.scp, "");

    let id = payload["id"].as_u64().unwrap();
    let response: RpcResponse<bool> = RpcResponse::result(id, true);
    let frame = bed
        .dapp
        .seal(&topic, &serde_json::to_value(&response).unwrap())
        .await;
    bed.relay.inject(&topic, &frame);
    wait_event(&mut events, |e| matches!(e, NotifyEvent::Update { .. })).await;

    // The actual scope change lands via reconciliation.
    bed.push_changed(vec![bed.server_subscription(&sym_key, &[])]).await;
    wait_event(&mut events, |e| {
        matches!(e, NotifyEvent::SubscriptionsChanged { subscriptions }
            if subscriptions.len() == 1 && subscriptions[0].scope.values().all(|s| !s.enabled))
    })
    .await;

    let subscriptions = bed.client.get_active_subscriptions(None).await.unwrap();
    assert!(subscriptions[&topic].scope.values().all(|s| !s.enabled));
}

#[tokio::test]
async fn active_subscription_filter_by_account() {
    use notifykit_lib::storage::KeyValueStore;
    use notifykit_lib::types::{Account, DappMetadata, RelayProtocol, Subscription};

    let bed = TestBed::new().await;
    let account1 = Account::new("eip155:1:0xAAA").unwrap();
    let account2 = Account::new("eip155:1:0xBBB").unwrap();

    for (topic, account) in [("topic-one", &account1), ("topic-two", &account2)] {
        bed.subscriptions_store
            .set(
                topic,
                Subscription {
                    topic: topic.to_string(),
                    account: account.clone(),
                    expiry: 0,
                    sym_key: String::new(),
                    scope: Default::default(),
                    metadata: DappMetadata {
                        name: String::new(),
                        description: String::new(),
                        icons: vec![],
                        app_domain: bed.dapp.url(),
                    },
                    relay: RelayProtocol::default(),
                },
            )
            .await
            .unwrap();
    }

    let filtered = bed
        .client
        .get_active_subscriptions(Some(&account2))
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered["topic-two"].account, account2);
}

#[tokio::test]
async fn delete_subscription_cleans_up_on_server_confirmation() {
    let bed = TestBed::new().await;
    let mut events = bed.client.events();
    let (topic, _sym_key) = bed.establish_subscription().await;
    assert!(bed.key_chain.has_sym_key(&topic));

    bed.client.delete_subscription(&topic).await.unwrap();

    let record = bed.relay.wait_published(&topic, 0).await;
    assert_eq!(record.tag, 4004);
    let payload = bed.dapp.cipher.decode(&topic, &record.message).await.unwrap();
    let delete_auth: notifykit_client::auth::DeleteAuth =
        auth::from_jwt(payload["params"]["deleteAuth"].as_str().unwrap()).unwrap();
    delete_auth.shared.validate(act::DELETE).unwrap();

    // Local state survives until the server confirms.
    assert_eq!(bed.client.get_active_subscriptions(None).await.unwrap().len(), 1);

    bed.push_changed(Vec::new()).await;
    wait_event(&mut events, |e| {
        matches!(e, NotifyEvent::SubscriptionsChanged { subscriptions } if subscriptions.is_empty())
    })
    .await;

    assert!(bed.client.get_active_subscriptions(None).await.unwrap().is_empty());
    assert!(bed.client.get_message_history(&topic).await.is_err());
    assert!(!bed.key_chain.has_sym_key(&topic));
    assert!(!bed.relay.is_subscribed(&topic));
}

#[tokio::test]
async fn did_doc_fetched_at_most_once_per_process() {
    let bed = TestBed::new().await;
    let mut events = bed.client.events();
    let (topic, _sym_key) = bed.establish_subscription().await;

    for id in [1u64, 2] {
        let payload = message_request(&bed, id, gm_message(), act::MESSAGE);
        let frame = bed.dapp.seal(&topic, &payload).await;
        bed.relay.inject(&topic, &frame);
        wait_event(&mut events, |e| matches!(e, NotifyEvent::Message { id: got, .. } if *got == id))
            .await;
    }

    let did_doc_fetches = bed
        .dapp
        .http
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == notifykit_lib::resolver::DID_DOC_PATH)
        .count();
    assert_eq!(did_doc_fetches, 1);
}

#[tokio::test]
async fn expired_request_emits_once_and_blocks_late_response() {
    let bed = TestBed::new().await;
    let mut events = bed.client.events();

    bed.register().await;
    bed.answer_watch(Vec::new()).await;

    let result = bed
        .client
        .subscribe(&bed.dapp.url(), &bed.account)
        .await
        .unwrap();
    let target = RequestLedger::target(result.id);
    assert!(bed.expirer.has_target(&target));

    bed.expirer.fire(&target);
    let event = wait_event(&mut events, |e| matches!(e, NotifyEvent::RequestExpire { .. })).await;
    match event {
        NotifyEvent::RequestExpire { id } => assert_eq!(id, result.id),
        _ => unreachable!(),
    }

    // A response arriving after expiry finds no ledger entry and emits
    // nothing.
    let (_, _) = bed.answer_subscribe().await;
    let outcome = tokio::time::timeout(Duration::from_millis(300), async {
        wait_event(&mut events, |e| matches!(e, NotifyEvent::Subscription { .. })).await
    })
    .await;
    assert!(outcome.is_err());
}

#[tokio::test]
async fn answered_request_never_expires() {
    let bed = TestBed::new().await;
    let mut events = bed.client.events();

    bed.register().await;
    bed.answer_watch(Vec::new()).await;

    let result = bed
        .client
        .subscribe(&bed.dapp.url(), &bed.account)
        .await
        .unwrap();
    let (_, _) = bed.answer_subscribe().await;
    wait_event(&mut events, |e| matches!(e, NotifyEvent::Subscription { .. })).await;

    // The response disarmed the expiry; firing the stale target is a no-op.
    let target = RequestLedger::target(result.id);
    assert!(!bed.expirer.has_target(&target));
    bed.expirer.fire(&target);
    let outcome = tokio::time::timeout(Duration::from_millis(300), async {
        wait_event(&mut events, |e| matches!(e, NotifyEvent::RequestExpire { .. })).await
    })
    .await;
    assert!(outcome.is_err());
}

#[tokio::test]
async fn operations_on_unknown_state_fail_synchronously() {
    let bed = TestBed::new().await;

    // Not registered yet.
    let err = bed
        .client
        .subscribe(&bed.dapp.url(), &bed.account)
        .await
        .unwrap_err();
    assert!(matches!(err, NotifyError::NotInitialized(_)));

    // Unknown subscription topic.
    let err = bed.client.update("no-such-topic", &[]).await.unwrap_err();
    assert!(matches!(err, NotifyError::UnknownSubscription(_)));
    let err = bed
        .client
        .delete_subscription("no-such-topic")
        .await
        .unwrap_err();
    assert!(matches!(err, NotifyError::UnknownSubscription(_)));
}

#[tokio::test]
async fn inbound_delete_request_emits_and_acks() {
    let bed = TestBed::new().await;
    let mut events = bed.client.events();
    let (topic, _sym_key) = bed.establish_subscription().await;

    let claims = notifykit_client::auth::DeleteAuth {
        shared: SharedClaims::new(
            act::DELETE,
            bed.dapp.auth_did_key(),
            did::encode_did_pkh(&bed.account),
            did::encode_did_pkh(&bed.account),
            mock_implementations::KEYSERVER_URL.to_string(),
        ),
        app: did::encode_did_web(&bed.dapp.url()),
    };
    let request = RpcRequest::new(
        99,
        methods::DELETE,
        notifykit_client::rpc::DeleteParams {
            delete_auth: bed.dapp.sign_claims(&claims),
        },
    );
    let frame = bed
        .dapp
        .seal(&topic, &serde_json::to_value(&request).unwrap())
        .await;
    bed.relay.inject(&topic, &frame);

    let event = wait_event(&mut events, |e| matches!(e, NotifyEvent::Delete { .. })).await;
    match event {
        NotifyEvent::Delete { id, topic: event_topic } => {
            assert_eq!(id, 99);
            assert_eq!(event_topic, topic);
        }
        _ => unreachable!(),
    }

    let ack = bed.relay.wait_published(&topic, 0).await;
    assert_eq!(ack.tag, 4005);

    // Teardown still waits for the server's subscriptions_changed.
    assert_eq!(bed.client.get_active_subscriptions(None).await.unwrap().len(), 1);
}
