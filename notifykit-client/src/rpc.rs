//! JSON-RPC wire types and per-method relay parameters.

use serde::{Deserialize, Serialize};

use notifykit_lib::relay::PublishOptions;

pub const JSON_RPC_VERSION: &str = "2.0";

/// Protocol method names.
pub mod methods {
    pub const SUBSCRIBE: &str = "wc_notifySubscribe";
    pub const MESSAGE: &str = "wc_notifyMessage";
    pub const DELETE: &str = "wc_notifyDelete";
    pub const UPDATE: &str = "wc_notifyUpdate";
    pub const WATCH_SUBSCRIPTIONS: &str = "wc_notifyWatchSubscriptions";
    pub const SUBSCRIPTIONS_CHANGED: &str = "wc_notifySubscriptionsChanged";
}

/// TTL shared by every protocol publish, seconds.
pub const PUBLISH_TTL_SECS: u64 = 86400;

/// Relay tag for a method's request leg.
fn request_tag(method: &str) -> u32 {
    match method {
        methods::SUBSCRIBE => 4000,
        methods::MESSAGE => 4002,
        methods::DELETE => 4004,
        methods::UPDATE => 4008,
        methods::WATCH_SUBSCRIPTIONS => 4010,
        methods::SUBSCRIPTIONS_CHANGED => 4012,
        _ => 0,
    }
}

/// Publish options for a method's request leg.
pub fn request_options(method: &str) -> PublishOptions {
    PublishOptions {
        ttl_secs: PUBLISH_TTL_SECS,
        tag: request_tag(method),
        prompt: false,
    }
}

/// Publish options for a method's response leg (request tag + 1).
pub fn response_options(method: &str) -> PublishOptions {
    PublishOptions {
        ttl_secs: PUBLISH_TTL_SECS,
        tag: request_tag(method) + 1,
        prompt: false,
    }
}

/// A JSON-RPC request envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest<T> {
    pub id: u64,
    pub jsonrpc: String,
    pub method: String,
    pub params: T,
}

impl<T> RpcRequest<T> {
    pub fn new(id: u64, method: &str, params: T) -> Self {
        Self {
            id,
            jsonrpc: JSON_RPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// A JSON-RPC response envelope, result or error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse<T> {
    pub id: u64,
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl<T> RpcResponse<T> {
    pub fn result(id: u64, result: T) -> Self {
        Self {
            id,
            jsonrpc: JSON_RPC_VERSION.to_string(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, error: RpcError) -> Self {
        Self {
            id,
            jsonrpc: JSON_RPC_VERSION.to_string(),
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// `wc_notifySubscribe` params.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeParams {
    pub subscription_auth: String,
}

/// `wc_notifyMessage` params.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageParams {
    pub message_auth: String,
}

/// `wc_notifyUpdate` params.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParams {
    pub update_auth: String,
}

/// `wc_notifyDelete` params.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteParams {
    pub delete_auth: String,
}

/// `wc_notifyWatchSubscriptions` params.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchSubscriptionsParams {
    pub watch_subscriptions_auth: String,
}

/// `wc_notifySubscriptionsChanged` params.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionsChangedParams {
    pub subscriptions_changed_auth: String,
}

/// Result body carrying a response JWT.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseAuth {
    pub response_auth: String,
}

/// Random positive request id. The high bit is cleared so ids survive
/// signed-integer JSON parsers.
pub fn generate_request_id() -> u64 {
    (rand::random::<u64>() >> 1).max(1)
}
