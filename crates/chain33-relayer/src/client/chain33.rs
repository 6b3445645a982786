use super::SourceChain;
use crate::error::ChainError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use tracing::{debug, info, instrument};

const EVM_EVENT_PUSH_TYPE: i32 = 4;

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'a str,
    id: i64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Header {
    height: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushSubscribeReq<'a> {
    name: &'a str,
    #[serde(rename = "URL")]
    url: &'a str,
    encode: &'a str,
    last_sequence: i64,
    last_height: i64,
    last_block_hash: &'a str,
    #[serde(rename = "type")]
    push_type: i32,
    contract: HashMap<&'a str, bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplySubscribePush {
    #[serde(default)]
    is_ok: bool,
    #[serde(default)]
    msg: String,
}

/// Parameters of the node-side push registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSubscription {
    pub name: String,
    pub callback_url: String,
    pub last_sequence: i64,
    pub last_height: u64,
    pub contract: String,
}

/// JSON-RPC client for a chain33 node.
pub struct Chain33Client {
    client: Client,
    endpoint: String,
}

impl Chain33Client {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Rpc {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { client, endpoint })
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R, ChainError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let rpc_error = |message: String| ChainError::Rpc {
            endpoint: self.endpoint.clone(),
            message,
        };

        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| rpc_error(e.to_string()))?;

        let text = response.text().await.map_err(|e| rpc_error(e.to_string()))?;
        debug!(response = %text, method, "Raw chain33 response");
        let response: RpcResponse<R> =
            serde_json::from_str(&text).map_err(|e| rpc_error(e.to_string()))?;

        if let Some(error) = response.error.filter(|e| !e.is_null()) {
            return Err(ChainError::Node {
                method: method.to_string(),
                message: error.to_string(),
            });
        }
        response.result.ok_or_else(|| ChainError::Node {
            method: method.to_string(),
            message: "empty result".to_string(),
        })
    }
}

#[async_trait]
impl SourceChain for Chain33Client {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn current_height(&self) -> Result<u64, ChainError> {
        let header: Header = self.call("Chain33.GetLastHeader", Vec::<()>::new()).await?;
        u64::try_from(header.height).map_err(|_| ChainError::Node {
            method: "Chain33.GetLastHeader".to_string(),
            message: format!("negative height {}", header.height),
        })
    }

    #[instrument(skip(self, subscription), fields(name = %subscription.name))]
    async fn subscribe_push(&self, subscription: &PushSubscription) -> Result<(), ChainError> {
        let request = PushSubscribeReq {
            name: &subscription.name,
            url: &subscription.callback_url,
            encode: "json",
            last_sequence: subscription.last_sequence,
            last_height: subscription.last_height as i64,
            last_block_hash: "",
            push_type: EVM_EVENT_PUSH_TYPE,
            contract: HashMap::from([(subscription.contract.as_str(), true)]),
        };
        let reply: ReplySubscribePush = self.call("Chain33.AddPushSubscribe", [request]).await?;
        if !reply.is_ok {
            return Err(ChainError::Node {
                method: "Chain33.AddPushSubscribe".to_string(),
                message: reply.msg,
            });
        }
        info!(callback = %subscription.callback_url, "Push subscription registered");
        Ok(())
    }
}
