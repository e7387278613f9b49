use alloy::primitives::{B256, U256};
use alloy::rpc::client::RpcClient;
use alloy::transports::{TransportErrorKind, TransportResult};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::warn;

/// Notifications buffered between the pubsub frontend and the forwarder task.
const SUBSCRIPTION_BUFFER: usize = 64;

/// One sub-request of a batched round trip.
#[derive(Debug, Clone)]
pub struct BatchCall {
    pub method: &'static str,
    pub params: Value,
}

impl BatchCall {
    pub const fn new(method: &'static str, params: Value) -> Self {
        Self { method, params }
    }
}

/// A live `eth_subscribe` registration and its raw notification payloads.
#[derive(Debug)]
pub struct RawSubscription {
    pub id: B256,
    pub items: mpsc::Receiver<Value>,
}

/// The JSON-RPC connection a [`crate::Client`] talks through.
///
/// Responses are handed back as raw JSON so the client can decode the same payload more than
/// once (a block is read both as a header and as a body).
#[async_trait]
pub trait RpcTransport: Send + Sync + std::fmt::Debug {
    async fn request(&self, method: &'static str, params: Value) -> TransportResult<Value>;

    /// Sends every call in a single round trip. The outer error is a failure of the round trip
    /// itself; inner errors are per sub-request.
    async fn batch(&self, calls: Vec<BatchCall>) -> TransportResult<Vec<TransportResult<Value>>>;

    /// Issues `eth_subscribe` with `params` and streams raw notification payloads.
    async fn subscribe(&self, params: Value) -> TransportResult<RawSubscription>;

    /// Cancels a subscription made through [`RpcTransport::subscribe`]; its stream then ends.
    async fn unsubscribe(&self, id: B256) -> TransportResult<()>;
}

/// [`RpcTransport`] over alloy's RPC client (http, ws or ipc, picked from the URL scheme).
#[derive(Debug, Clone)]
pub struct AlloyTransport {
    client: RpcClient,
}

impl AlloyTransport {
    pub async fn connect(url: &str) -> TransportResult<Self> {
        let client = RpcClient::builder().connect(url).await?;
        Ok(Self { client })
    }

    pub const fn from_client(client: RpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RpcTransport for AlloyTransport {
    async fn request(&self, method: &'static str, params: Value) -> TransportResult<Value> {
        self.client.request::<Value, Value>(method, params).await
    }

    async fn batch(&self, calls: Vec<BatchCall>) -> TransportResult<Vec<TransportResult<Value>>> {
        let mut batch = self.client.new_batch();
        let mut waiters = Vec::with_capacity(calls.len());
        for call in &calls {
            waiters.push(batch.add_call::<Value, Value>(call.method, &call.params)?);
        }
        batch.send().await?;

        let mut out = Vec::with_capacity(waiters.len());
        for waiter in waiters {
            out.push(waiter.await);
        }
        Ok(out)
    }

    async fn subscribe(&self, params: Value) -> TransportResult<RawSubscription> {
        let Some(frontend) = self.client.pubsub_frontend() else {
            return Err(TransportErrorKind::custom_str(
                "subscriptions require a ws or ipc endpoint",
            ));
        };
        let id: U256 = self
            .client
            .request::<Value, U256>("eth_subscribe", params)
            .await?;
        let id = B256::from(id);
        let mut raw = frontend.get_subscription(id).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            loop {
                match raw.recv().await {
                    Ok(item) => match serde_json::from_str::<Value>(item.get()) {
                        Ok(v) => {
                            if tx.send(v).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "subscription: invalid notification payload"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscription: receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Ok(RawSubscription { id, items: rx })
    }

    async fn unsubscribe(&self, id: B256) -> TransportResult<()> {
        let Some(frontend) = self.client.pubsub_frontend() else {
            return Err(TransportErrorKind::custom_str(
                "subscriptions require a ws or ipc endpoint",
            ));
        };
        // The pubsub service sends eth_unsubscribe and drops the local channel.
        frontend.unsubscribe(id)
    }
}
