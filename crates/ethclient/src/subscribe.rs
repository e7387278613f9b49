use crate::client::Client;
use crate::errors::{ClientError, Result};
use crate::transport::{RawSubscription, RpcTransport};
use alloy::primitives::B256;
use alloy::rpc::types::{Filter, Header, Log};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle to a running subscription forwarder.
#[derive(Debug)]
pub struct Subscription {
    topic: &'static str,
    id: B256,
    transport: Arc<dyn RpcTransport>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub const fn topic(&self) -> &'static str {
        self.topic
    }

    /// Id the node assigned to this subscription.
    pub const fn id(&self) -> B256 {
        self.id
    }

    /// Stops forwarding and cancels the subscription on the node with `eth_unsubscribe`.
    /// Items already delivered to the sink stay there.
    pub async fn unsubscribe(self) -> Result<()> {
        self.task.abort();
        self.transport
            .unsubscribe(self.id)
            .await
            .map_err(|e| ClientError::transport("eth_unsubscribe", e))?;
        debug!(topic = self.topic, id = %self.id, "unsubscribed");
        Ok(())
    }

    /// True once either the upstream or the sink has closed.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

fn forward<T>(
    topic: &'static str,
    (transport, raw): (Arc<dyn RpcTransport>, RawSubscription),
    sink: mpsc::Sender<T>,
) -> Subscription
where
    T: DeserializeOwned + Send + 'static,
{
    let RawSubscription { id, mut items } = raw;
    let task = tokio::spawn(async move {
        while let Some(raw) = items.recv().await {
            match serde_json::from_value::<T>(raw) {
                Ok(item) => {
                    if sink.send(item).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(topic, error = %e, "subscription: undecodable notification"),
            }
        }
        debug!(topic, "subscription forwarder finished");
    });
    Subscription {
        topic,
        id,
        transport,
        task,
    }
}

impl Client {
    /// Streams new chain heads into `sink`.
    pub async fn subscribe_new_head(&self, sink: mpsc::Sender<Header>) -> Result<Subscription> {
        let raw = self.subscribe_raw(json!(["newHeads"])).await?;
        Ok(forward("newHeads", raw, sink))
    }

    /// Streams logs matching `filter` into `sink`.
    pub async fn subscribe_filter_logs(
        &self,
        filter: &Filter,
        sink: mpsc::Sender<Log>,
    ) -> Result<Subscription> {
        let raw = self.subscribe_raw(json!(["logs", filter])).await?;
        Ok(forward("logs", raw, sink))
    }
}
