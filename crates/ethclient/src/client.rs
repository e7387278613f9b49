use crate::abi_cache::AbiCache;
use crate::errors::{ClientError, Result};
use crate::sender::{SenderLookup, SenderResolver, ServerReported};
use crate::transport::{AlloyTransport, BatchCall, RawSubscription, RpcTransport};
use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Encodable2718 as _;
use alloy::primitives::{Address, Bytes, B256, U128, U256, U64};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log, SyncInfo, TransactionRequest};
use alloy::transports::{TransportErrorKind, TransportResult};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection to one Ethereum JSON-RPC endpoint.
///
/// Shareable across tasks. The chain ID is fetched at most once per client and assumed not to
/// change for the lifetime of the connection.
#[derive(Debug)]
pub struct Client {
    transport: RwLock<Option<Arc<dyn RpcTransport>>>,
    timeout: Duration,
    chain_id: OnceCell<u64>,
    abis: AbiCache,
    senders: Arc<dyn SenderLookup>,
}

impl Client {
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_timeout(url, DEFAULT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let transport = match tokio::time::timeout(timeout, AlloyTransport::connect(url)).await {
            Ok(res) => res.map_err(|e| ClientError::transport("connect", e))?,
            Err(_) => {
                return Err(ClientError::Timeout {
                    method: "connect".into(),
                    after_ms: timeout.as_millis(),
                })
            }
        };
        info!(timeout_ms = timeout.as_millis(), "rpc client connected");
        Ok(Self::with_transport(Arc::new(transport), timeout))
    }

    pub fn with_transport(transport: Arc<dyn RpcTransport>, timeout: Duration) -> Self {
        Self {
            transport: RwLock::new(Some(transport)),
            timeout,
            chain_id: OnceCell::new(),
            abis: AbiCache::new(),
            senders: Arc::new(ServerReported),
        }
    }

    /// Replaces the fast-path sender lookup used by [`Client::transaction_sender`].
    #[must_use]
    pub fn with_sender_lookup(mut self, lookup: Arc<dyn SenderLookup>) -> Self {
        self.senders = lookup;
        self
    }

    /// Drops the connection. Every later call fails with a transport error.
    pub fn close(&self) {
        if self.transport.write().take().is_some() {
            info!("rpc client closed");
        }
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub const fn abi_cache(&self) -> &AbiCache {
        &self.abis
    }

    pub(crate) fn sender_lookup(&self) -> &dyn SenderLookup {
        self.senders.as_ref()
    }

    /// Two-tier resolver sharing this client's fast-path lookup.
    pub fn sender_resolver(&self) -> SenderResolver {
        SenderResolver::new(Arc::clone(&self.senders))
    }

    fn handle(&self, method: &str) -> Result<Arc<dyn RpcTransport>> {
        self.transport.read().clone().ok_or_else(|| {
            ClientError::transport(method, TransportErrorKind::custom_str("client closed"))
        })
    }

    async fn deadline<T>(
        &self,
        method: &'static str,
        fut: impl Future<Output = TransportResult<T>> + Send,
    ) -> Result<T> {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => {
                debug!(method, elapsed_ms = started.elapsed().as_millis(), "rpc");
                res.map_err(|e| ClientError::transport(method, e))
            }
            Err(_) => Err(ClientError::Timeout {
                method: method.to_owned(),
                after_ms: self.timeout.as_millis(),
            }),
        }
    }

    /// One round trip returning the raw result (`null` included).
    pub(crate) async fn raw(&self, method: &'static str, params: Value) -> Result<Value> {
        let transport = self.handle(method)?;
        self.deadline(method, transport.request(method, params))
            .await
    }

    pub(crate) async fn rpc<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T> {
        let raw = self.raw(method, params).await?;
        serde_json::from_value(raw).map_err(|e| ClientError::decode(method, e))
    }

    /// Like [`Client::rpc`], but a `null` result is `NotFound { what }`.
    pub(crate) async fn rpc_found<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
        what: impl FnOnce() -> String + Send,
    ) -> Result<T> {
        let raw = self.raw(method, params).await?;
        if raw.is_null() {
            return Err(ClientError::not_found(what()));
        }
        serde_json::from_value(raw).map_err(|e| ClientError::decode(method, e))
    }

    pub(crate) async fn batch(
        &self,
        method: &'static str,
        calls: Vec<BatchCall>,
    ) -> Result<Vec<TransportResult<Value>>> {
        let transport = self.handle(method)?;
        self.deadline(method, transport.batch(calls)).await
    }

    /// The transport is handed back so the subscription can later be cancelled on it.
    pub(crate) async fn subscribe_raw(
        &self,
        params: Value,
    ) -> Result<(Arc<dyn RpcTransport>, RawSubscription)> {
        let transport = self.handle("eth_subscribe")?;
        let raw = self
            .deadline("eth_subscribe", transport.subscribe(params))
            .await?;
        Ok((transport, raw))
    }

    /// Chain ID, fetched once and memoized for the lifetime of this client.
    pub async fn cached_chain_id(&self) -> Result<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                let id = self.chain_id().await?;
                debug!(chain_id = id, "chain id memoized");
                Ok::<u64, ClientError>(id)
            })
            .await
            .copied()
    }

    /// Fails with [`ClientError::ChainIdMismatch`] unless the node serves `expected`.
    pub async fn ensure_chain_id(&self, expected: u64) -> Result<u64> {
        let actual = self.cached_chain_id().await?;
        if actual != expected {
            return Err(ClientError::ChainIdMismatch { expected, actual });
        }
        Ok(actual)
    }

    /// Always asks the node; see [`Client::cached_chain_id`] for the memoized value.
    pub async fn chain_id(&self) -> Result<u64> {
        let id: U64 = self.rpc("eth_chainId", json!([])).await?;
        Ok(id.to())
    }

    pub async fn network_id(&self) -> Result<u64> {
        let v: String = self.rpc("net_version", json!([])).await?;
        v.parse::<u64>().map_err(|e| {
            ClientError::decode("net_version", format!("invalid net_version result {v:?}: {e}"))
        })
    }

    pub async fn block_number(&self) -> Result<u64> {
        let n: U64 = self.rpc("eth_blockNumber", json!([])).await?;
        Ok(n.to())
    }

    /// `None` when the node is not syncing.
    pub async fn sync_progress(&self) -> Result<Option<SyncInfo>> {
        let raw = self.raw("eth_syncing", json!([])).await?;
        if matches!(raw, Value::Bool(false)) {
            return Ok(None);
        }
        serde_json::from_value(raw)
            .map(Some)
            .map_err(|e| ClientError::decode("eth_syncing", e))
    }

    pub async fn balance_at(&self, account: Address, block: BlockNumberOrTag) -> Result<U256> {
        self.rpc("eth_getBalance", json!([account, block])).await
    }

    pub async fn pending_balance_at(&self, account: Address) -> Result<U256> {
        self.balance_at(account, BlockNumberOrTag::Pending).await
    }

    pub async fn storage_at(
        &self,
        account: Address,
        key: B256,
        block: BlockNumberOrTag,
    ) -> Result<B256> {
        self.rpc("eth_getStorageAt", json!([account, key, block]))
            .await
    }

    pub async fn pending_storage_at(&self, account: Address, key: B256) -> Result<B256> {
        self.storage_at(account, key, BlockNumberOrTag::Pending)
            .await
    }

    pub async fn code_at(&self, account: Address, block: BlockNumberOrTag) -> Result<Bytes> {
        self.rpc("eth_getCode", json!([account, block])).await
    }

    pub async fn pending_code_at(&self, account: Address) -> Result<Bytes> {
        self.code_at(account, BlockNumberOrTag::Pending).await
    }

    pub async fn nonce_at(&self, account: Address, block: BlockNumberOrTag) -> Result<u64> {
        let n: U64 = self
            .rpc("eth_getTransactionCount", json!([account, block]))
            .await?;
        Ok(n.to())
    }

    pub async fn pending_nonce_at(&self, account: Address) -> Result<u64> {
        self.nonce_at(account, BlockNumberOrTag::Pending).await
    }

    pub async fn filter_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.rpc("eth_getLogs", json!([filter])).await
    }

    pub async fn suggest_gas_price(&self) -> Result<u128> {
        let p: U128 = self.rpc("eth_gasPrice", json!([])).await?;
        Ok(p.to())
    }

    pub async fn suggest_gas_tip_cap(&self) -> Result<u128> {
        let p: U128 = self.rpc("eth_maxPriorityFeePerGas", json!([])).await?;
        Ok(p.to())
    }

    /// Simulates `msg` against pending state and returns the gas it would use.
    pub async fn estimate_gas(&self, msg: &TransactionRequest) -> Result<u64> {
        let g: U64 = self
            .rpc("eth_estimateGas", json!([msg, BlockNumberOrTag::Pending]))
            .await?;
        Ok(g.to())
    }

    pub async fn call_contract(
        &self,
        msg: &TransactionRequest,
        block: BlockNumberOrTag,
    ) -> Result<Bytes> {
        self.rpc("eth_call", json!([msg, block])).await
    }

    pub async fn pending_call_contract(&self, msg: &TransactionRequest) -> Result<Bytes> {
        self.call_contract(msg, BlockNumberOrTag::Pending).await
    }

    /// Broadcasts a signed transaction; building and signing never imply sending.
    pub async fn send_transaction(&self, tx: &TxEnvelope) -> Result<B256> {
        let raw = Bytes::from(tx.encoded_2718());
        let hash: B256 = self
            .rpc("eth_sendRawTransaction", json!([raw]))
            .await?;
        info!(tx_hash = %hash, "transaction submitted");
        Ok(hash)
    }
}
