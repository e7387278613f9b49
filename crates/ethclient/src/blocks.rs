use crate::client::Client;
use crate::errors::{ClientError, Result};
use crate::transport::BatchCall;
use alloy::consensus::transaction::SignerRecoverable as _;
use alloy::consensus::{TxEnvelope, EMPTY_OMMER_ROOT_HASH, EMPTY_ROOT_HASH};
use alloy::primitives::{Address, B256, B64, U256, U64};
use alloy::rpc::types::{BlockNumberOrTag, Header, TransactionReceipt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

const UNCLE_METHOD: &str = "eth_getUncleByBlockHashAndIndex";

/// Block context the node reports next to a transaction. Absent for transactions built locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMeta {
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub block_hash: Option<B256>,
    /// Sender as computed by the node.
    #[serde(default)]
    pub from: Option<Address>,
}

/// A signed transaction plus whatever block context the node reported with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    envelope: TxEnvelope,
    meta: TxMeta,
}

impl Transaction {
    pub const fn from_envelope(envelope: TxEnvelope) -> Self {
        Self {
            envelope,
            meta: TxMeta {
                block_number: None,
                block_hash: None,
                from: None,
            },
        }
    }

    /// Decodes an RPC transaction object. The same payload is read once as the signed
    /// transaction and once for the block context around it.
    pub(crate) fn from_json(method: &str, raw: &Value) -> Result<Self> {
        if raw.get("r").is_none_or(Value::is_null) {
            return Err(ClientError::MissingSignature);
        }
        let envelope = TxEnvelope::deserialize(raw).map_err(|e| ClientError::decode(method, e))?;
        let meta = TxMeta::deserialize(raw).map_err(|e| ClientError::decode(method, e))?;
        Ok(Self { envelope, meta })
    }

    pub fn hash(&self) -> B256 {
        *self.envelope.tx_hash()
    }

    pub const fn envelope(&self) -> &TxEnvelope {
        &self.envelope
    }

    pub fn into_envelope(self) -> TxEnvelope {
        self.envelope
    }

    pub const fn meta(&self) -> &TxMeta {
        &self.meta
    }

    /// True when the node reported no containing block.
    pub const fn is_pending(&self) -> bool {
        self.meta.block_number.is_none()
    }

    /// Recovers the sender from the signature.
    pub fn recover_sender(&self) -> Result<Address> {
        self.envelope
            .recover_signer()
            .map_err(|e| ClientError::SenderRecovery(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
    pub uncles: Vec<Header>,
}

impl Block {
    pub const fn hash(&self) -> B256 {
        self.header.hash
    }

    pub const fn number(&self) -> u64 {
        self.header.inner.number
    }

    pub const fn base_fee(&self) -> Option<u64> {
        self.header.inner.base_fee_per_gas
    }
}

/// The body half of a block payload; the header half is decoded from the same JSON.
#[derive(Debug, Deserialize)]
struct BlockBody {
    #[serde(default)]
    transactions: Vec<Value>,
    #[serde(default)]
    uncles: Vec<B256>,
}

/// Header roots must agree with the body lists they commit to.
fn check_consistency(header: &Header, uncle_count: usize, tx_count: usize) -> Result<()> {
    let inner = &header.inner;
    let reason = if inner.ommers_hash == EMPTY_OMMER_ROOT_HASH && uncle_count > 0 {
        Some("server returned non-empty uncle list but block header indicates no uncles")
    } else if inner.ommers_hash != EMPTY_OMMER_ROOT_HASH && uncle_count == 0 {
        Some("server returned empty uncle list but block header indicates uncles")
    } else if inner.transactions_root == EMPTY_ROOT_HASH && tx_count > 0 {
        Some("server returned non-empty transaction list but block header indicates no transactions")
    } else if inner.transactions_root != EMPTY_ROOT_HASH && tx_count == 0 {
        Some("server returned empty transaction list but block header indicates transactions")
    } else {
        None
    };
    match reason {
        Some(reason) => {
            warn!(block = %header.hash, reason, "inconsistent block data");
            Err(ClientError::InconsistentBlockData {
                block: header.hash,
                reason,
            })
        }
        None => Ok(()),
    }
}

#[derive(Debug, Default, Deserialize)]
struct InclusionMeta {
    #[serde(default)]
    hash: B256,
    #[serde(default)]
    from: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeaderExtras {
    #[serde(default)]
    total_difficulty: Option<U256>,
    #[serde(default)]
    size: Option<U256>,
}

/// Pending blocks come back with `hash`, `nonce` and `miner` nulled out. Those are filled with
/// zeroes and the hash is recomputed locally. The flag is whether the node reported a hash.
fn decode_header(method: &str, raw: &Value) -> Result<(Header, bool)> {
    let reported = raw.get("hash").is_some_and(|h| !h.is_null());
    if reported {
        let header = Header::deserialize(raw).map_err(|e| ClientError::decode(method, e))?;
        return Ok((header, true));
    }
    let mut filled = raw.clone();
    if let Some(obj) = filled.as_object_mut() {
        for (key, zero) in [
            ("nonce", json!(B64::ZERO)),
            ("miner", json!(Address::ZERO)),
        ] {
            let slot = obj.entry(key).or_insert(Value::Null);
            if slot.is_null() {
                *slot = zero;
            }
        }
    }
    let inner = alloy::consensus::Header::deserialize(&filled)
        .map_err(|e| ClientError::decode(method, e))?;
    let extras = HeaderExtras::deserialize(&filled).map_err(|e| ClientError::decode(method, e))?;
    let header = Header {
        hash: inner.hash_slow(),
        inner,
        total_difficulty: extras.total_difficulty,
        size: extras.size,
    };
    Ok((header, false))
}

fn quantity(n: impl std::fmt::LowerHex) -> Value {
    json!(format!("{n:#x}"))
}

impl Client {
    pub async fn block_by_hash(&self, hash: B256) -> Result<Block> {
        self.get_block("eth_getBlockByHash", json!([hash, true]), || {
            format!("block {hash}")
        })
        .await
    }

    /// `Latest` for the head, `Pending` for the block being built.
    pub async fn block_by_number(&self, number: BlockNumberOrTag) -> Result<Block> {
        self.get_block("eth_getBlockByNumber", json!([number, true]), || {
            format!("block {number}")
        })
        .await
    }

    pub async fn header_by_hash(&self, hash: B256) -> Result<Header> {
        self.get_header("eth_getBlockByHash", json!([hash, false]), || {
            format!("header {hash}")
        })
        .await
    }

    /// `Pending` yields a header whose hash is computed locally.
    pub async fn header_by_number(&self, number: BlockNumberOrTag) -> Result<Header> {
        self.get_header("eth_getBlockByNumber", json!([number, false]), || {
            format!("header {number}")
        })
        .await
    }

    async fn get_header(
        &self,
        method: &'static str,
        params: Value,
        what: impl FnOnce() -> String + Send,
    ) -> Result<Header> {
        let raw = self.raw(method, params).await?;
        if raw.is_null() {
            return Err(ClientError::not_found(what()));
        }
        decode_header(method, &raw).map(|(header, _)| header)
    }

    async fn get_block(
        &self,
        method: &'static str,
        params: Value,
        what: impl FnOnce() -> String + Send,
    ) -> Result<Block> {
        let raw = self.raw(method, params).await?;
        if raw.is_null() {
            return Err(ClientError::not_found(what()));
        }
        let (header, hash_reported) = decode_header(method, &raw)?;
        let body = BlockBody::deserialize(&raw).map_err(|e| ClientError::decode(method, e))?;
        check_consistency(&header, body.uncles.len(), body.transactions.len())?;

        // The node cannot look uncles up under a hash it never published.
        let uncles = if hash_reported {
            self.fetch_uncles(header.hash, body.uncles.len()).await?
        } else {
            debug!(uncles = body.uncles.len(), "pending block, uncle headers not fetched");
            Vec::new()
        };
        let transactions = body
            .transactions
            .iter()
            .map(|tx| Transaction::from_json(method, tx))
            .collect::<Result<Vec<_>>>()?;
        Ok(Block {
            header,
            transactions,
            uncles,
        })
    }

    /// One batched round trip; any missing or failed uncle fails the whole block.
    async fn fetch_uncles(&self, block: B256, count: usize) -> Result<Vec<Header>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let calls = (0..count)
            .map(|i| BatchCall::new(UNCLE_METHOD, json!([block, quantity(i)])))
            .collect();
        let replies = self.batch(UNCLE_METHOD, calls).await?;

        let mut uncles = Vec::with_capacity(count);
        for (index, reply) in replies.into_iter().enumerate() {
            let raw = reply.map_err(|e| ClientError::transport(UNCLE_METHOD, e))?;
            if raw.is_null() {
                warn!(%block, index, "null uncle header in batch");
                return Err(ClientError::MissingUncleHeader { block, index });
            }
            uncles.push(
                serde_json::from_value(raw).map_err(|e| ClientError::decode(UNCLE_METHOD, e))?,
            );
        }
        if uncles.len() < count {
            return Err(ClientError::MissingUncleHeader {
                block,
                index: uncles.len(),
            });
        }
        Ok(uncles)
    }

    /// Returns the transaction and whether it is still pending.
    pub async fn transaction_by_hash(&self, hash: B256) -> Result<(Transaction, bool)> {
        const METHOD: &str = "eth_getTransactionByHash";
        let raw = self.raw(METHOD, json!([hash])).await?;
        if raw.is_null() {
            return Err(ClientError::not_found(format!("transaction {hash}")));
        }
        let tx = Transaction::from_json(METHOD, &raw)?;
        let pending = tx.is_pending();
        Ok((tx, pending))
    }

    pub async fn transaction_in_block(&self, block_hash: B256, index: u64) -> Result<Transaction> {
        const METHOD: &str = "eth_getTransactionByBlockHashAndIndex";
        let raw = self
            .raw(METHOD, json!([block_hash, quantity(index)]))
            .await?;
        if raw.is_null() {
            return Err(ClientError::not_found(format!(
                "transaction {index} in block {block_hash}"
            )));
        }
        Transaction::from_json(METHOD, &raw)
    }

    pub async fn transaction_count(&self, block_hash: B256) -> Result<u64> {
        let n: U64 = self
            .rpc("eth_getBlockTransactionCountByHash", json!([block_hash]))
            .await?;
        Ok(n.to())
    }

    pub async fn pending_transaction_count(&self) -> Result<u64> {
        let n: U64 = self
            .rpc(
                "eth_getBlockTransactionCountByNumber",
                json!([BlockNumberOrTag::Pending]),
            )
            .await?;
        Ok(n.to())
    }

    pub async fn transaction_receipt(&self, hash: B256) -> Result<TransactionReceipt> {
        self.rpc_found("eth_getTransactionReceipt", json!([hash]), || {
            format!("receipt {hash}")
        })
        .await
    }

    /// Sender of `tx`, which the caller says sits at `index` of `block_hash`.
    ///
    /// Answers from the fast-path lookup when it knows this block hash. Otherwise asks the node
    /// what occupies that slot and only trusts the reported sender if the hashes agree.
    pub async fn transaction_sender(
        &self,
        tx: &Transaction,
        block_hash: B256,
        index: u64,
    ) -> Result<Address> {
        const METHOD: &str = "eth_getTransactionByBlockHashAndIndex";
        if let Some(from) = self.sender_lookup().sender(tx, block_hash) {
            return Ok(from);
        }
        let raw = self
            .raw(METHOD, json!([block_hash, quantity(index)]))
            .await?;
        let meta: InclusionMeta = if raw.is_null() {
            InclusionMeta::default()
        } else {
            serde_json::from_value(raw).map_err(|e| ClientError::decode(METHOD, e))?
        };
        if meta.hash == B256::ZERO || meta.hash != tx.hash() {
            return Err(ClientError::WrongInclusion {
                tx_hash: tx.hash(),
                block: block_hash,
                index,
            });
        }
        meta.from
            .ok_or_else(|| ClientError::decode(METHOD, "transaction at that slot has no from"))
    }
}
