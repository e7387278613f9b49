use alloy::primitives::{Address, B256};
use alloy::transports::TransportError;
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// A structured error suitable for printing to CLI callers as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// The node answered `null`: the entity never existed or was pruned.
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("inconsistent block data for {block}: {reason}")]
    InconsistentBlockData { block: B256, reason: &'static str },

    #[error("got null header for uncle {index} of block {block}")]
    MissingUncleHeader { block: B256, index: usize },

    #[error("wrong inclusion block/index: tx {tx_hash} is not at index {index} of block {block}")]
    WrongInclusion {
        tx_hash: B256,
        block: B256,
        index: u64,
    },

    #[error("parse abi for {address}: {reason}")]
    MalformedAbi { address: Address, reason: String },

    #[error("pack method: {method}, params: {params}: {reason}")]
    ArgumentEncoding {
        method: String,
        params: String,
        reason: String,
    },

    #[error("unpack method: {method}: {reason}")]
    ResultDecoding { method: String, reason: String },

    #[error("no contract code at given address {address}")]
    NoContractCode { address: Address },

    #[error("both gasPrice and (maxFeePerGas or maxPriorityFeePerGas) specified")]
    ConflictingFeeFields,

    #[error("maxFeePerGas ({fee_cap}) < maxPriorityFeePerGas ({tip_cap})")]
    FeeCapBelowTipCap { fee_cap: u128, tip_cap: u128 },

    #[error("maxFeePerGas or maxPriorityFeePerGas specified but london is not active yet")]
    DynamicFeeNotActive,

    /// The endpoint serves a different chain than the one it was configured for.
    #[error("chain id mismatch: expected {expected}, node reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("{method}: timed out after {after_ms}ms")]
    Timeout { method: String, after_ms: u128 },

    #[error("{method}: transport error")]
    Transport {
        method: String,
        #[source]
        source: TransportError,
    },

    #[error("{method}: decode response: {reason}")]
    Decode { method: String, reason: String },

    #[error("server returned transaction without signature")]
    MissingSignature,

    #[error("recover sender: {0}")]
    SenderRecovery(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("sign transaction: {0}")]
    Signing(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ClientError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub(crate) fn transport(method: &str, source: TransportError) -> Self {
        Self::Transport {
            method: method.to_owned(),
            source,
        }
    }

    pub(crate) fn decode(method: &str, reason: impl ToString) -> Self {
        Self::Decode {
            method: method.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// Stable machine-readable code for this error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InconsistentBlockData { .. } => "inconsistent_block_data",
            Self::MissingUncleHeader { .. } => "missing_uncle_header",
            Self::WrongInclusion { .. } => "wrong_inclusion",
            Self::MalformedAbi { .. } => "malformed_abi",
            Self::ArgumentEncoding { .. } => "argument_encoding_error",
            Self::ResultDecoding { .. } => "result_decoding_error",
            Self::NoContractCode { .. } => "no_contract_code",
            Self::ConflictingFeeFields => "conflicting_fee_fields",
            Self::FeeCapBelowTipCap { .. } => "fee_cap_below_tip_cap",
            Self::DynamicFeeNotActive => "dynamic_fee_not_active",
            Self::ChainIdMismatch { .. } => "chain_id_mismatch",
            Self::Timeout { .. } => "timeout",
            Self::Transport { .. } => "transport",
            Self::Decode { .. } => "decode",
            Self::MissingSignature => "missing_signature",
            Self::SenderRecovery(_) => "sender_recovery",
            Self::InvalidPrivateKey(_) => "invalid_private_key",
            Self::Signing(_) => "signing",
            Self::InvalidArgument(_) => "invalid_argument",
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Network-layer failures a caller may choose to retry. Nothing in this crate retries.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }
}

impl From<&ClientError> for ErrorReport {
    fn from(e: &ClientError) -> Self {
        Self {
            code: e.code(),
            message: format!("{e}"),
        }
    }
}
