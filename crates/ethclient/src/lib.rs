//! Typed Ethereum JSON-RPC client.
//!
//! Wraps a node connection with validated block and transaction retrieval, ABI-cached contract
//! calls, fee-policy aware transaction building, and offline Uniswap and wallet helpers.
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

pub mod abi_cache;
pub mod blocks;
pub mod client;
pub mod config;
pub mod contract;
pub mod errors;
pub mod fees;
pub mod sender;
pub mod subscribe;
pub mod transport;
pub mod tx_builder;
pub mod uniswap;
pub mod wallet;

pub use abi_cache::AbiCache;
pub use blocks::{Block, Transaction, TxMeta};
pub use client::{Client, DEFAULT_TIMEOUT};
pub use config::ClientConfig;
pub use contract::{CallOpts, FromDynValue, ERC20_ABI};
pub use errors::{ClientError, ErrorReport, Result};
pub use fees::{FeeFields, FeeOracle, FeePolicy, ResolvedFees};
pub use sender::{SenderLookup, SenderResolver, ServerReported};
pub use subscribe::Subscription;
pub use transport::{AlloyTransport, BatchCall, RawSubscription, RpcTransport};
pub use tx_builder::{signer_from_hex, TransactOpts, TRANSFER_GAS};
