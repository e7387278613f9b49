#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use alloy::primitives::{Address, B256};
use alloy::rpc::types::BlockNumberOrTag;
use clap::{Parser, Subcommand};
use ethclient::config::ClientConfig;
use ethclient::uniswap::{pair_address_v2, pool_address_v3};
use ethclient::wallet::{aes_cbc_decrypt, aes_cbc_encrypt, eth_path, HdWallet};
use ethclient::{Block, Client, ClientError, ErrorReport};
use eyre::Context as _;
use serde_json::{json, Value};
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "ethclient", version)]
struct Cli {
    /// Config file (default: $ETHCLIENT_CONFIG, then the per-user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Chain name from `rpc.urls`.
    #[arg(long, global = true, conflicts_with = "rpc_url")]
    chain: Option<String>,
    /// Explicit endpoint; wins over `--chain` and config.
    #[arg(long, global = true)]
    rpc_url: Option<String>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a block by number, tag or hash (with uncles checked).
    Block { id: String },
    /// Fetch a transaction by hash.
    Tx { hash: B256 },
    /// Fetch a transaction receipt.
    Receipt { hash: B256 },
    ChainId,
    /// ERC-20 balance at the latest block.
    BalanceOf {
        #[arg(long)]
        token: Address,
        #[arg(long)]
        owner: Address,
    },
    /// Print the resolved RPC endpoint and timeout without connecting.
    RpcUrl,
    /// Derive a Uniswap pool address offline.
    PoolAddress {
        #[command(subcommand)]
        version: PoolVersion,
    },
    /// AES-CBC encrypt; prints hex.
    Encrypt {
        #[arg(long)]
        key: String,
        plaintext: String,
    },
    /// AES-CBC decrypt hex ciphertext; prints utf-8 (or hex when not utf-8).
    Decrypt {
        #[arg(long)]
        key: String,
        ciphertext: String,
    },
    /// Derive an Ethereum account from a BIP-39 mnemonic.
    Derive {
        #[arg(long)]
        mnemonic: String,
        #[arg(long, default_value = "")]
        passphrase: String,
        #[arg(long, default_value_t = 0)]
        index: u32,
    },
}

#[derive(Subcommand, Debug)]
enum PoolVersion {
    V2 { token_a: Address, token_b: Address },
    V3 {
        token_a: Address,
        token_b: Address,
        #[arg(long)]
        fee: u32,
    },
}

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);
    tracing_subscriber::registry().with(stderr_layer).init();
}

fn print_json(v: &Value) -> eyre::Result<()> {
    let s = serde_json::to_string(v).context("serialize output")?;
    writeln!(std::io::stdout().lock(), "{s}").context("write output")?;
    Ok(())
}

fn print_error(report: &eyre::Report) {
    let err = report
        .chain()
        .find_map(|e| e.downcast_ref::<ClientError>())
        .map_or_else(
            || ErrorReport {
                code: "error",
                message: report
                    .chain()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(": "),
            },
            ErrorReport::from,
        );
    let line = serde_json::to_string(&err)
        .unwrap_or_else(|e| format!(r#"{{"code":"error","message":"serialize error: {e}"}}"#));
    let _write = writeln!(std::io::stderr().lock(), "{line}");
}

enum BlockRef {
    Hash(B256),
    Number(BlockNumberOrTag),
}

/// Decimal height, `0x` height, tag, or a 32-byte hash.
fn parse_block_ref(id: &str) -> eyre::Result<BlockRef> {
    let id = id.trim();
    if id.len() == 66 {
        return Ok(BlockRef::Hash(id.parse().context("parse block hash")?));
    }
    if let Ok(n) = id.parse::<u64>() {
        return Ok(BlockRef::Number(BlockNumberOrTag::Number(n)));
    }
    Ok(BlockRef::Number(
        id.parse().context("parse block number or tag")?,
    ))
}

fn block_json(b: &Block) -> Value {
    json!({
        "hash": b.hash(),
        "number": b.number(),
        "parent_hash": b.header.inner.parent_hash,
        "timestamp": b.header.inner.timestamp,
        "base_fee_per_gas": b.base_fee(),
        "transactions": b.transactions.iter().map(ethclient::Transaction::hash).collect::<Vec<_>>(),
        "uncles": b.uncles.iter().map(|u| u.hash).collect::<Vec<_>>(),
    })
}

async fn connect(cli: &Cli, cfg: &ClientConfig) -> eyre::Result<Client> {
    let endpoint = cfg.resolve_endpoint(cli.rpc_url.as_deref(), cli.chain.as_deref())?;
    tracing::debug!(url = %endpoint.url, "connecting");
    let client = Client::connect_with_timeout(&endpoint.url, cfg.timeout()).await?;
    if let Some(expected) = endpoint.expected_chain_id {
        client.ensure_chain_id(expected).await?;
    }
    Ok(client)
}

async fn run(cli: Cli) -> eyre::Result<()> {
    let cfg = ClientConfig::load_or_default(cli.config.as_deref())?;

    match &cli.cmd {
        Command::Block { id } => {
            let client = connect(&cli, &cfg).await?;
            let block = match parse_block_ref(id)? {
                BlockRef::Hash(hash) => client.block_by_hash(hash).await?,
                BlockRef::Number(number) => client.block_by_number(number).await?,
            };
            print_json(&block_json(&block))
        }
        Command::Tx { hash } => {
            let client = connect(&cli, &cfg).await?;
            let (tx, pending) = client.transaction_by_hash(*hash).await?;
            print_json(&json!({
                "hash": tx.hash(),
                "pending": pending,
                "block_hash": tx.meta().block_hash,
                "from": tx.meta().from,
                "tx": tx.envelope(),
            }))
        }
        Command::Receipt { hash } => {
            let client = connect(&cli, &cfg).await?;
            let receipt = client.transaction_receipt(*hash).await?;
            print_json(&serde_json::to_value(&receipt).context("serialize receipt")?)
        }
        Command::ChainId => {
            let client = connect(&cli, &cfg).await?;
            print_json(&json!({ "chain_id": client.chain_id().await? }))
        }
        Command::BalanceOf { token, owner } => {
            let client = connect(&cli, &cfg).await?;
            let balance = client.balance_of(*owner, *token).await?;
            print_json(&json!({ "token": token, "owner": owner, "balance": balance.to_string() }))
        }
        Command::RpcUrl => {
            let endpoint = cfg.resolve_endpoint(cli.rpc_url.as_deref(), cli.chain.as_deref())?;
            print_json(&json!({
                "rpc_url": endpoint.url,
                "expected_chain_id": endpoint.expected_chain_id,
                "timeout_seconds": cfg.timeout_seconds,
            }))
        }
        Command::PoolAddress { version } => {
            let address = match version {
                PoolVersion::V2 { token_a, token_b } => pair_address_v2(*token_a, *token_b),
                PoolVersion::V3 {
                    token_a,
                    token_b,
                    fee,
                } => pool_address_v3(*token_a, *token_b, *fee)?,
            };
            print_json(&json!({ "address": address }))
        }
        Command::Encrypt { key, plaintext } => {
            let ct = aes_cbc_encrypt(plaintext.as_bytes(), key.as_bytes())?;
            print_json(&json!({ "ciphertext": hex::encode(ct) }))
        }
        Command::Decrypt { key, ciphertext } => {
            let raw = hex::decode(ciphertext.trim().trim_start_matches("0x"))
                .context("ciphertext must be hex")?;
            let pt = aes_cbc_decrypt(&raw, key.as_bytes())?;
            let out = match String::from_utf8(pt) {
                Ok(s) => json!({ "plaintext": s }),
                Err(e) => json!({ "plaintext_hex": hex::encode(e.into_bytes()) }),
            };
            print_json(&out)
        }
        Command::Derive {
            mnemonic,
            passphrase,
            index,
        } => {
            let wallet = HdWallet::from_mnemonic(mnemonic, passphrase)?;
            let path = eth_path(*index);
            let address = wallet.derive_address(&path)?;
            print_json(&json!({ "path": path, "address": address }))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    let result = match color_eyre::install() {
        Ok(()) => run(cli).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            print_error(&report);
            ExitCode::FAILURE
        }
    }
}
