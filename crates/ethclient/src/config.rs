use directories::ProjectDirs;
use eyre::{Context as _, ContextCompat as _};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Explicit config file path; wins over the per-user default location.
pub const CONFIG_PATH_ENV: &str = "ETHCLIENT_CONFIG";
/// Overrides whatever RPC URL the config would otherwise resolve to.
pub const RPC_URL_ENV: &str = "ETHCLIENT_RPC_URL";

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Entries read from a file are layered over the built-in chain table, never replacing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Chain name to RPC endpoint (http, ws or ipc).
    #[serde(deserialize_with = "over_builtin_urls")]
    pub urls: BTreeMap<String, String>,
    /// Chain name to the chain ID its endpoint must report.
    #[serde(deserialize_with = "over_builtin_chain_ids")]
    pub chain_ids: BTreeMap<String, u64>,
}

struct ChainDef {
    name: &'static str,
    rpc_url: &'static str,
    chain_id: u64,
}

const CHAINS: &[ChainDef] = &[
    ChainDef {
        name: "ethereum",
        rpc_url: "https://eth.llamarpc.com",
        chain_id: 1,
    },
    ChainDef {
        name: "base",
        rpc_url: "https://base.llamarpc.com",
        chain_id: 8453,
    },
    ChainDef {
        name: "arbitrum",
        rpc_url: "https://arb1.arbitrum.io/rpc",
        chain_id: 42161,
    },
    ChainDef {
        name: "optimism",
        rpc_url: "https://mainnet.optimism.io",
        chain_id: 10,
    },
    ChainDef {
        name: "polygon",
        rpc_url: "https://polygon-rpc.com",
        chain_id: 137,
    },
    ChainDef {
        name: "bnb",
        rpc_url: "https://bsc-dataseed.binance.org",
        chain_id: 56,
    },
    ChainDef {
        name: "sepolia",
        rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
        chain_id: 11_155_111,
    },
    ChainDef {
        name: "local",
        rpc_url: "http://127.0.0.1:8545",
        chain_id: 31337,
    },
];

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            urls: builtin(|def| def.rpc_url.to_owned()),
            chain_ids: builtin(|def| def.chain_id),
        }
    }
}

fn builtin<V>(value: impl Fn(&ChainDef) -> V) -> BTreeMap<String, V> {
    CHAINS
        .iter()
        .map(|def| (def.name.to_owned(), value(def)))
        .collect()
}

fn merged_over<'de, D, V>(
    deserializer: D,
    mut base: BTreeMap<String, V>,
) -> Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    let user = BTreeMap::<String, V>::deserialize(deserializer)?;
    base.extend(user.into_iter().map(|(k, v)| (k.to_lowercase(), v)));
    Ok(base)
}

fn over_builtin_urls<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    merged_over(d, builtin(|def| def.rpc_url.to_owned()))
}

fn over_builtin_chain_ids<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<BTreeMap<String, u64>, D::Error> {
    merged_over(d, builtin(|def| def.chain_id))
}

/// Where to connect, and which chain ID the node there must report when that is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    /// Set only when the URL came from a named chain with a configured ID.
    pub expected_chain_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Upper bound on a single RPC round trip.
    pub timeout_seconds: u64,
    pub default_chain: String,
    pub rpc: RpcConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            default_chain: "ethereum".into(),
            rpc: RpcConfig::default(),
        }
    }
}

impl ClientConfig {
    /// `$ETHCLIENT_CONFIG`, else `config.toml` in the per-user config dir.
    pub fn discover_path() -> eyre::Result<PathBuf> {
        if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(p));
        }
        // macOS: ~/Library/Application Support/ethclient
        // Linux: ~/.config/ethclient
        let proj =
            ProjectDirs::from("", "", "ethclient").context("failed to resolve project dirs")?;
        Ok(proj.config_dir().join("config.toml"))
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> eyre::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn load_or_default(explicit: Option<&Path>) -> eyre::Result<Self> {
        match explicit {
            Some(p) => Self::load(p),
            None => Self::load(&Self::discover_path()?),
        }
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Resolves a chain name through `rpc.urls`; anything with a scheme passes through as a URL.
    pub fn rpc_url_for(&self, chain: &str) -> eyre::Result<String> {
        let chain = chain.trim();
        if chain.contains("://") || chain.ends_with(".ipc") {
            return Ok(chain.to_owned());
        }
        self.rpc
            .urls
            .get(&chain.to_lowercase())
            .cloned()
            .with_context(|| format!("unknown chain {chain:?}; configure rpc.urls.{chain}"))
    }

    /// Endpoint for the CLI: explicit URL, then `$ETHCLIENT_RPC_URL`, then the (default) chain.
    pub fn resolve_endpoint(
        &self,
        rpc_url: Option<&str>,
        chain: Option<&str>,
    ) -> eyre::Result<Endpoint> {
        let raw = |url: &str| Endpoint {
            url: url.to_owned(),
            expected_chain_id: None,
        };
        if let Some(u) = rpc_url {
            return Ok(raw(u));
        }
        if let Ok(u) = std::env::var(RPC_URL_ENV) {
            if !u.trim().is_empty() {
                return Ok(raw(&u));
            }
        }
        let chain = chain.unwrap_or(&self.default_chain).trim();
        let url = self.rpc_url_for(chain)?;
        let expected_chain_id = if url == chain {
            None
        } else {
            self.rpc.chain_ids.get(&chain.to_lowercase()).copied()
        };
        Ok(Endpoint {
            url,
            expected_chain_id,
        })
    }
}
