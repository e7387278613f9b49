use crate::errors::{ClientError, Result};
use alloy::json_abi::JsonAbi;
use alloy::primitives::Address;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Parsed contract ABIs keyed by contract address. Entries are never evicted.
#[derive(Debug, Default)]
pub struct AbiCache {
    entries: RwLock<HashMap<Address, Arc<JsonAbi>>>,
}

impl AbiCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, address: &Address) -> Option<Arc<JsonAbi>> {
        self.entries.read().get(address).cloned()
    }

    pub fn store(&self, address: Address, abi: Arc<JsonAbi>) {
        self.entries.write().insert(address, abi);
    }

    /// Returns the existing entry and `true`, or stores `abi` and returns it with `false`.
    pub fn load_or_store(&self, address: Address, abi: Arc<JsonAbi>) -> (Arc<JsonAbi>, bool) {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&address) {
            return (Arc::clone(existing), true);
        }
        entries.insert(address, Arc::clone(&abi));
        (abi, false)
    }

    pub fn delete(&self, address: &Address) {
        self.entries.write().remove(address);
    }

    /// Visits a snapshot of the entries until `f` returns `false`. `f` may touch the cache.
    pub fn range(&self, mut f: impl FnMut(&Address, &Arc<JsonAbi>) -> bool) {
        let snapshot: Vec<(Address, Arc<JsonAbi>)> = self
            .entries
            .read()
            .iter()
            .map(|(a, abi)| (*a, Arc::clone(abi)))
            .collect();
        for (address, abi) in &snapshot {
            if !f(address, abi) {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Cached ABI for `address`, parsing `description` on a miss.
    ///
    /// Two racing first callers may both parse; the first stored entry wins. Parse failures are
    /// not cached.
    pub fn get_or_parse(&self, address: Address, description: &str) -> Result<Arc<JsonAbi>> {
        if let Some(abi) = self.load(&address) {
            return Ok(abi);
        }
        debug!(%address, "abi cache miss; parsing description");
        let parsed: JsonAbi =
            serde_json::from_str(description).map_err(|e| ClientError::MalformedAbi {
                address,
                reason: e.to_string(),
            })?;
        Ok(self.load_or_store(address, Arc::new(parsed)).0)
    }
}
