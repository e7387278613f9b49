//! Transaction sender resolution.
//!
//! The fast path trusts a sender the node reported alongside a transaction, but only when the
//! caller asks about the same block hash the node reported it under. Everything else falls back
//! to recovering the signer from the signature.

use crate::blocks::Transaction;
use crate::errors::Result;
use alloy::primitives::{Address, B256};
use std::sync::Arc;

/// Fast-path sender lookup keyed by (transaction, block hash).
pub trait SenderLookup: Send + Sync + std::fmt::Debug {
    fn sender(&self, tx: &Transaction, block_hash: B256) -> Option<Address>;
}

/// Reads the sender the server attached to the transaction when it was fetched.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerReported;

impl SenderLookup for ServerReported {
    fn sender(&self, tx: &Transaction, block_hash: B256) -> Option<Address> {
        let meta = tx.meta();
        if meta.block_hash == Some(block_hash) {
            meta.from
        } else {
            None
        }
    }
}

/// Lookup first, signature recovery second. Never touches the network.
#[derive(Debug, Clone)]
pub struct SenderResolver {
    lookup: Arc<dyn SenderLookup>,
}

impl Default for SenderResolver {
    fn default() -> Self {
        Self::new(Arc::new(ServerReported))
    }
}

impl SenderResolver {
    pub fn new(lookup: Arc<dyn SenderLookup>) -> Self {
        Self { lookup }
    }

    pub fn resolve(&self, tx: &Transaction, block_hash: B256) -> Result<Address> {
        if let Some(from) = self.lookup.sender(tx, block_hash) {
            return Ok(from);
        }
        tx.recover_sender()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::tests::{signed_transfer, with_meta};
    use alloy::primitives::{address, b256};

    #[derive(Debug)]
    struct Fixed(Address);

    impl SenderLookup for Fixed {
        fn sender(&self, _tx: &Transaction, _block_hash: B256) -> Option<Address> {
            Some(self.0)
        }
    }

    #[test]
    fn server_sender_used_only_for_matching_block() -> eyre::Result<()> {
        let (envelope, signer) = signed_transfer(0)?;
        let block = b256!("0x1111111111111111111111111111111111111111111111111111111111111111");
        let other = b256!("0x2222222222222222222222222222222222222222222222222222222222222222");
        // A deliberately wrong server-reported sender shows which path answered.
        let reported = address!("0x00000000000000000000000000000000000000ee");
        let tx = with_meta(envelope, Some(block), Some(reported))?;

        let resolver = SenderResolver::default();
        assert_eq!(resolver.resolve(&tx, block)?, reported, "fast path on same block hash");
        assert_eq!(resolver.resolve(&tx, other)?, signer, "mismatch recovers from signature");
        Ok(())
    }

    #[test]
    fn injected_lookup_wins_over_recovery() -> eyre::Result<()> {
        let (envelope, _signer) = signed_transfer(1)?;
        let tx = Transaction::from_envelope(envelope);
        let injected = address!("0x00000000000000000000000000000000000000cd");
        let resolver = SenderResolver::new(Arc::new(Fixed(injected)));
        assert_eq!(resolver.resolve(&tx, B256::ZERO)?, injected);
        Ok(())
    }

    #[test]
    fn without_metadata_recovers_signer() -> eyre::Result<()> {
        let (envelope, signer) = signed_transfer(2)?;
        let tx = Transaction::from_envelope(envelope);
        assert_eq!(SenderResolver::default().resolve(&tx, B256::ZERO)?, signer);
        Ok(())
    }
}
