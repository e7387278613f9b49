use crate::errors::{ClientError, Result};
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use bip39::{Language, Mnemonic};
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::Network;
use std::fmt;
use zeroize::Zeroizing;

/// BIP-44 path of the `index`-th Ethereum account: `m/44'/60'/0'/0/{index}`.
pub fn eth_path(index: u32) -> String {
    format!("m/44'/60'/0'/0/{index}")
}

/// BIP-32 master key from which Ethereum signers are derived.
pub struct HdWallet {
    master: Xpriv,
    secp: Secp256k1<All>,
}

impl fmt::Debug for HdWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdWallet").finish_non_exhaustive()
    }
}

impl HdWallet {
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let master = Xpriv::new_master(Network::Bitcoin, seed)
            .map_err(|e| ClientError::InvalidArgument(format!("bip32 master key: {e}")))?;
        Ok(Self {
            master,
            secp: Secp256k1::new(),
        })
    }

    /// BIP-39 English mnemonic plus optional passphrase (empty string for none).
    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> Result<Self> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
            .map_err(|e| ClientError::InvalidArgument(format!("parse mnemonic: {e}")))?;
        let seed = Zeroizing::new(mnemonic.to_seed_normalized(passphrase));
        Self::from_seed(seed.as_slice())
    }

    pub fn derive_signer(&self, path: &str) -> Result<PrivateKeySigner> {
        let path: DerivationPath = path
            .parse()
            .map_err(|e| ClientError::InvalidArgument(format!("derivation path {path:?}: {e}")))?;
        let child = self
            .master
            .derive_priv(&self.secp, &path)
            .map_err(|e| ClientError::InvalidArgument(format!("derive child key: {e}")))?;
        let secret = Zeroizing::new(child.private_key.secret_bytes());
        PrivateKeySigner::from_slice(secret.as_slice())
            .map_err(|e| ClientError::InvalidPrivateKey(e.to_string()))
    }

    pub fn derive_address(&self, path: &str) -> Result<Address> {
        Ok(self.derive_signer(path)?.address())
    }
}
