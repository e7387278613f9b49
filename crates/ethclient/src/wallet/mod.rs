//! Key material helpers: seed encryption at rest and BIP-32 account derivation.

pub mod aes;
pub mod hd;

pub use self::aes::{aes_cbc_decrypt, aes_cbc_encrypt};
pub use hd::{eth_path, HdWallet};
