//! Deterministic (CREATE2) pool addresses, computed without touching the network.
//!
//! The V2 and V3 derivations are deliberately separate functions: V2 hashes the packed token
//! pair into the salt, V3 hashes the ABI-encoded `(token0, token1, fee)` tuple.

use crate::errors::{ClientError, Result};
use alloy::primitives::{address, b256, keccak256, Address, B256, U256};

pub const V2_FACTORY: Address = address!("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");
pub const V2_INIT_CODE_HASH: B256 =
    b256!("0x96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f");

pub const V3_FACTORY: Address = address!("0x1F98431c8aD98523631AE4a59f267346ea31F984");
pub const V3_INIT_CODE_HASH: B256 =
    b256!("0xe34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54");

/// Largest fee tier representable as `uint24`.
pub const MAX_FEE: u32 = 0x00FF_FFFF;

/// Orders a pair so that `token0 < token1` as unsigned 160-bit integers.
pub fn sort_tokens(token_a: Address, token_b: Address) -> (Address, Address) {
    if token_a < token_b {
        (token_a, token_b)
    } else {
        (token_b, token_a)
    }
}

/// Uniswap V2 pair address on mainnet. Argument order does not matter.
pub fn pair_address_v2(token_a: Address, token_b: Address) -> Address {
    pair_address_for_factory(V2_FACTORY, token_a, token_b, V2_INIT_CODE_HASH)
}

/// V2-style pair address for any factory sharing the V2 derivation (forks, testnets).
pub fn pair_address_for_factory(
    factory: Address,
    token_a: Address,
    token_b: Address,
    init_code_hash: B256,
) -> Address {
    let (token0, token1) = sort_tokens(token_a, token_b);
    let salt = keccak256([token0.as_slice(), token1.as_slice()].concat());
    let digest = keccak256(
        [
            &[0xff_u8][..],
            factory.as_slice(),
            salt.as_slice(),
            init_code_hash.as_slice(),
        ]
        .concat(),
    );
    // Read the digest as a non-negative integer and keep its low 160 bits.
    let value = U256::from_be_bytes(digest.0);
    Address::from_word(B256::from(value))
}

/// Uniswap V3 pool address on mainnet for a fee tier in hundredths of a bip (3000 = 0.3%).
pub fn pool_address_v3(token_a: Address, token_b: Address, fee: u32) -> Result<Address> {
    if fee > MAX_FEE {
        return Err(ClientError::InvalidArgument(format!(
            "fee {fee} does not fit in uint24"
        )));
    }
    let (token0, token1) = sort_tokens(token_a, token_b);
    let encoded = [
        token0.into_word().as_slice(),
        token1.into_word().as_slice(),
        B256::from(U256::from(fee)).as_slice(),
    ]
    .concat();
    let salt = keccak256(encoded);
    Ok(V3_FACTORY.create2(salt, V3_INIT_CODE_HASH))
}
