//! Offline Uniswap helpers plus a Multicall2 wrapper.

pub mod multicall;
pub mod path;
pub mod pool_address;
pub mod price;

pub use multicall::{try_aggregate, Call, MulticallResult, MULTICALL2};
pub use path::encode_path;
pub use pool_address::{
    pair_address_for_factory, pair_address_v2, pool_address_v3, sort_tokens, MAX_FEE,
    V2_FACTORY, V2_INIT_CODE_HASH, V3_FACTORY, V3_INIT_CODE_HASH,
};
pub use price::sqrt_price_x96_to_price;
