use crate::errors::{ClientError, Result};
use alloy::primitives::{U256, U512};
use rust_decimal::Decimal;

const MAX_SCALE: u32 = 18;

/// Converts a pool's `sqrtPriceX96` into a token price.
///
/// With `zero_for_one` the result is token1 per token0 (`(sqrt / 2^96)^2`); otherwise its
/// reciprocal. Raw token units, no decimals adjustment. Precision is 18 fractional digits,
/// reduced only when the integer part is too large for a [`Decimal`].
pub fn sqrt_price_x96_to_price(sqrt_price_x96: U256, zero_for_one: bool) -> Result<Decimal> {
    let sqrt = U512::from(sqrt_price_x96);
    let squared = sqrt * sqrt;
    let q192 = U512::from(1_u8) << 192;
    let (num, den) = if zero_for_one {
        (squared, q192)
    } else {
        (q192, squared)
    };
    if den.is_zero() {
        return Err(ClientError::InvalidArgument(
            "sqrtPriceX96 of zero has no inverse price".to_owned(),
        ));
    }

    let limit = U512::from(1_u8) << 96;
    for scale in (0..=MAX_SCALE).rev() {
        let scaled = num * U512::from(10_u8).pow(U512::from(scale)) / den;
        if scaled >= limit {
            continue;
        }
        let Ok(mantissa) = i128::try_from(scaled) else {
            continue;
        };
        if let Ok(price) = Decimal::try_from_i128_with_scale(mantissa, scale) {
            return Ok(price.normalize());
        }
    }
    Err(ClientError::InvalidArgument(format!(
        "price for sqrtPriceX96 {sqrt_price_x96} is out of range"
    )))
}
