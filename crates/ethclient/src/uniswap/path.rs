use crate::errors::{ClientError, Result};
use alloy::primitives::{Address, Bytes};

use super::pool_address::MAX_FEE;

/// Packs a V3 multi-hop route: `token (20 bytes) | fee (3 bytes) | token | ... | token`.
pub fn encode_path(path: &[Address], fees: &[u32]) -> Result<Bytes> {
    if path.len() != fees.len() + 1 {
        return Err(ClientError::InvalidArgument(format!(
            "path/fee lengths do not match: {} tokens, {} fees",
            path.len(),
            fees.len()
        )));
    }
    let mut out = Vec::with_capacity(path.len() * 20 + fees.len() * 3);
    for (token, &fee) in path.iter().zip(fees) {
        if fee > MAX_FEE {
            return Err(ClientError::InvalidArgument(format!(
                "fee {fee} does not fit in uint24"
            )));
        }
        let [_, hi, mid, lo] = fee.to_be_bytes();
        out.extend_from_slice(token.as_slice());
        out.extend_from_slice(&[hi, mid, lo]);
    }
    if let Some(last) = path.last() {
        out.extend_from_slice(last.as_slice());
    }
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, hex};

    const WETH: Address = address!("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
    const DAI: Address = address!("0x6b175474e89094c44da98b954eedeac495271d0f");

    #[test]
    fn single_hop() -> eyre::Result<()> {
        let got = encode_path(&[WETH, DAI], &[3000])?;
        assert_eq!(
            hex::encode(&got),
            "c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2000bb86b175474e89094c44da98b954eedeac495271d0f"
        );
        Ok(())
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(matches!(
            encode_path(&[WETH, DAI], &[]),
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            encode_path(&[], &[]),
            Err(ClientError::InvalidArgument(_))
        ));
    }

    #[test]
    fn two_hops_length() -> eyre::Result<()> {
        let usdc = address!("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
        let got = encode_path(&[WETH, usdc, DAI], &[500, 100])?;
        assert_eq!(got.len(), 20 * 3 + 3 * 2);
        assert_eq!(got.get(20..23), Some(&[0x00, 0x01, 0xf4][..]));
        Ok(())
    }
}
