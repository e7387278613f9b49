//! Legacy vs dynamic-fee pricing.
//!
//! [`FeePolicy::select`] is a pure decision over what the caller supplied and whether the head
//! block carries a base fee. [`FeePolicy::resolve`] fills in whatever the caller left open from a
//! [`FeeOracle`].

use crate::client::Client;
use crate::errors::{ClientError, Result};
use async_trait::async_trait;

/// Fee fields as supplied by the caller. `gas_price` excludes both dynamic fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeFields {
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl FeeFields {
    pub const fn has_dynamic(&self) -> bool {
        self.max_fee_per_gas.is_some() || self.max_priority_fee_per_gas.is_some()
    }

    /// Rejects a legacy price combined with any dynamic field. Needs no network.
    pub fn check_exclusive(&self) -> Result<()> {
        if self.gas_price.is_some() && self.has_dynamic() {
            return Err(ClientError::ConflictingFeeFields);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
    /// Caller-supplied gas price.
    LegacyFixed { gas_price: u128 },
    /// No base fee on the chain head and nothing supplied: ask the node.
    LegacySuggested,
    /// At least one dynamic field supplied; the other is derived.
    DynamicExplicit {
        base_fee: u128,
        tip_cap: Option<u128>,
        fee_cap: Option<u128>,
    },
    DynamicSuggested { base_fee: u128 },
}

/// Prices ready to go into a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedFees {
    Legacy {
        gas_price: u128,
    },
    Dynamic {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

/// Node-side fee suggestions.
#[async_trait]
pub trait FeeOracle: Send + Sync {
    async fn legacy_gas_price(&self) -> Result<u128>;
    async fn priority_fee(&self) -> Result<u128>;
}

#[async_trait]
impl FeeOracle for Client {
    async fn legacy_gas_price(&self) -> Result<u128> {
        self.suggest_gas_price().await
    }

    async fn priority_fee(&self) -> Result<u128> {
        self.suggest_gas_tip_cap().await
    }
}

/// Fee cap leaving room for two consecutive full-block base fee increases.
pub const fn default_fee_cap(tip_cap: u128, base_fee: u128) -> u128 {
    tip_cap.saturating_add(base_fee.saturating_mul(2))
}

impl FeePolicy {
    /// `base_fee` is the head block's base fee, `None` before the fee market activated.
    pub fn select(fields: &FeeFields, base_fee: Option<u128>) -> Result<Self> {
        fields.check_exclusive()?;
        match (base_fee, fields.gas_price) {
            (Some(base_fee), None) if fields.has_dynamic() => Ok(Self::DynamicExplicit {
                base_fee,
                tip_cap: fields.max_priority_fee_per_gas,
                fee_cap: fields.max_fee_per_gas,
            }),
            (Some(base_fee), None) => Ok(Self::DynamicSuggested { base_fee }),
            (_, gas_price) => {
                if fields.has_dynamic() {
                    return Err(ClientError::DynamicFeeNotActive);
                }
                Ok(gas_price.map_or(Self::LegacySuggested, |gas_price| Self::LegacyFixed {
                    gas_price,
                }))
            }
        }
    }

    pub const fn is_dynamic(&self) -> bool {
        matches!(
            self,
            Self::DynamicExplicit { .. } | Self::DynamicSuggested { .. }
        )
    }

    pub async fn resolve<O: FeeOracle + ?Sized>(self, oracle: &O) -> Result<ResolvedFees> {
        match self {
            Self::LegacyFixed { gas_price } => Ok(ResolvedFees::Legacy { gas_price }),
            Self::LegacySuggested => Ok(ResolvedFees::Legacy {
                gas_price: oracle.legacy_gas_price().await?,
            }),
            Self::DynamicExplicit {
                base_fee,
                tip_cap,
                fee_cap,
            } => {
                let tip_cap = match tip_cap {
                    Some(t) => t,
                    None => oracle.priority_fee().await?,
                };
                dynamic(tip_cap, fee_cap.unwrap_or_else(|| default_fee_cap(tip_cap, base_fee)))
            }
            Self::DynamicSuggested { base_fee } => {
                let tip_cap = oracle.priority_fee().await?;
                dynamic(tip_cap, default_fee_cap(tip_cap, base_fee))
            }
        }
    }
}

fn dynamic(tip_cap: u128, fee_cap: u128) -> Result<ResolvedFees> {
    if fee_cap < tip_cap {
        return Err(ClientError::FeeCapBelowTipCap { fee_cap, tip_cap });
    }
    Ok(ResolvedFees::Dynamic {
        max_fee_per_gas: fee_cap,
        max_priority_fee_per_gas: tip_cap,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GWEI: u128 = 1_000_000_000;

    #[derive(Debug, Default)]
    struct CountingOracle {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FeeOracle for CountingOracle {
        async fn legacy_gas_price(&self) -> Result<u128> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(20 * GWEI)
        }

        async fn priority_fee(&self) -> Result<u128> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(2 * GWEI)
        }
    }

    #[tokio::test]
    async fn suggested_dynamic_fee_cap_is_tip_plus_twice_base() -> eyre::Result<()> {
        let oracle = CountingOracle::default();
        let base_fee = 30 * GWEI;
        let policy = FeePolicy::select(&FeeFields::default(), Some(base_fee))?;
        assert_eq!(policy, FeePolicy::DynamicSuggested { base_fee });

        let fees = policy.resolve(&oracle).await?;
        let ResolvedFees::Dynamic {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } = fees
        else {
            return Err(eyre::eyre!("expected dynamic fees, got {fees:?}"));
        };
        assert_eq!(max_priority_fee_per_gas, 2 * GWEI);
        assert_eq!(max_fee_per_gas, max_priority_fee_per_gas + 2 * base_fee);
        assert!(max_fee_per_gas >= max_priority_fee_per_gas, "cap covers tip");
        Ok(())
    }

    #[test]
    fn legacy_price_with_dynamic_field_conflicts() {
        let fields = FeeFields {
            gas_price: Some(GWEI),
            max_priority_fee_per_gas: Some(GWEI),
            ..FeeFields::default()
        };
        for base_fee in [None, Some(GWEI)] {
            assert!(
                matches!(
                    FeePolicy::select(&fields, base_fee),
                    Err(ClientError::ConflictingFeeFields)
                ),
                "conflict regardless of base fee"
            );
        }
    }

    #[test]
    fn decision_table() -> eyre::Result<()> {
        let none = FeeFields::default();
        let price = FeeFields {
            gas_price: Some(5),
            ..FeeFields::default()
        };
        let tip = FeeFields {
            max_priority_fee_per_gas: Some(3),
            ..FeeFields::default()
        };

        assert_eq!(FeePolicy::select(&none, None)?, FeePolicy::LegacySuggested);
        assert_eq!(
            FeePolicy::select(&price, None)?,
            FeePolicy::LegacyFixed { gas_price: 5 }
        );
        // A legacy price forces legacy even after the fee market activated.
        assert_eq!(
            FeePolicy::select(&price, Some(7))?,
            FeePolicy::LegacyFixed { gas_price: 5 }
        );
        assert_eq!(
            FeePolicy::select(&tip, Some(7))?,
            FeePolicy::DynamicExplicit {
                base_fee: 7,
                tip_cap: Some(3),
                fee_cap: None
            }
        );
        assert!(
            matches!(
                FeePolicy::select(&tip, None),
                Err(ClientError::DynamicFeeNotActive)
            ),
            "dynamic fields need a base fee"
        );
        Ok(())
    }

    #[tokio::test]
    async fn explicit_fees_skip_the_oracle() -> eyre::Result<()> {
        let oracle = CountingOracle::default();
        let fields = FeeFields {
            max_fee_per_gas: Some(50 * GWEI),
            max_priority_fee_per_gas: Some(GWEI),
            ..FeeFields::default()
        };
        let fees = FeePolicy::select(&fields, Some(10 * GWEI))?
            .resolve(&oracle)
            .await?;
        assert_eq!(
            fees,
            ResolvedFees::Dynamic {
                max_fee_per_gas: 50 * GWEI,
                max_priority_fee_per_gas: GWEI
            }
        );
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);

        let fixed = FeePolicy::LegacyFixed { gas_price: 9 }.resolve(&oracle).await?;
        assert_eq!(fixed, ResolvedFees::Legacy { gas_price: 9 });
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn fee_cap_below_tip_is_rejected() -> eyre::Result<()> {
        let oracle = CountingOracle::default();
        let fields = FeeFields {
            max_fee_per_gas: Some(GWEI),
            ..FeeFields::default()
        };
        // Tip comes from the oracle (2 gwei) and exceeds the explicit cap.
        let err = FeePolicy::select(&fields, Some(GWEI))?.resolve(&oracle).await;
        assert!(
            matches!(
                err,
                Err(ClientError::FeeCapBelowTipCap {
                    fee_cap,
                    tip_cap
                }) if fee_cap == GWEI && tip_cap == 2 * GWEI
            ),
            "expected FeeCapBelowTipCap, got {err:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn legacy_suggested_asks_for_gas_price() -> eyre::Result<()> {
        let oracle = CountingOracle::default();
        let fees = FeePolicy::LegacySuggested.resolve(&oracle).await?;
        assert_eq!(fees, ResolvedFees::Legacy { gas_price: 20 * GWEI });
        assert!(!FeePolicy::LegacySuggested.is_dynamic());
        Ok(())
    }

    #[test]
    fn default_fee_cap_saturates() {
        assert_eq!(default_fee_cap(u128::MAX, 1), u128::MAX);
        assert_eq!(default_fee_cap(2, u128::MAX), u128::MAX);
        assert_eq!(default_fee_cap(2, 10), 22);
    }
}
