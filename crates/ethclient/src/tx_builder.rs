use crate::client::Client;
use crate::errors::{ClientError, Result};
use crate::fees::{FeeFields, FeePolicy, ResolvedFees};
use alloy::consensus::{SignableTransaction as _, TxEip1559, TxEnvelope, TxLegacy};
use alloy::dyn_abi::DynSolValue;
use alloy::eips::eip2930::AccessList;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::rpc::types::{BlockNumberOrTag, TransactionInput, TransactionRequest};
use alloy::signers::{local::PrivateKeySigner, SignerSync as _};
use tracing::info;

/// Gas limit for a plain value transfer when the caller gives none.
pub const TRANSFER_GAS: u64 = 21_000;

/// Caller overrides for transaction building. Anything `None` is resolved from the node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactOpts {
    pub nonce: Option<u64>,
    pub value: U256,
    pub gas_limit: Option<u64>,
    pub fees: FeeFields,
}

pub fn signer_from_hex(key: &str) -> Result<PrivateKeySigner> {
    key.trim()
        .parse::<PrivateKeySigner>()
        .map_err(|e| ClientError::InvalidPrivateKey(e.to_string()))
}

/// Everything needed to sign, with fees and gas settled.
#[derive(Debug)]
struct Draft {
    to: Address,
    value: U256,
    input: Bytes,
    nonce: u64,
    gas_limit: u64,
    fees: ResolvedFees,
}

fn sign(signer: &PrivateKeySigner, chain_id: u64, d: Draft) -> Result<TxEnvelope> {
    let to = TxKind::Call(d.to);
    match d.fees {
        ResolvedFees::Dynamic {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            let tx = TxEip1559 {
                chain_id,
                nonce: d.nonce,
                gas_limit: d.gas_limit,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                to,
                value: d.value,
                access_list: AccessList::default(),
                input: d.input,
            };
            let sig = signer
                .sign_hash_sync(&tx.signature_hash())
                .map_err(|e| ClientError::Signing(e.to_string()))?;
            Ok(TxEnvelope::Eip1559(tx.into_signed(sig)))
        }
        ResolvedFees::Legacy { gas_price } => {
            // EIP-155: the chain ID is part of the signed payload.
            let tx = TxLegacy {
                chain_id: Some(chain_id),
                nonce: d.nonce,
                gas_price,
                gas_limit: d.gas_limit,
                to,
                value: d.value,
                input: d.input,
            };
            let sig = signer
                .sign_hash_sync(&tx.signature_hash())
                .map_err(|e| ClientError::Signing(e.to_string()))?;
            Ok(TxEnvelope::Legacy(tx.into_signed(sig)))
        }
    }
}

fn estimate_request(from: Address, to: Address, value: U256, input: &Bytes, fees: ResolvedFees) -> TransactionRequest {
    let mut msg = TransactionRequest {
        from: Some(from),
        to: Some(TxKind::Call(to)),
        value: Some(value),
        input: TransactionInput::new(input.clone()),
        ..Default::default()
    };
    match fees {
        ResolvedFees::Legacy { gas_price } => msg.gas_price = Some(gas_price),
        ResolvedFees::Dynamic {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            msg.max_fee_per_gas = Some(max_fee_per_gas);
            msg.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
        }
    }
    msg
}

impl Client {
    /// Builds and signs a call to `method` on `contract`. Nothing is broadcast.
    pub async fn build_contract_tx(
        &self,
        signer: &PrivateKeySigner,
        contract: Address,
        opts: &TransactOpts,
        method: &str,
        abi_description: &str,
        params: &[DynSolValue],
    ) -> Result<TxEnvelope> {
        let (_func, input) = self.pack(contract, abi_description, method, params)?;
        self.build(signer, contract, opts, input, true).await
    }

    /// Builds and signs a plain value transfer. Nothing is broadcast.
    pub async fn build_transfer_tx(
        &self,
        signer: &PrivateKeySigner,
        to: Address,
        opts: &TransactOpts,
    ) -> Result<TxEnvelope> {
        self.build(signer, to, opts, Bytes::new(), false).await
    }

    async fn build(
        &self,
        signer: &PrivateKeySigner,
        to: Address,
        opts: &TransactOpts,
        input: Bytes,
        is_contract_call: bool,
    ) -> Result<TxEnvelope> {
        opts.fees.check_exclusive()?;
        let from = signer.address();

        let nonce = match opts.nonce {
            Some(n) => n,
            None => self.pending_nonce_at(from).await?,
        };

        let head = self.header_by_number(BlockNumberOrTag::Latest).await?;
        let base_fee = head.inner.base_fee_per_gas.map(u128::from);
        let fees = FeePolicy::select(&opts.fees, base_fee)?
            .resolve(self)
            .await?;

        let gas_limit = match opts.gas_limit {
            Some(g) => g,
            None if !is_contract_call => TRANSFER_GAS,
            None => {
                if self.pending_code_at(to).await?.is_empty() {
                    return Err(ClientError::NoContractCode { address: to });
                }
                let msg = estimate_request(from, to, opts.value, &input, fees);
                self.estimate_gas(&msg).await?
            }
        };

        let chain_id = self.cached_chain_id().await?;
        let envelope = sign(
            signer,
            chain_id,
            Draft {
                to,
                value: opts.value,
                input,
                nonce,
                gas_limit,
                fees,
            },
        )?;
        info!(
            %from,
            %to,
            nonce,
            gas_limit,
            chain_id,
            tx_hash = %envelope.tx_hash(),
            "transaction signed"
        );
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::tests::{header_json, TEST_KEY};
    use crate::transport::scripted::ScriptedTransport;
    use alloy::consensus::transaction::SignerRecoverable as _;
    use alloy::consensus::{EMPTY_OMMER_ROOT_HASH, EMPTY_ROOT_HASH};
    use alloy::primitives::{address, B256};
    use serde_json::{json, Value};

    const GWEI: u128 = 1_000_000_000;
    const SPENDER: Address = address!("0x00000000000000000000000000000000000000cc");
    const TOKEN: Address = address!("0x6b175474e89094c44da98b954eedeac495271d0f");
    const APPROVE_ABI: &str = r#"[{"type":"function","name":"approve","stateMutability":"nonpayable","inputs":[{"name":"spender","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}]}]"#;

    fn head(base_fee_gwei: Option<u64>) -> eyre::Result<Value> {
        header_json(
            B256::repeat_byte(0x42),
            EMPTY_OMMER_ROOT_HASH,
            EMPTY_ROOT_HASH,
            base_fee_gwei.map(|g| g * 1_000_000_000),
        )
    }

    fn approve_params() -> Vec<DynSolValue> {
        vec![
            DynSolValue::Address(SPENDER),
            DynSolValue::Uint(U256::from(1_000_u64), 256),
        ]
    }

    #[tokio::test]
    async fn contract_tx_uses_dynamic_fees_after_london() -> eyre::Result<()> {
        let signer = signer_from_hex(TEST_KEY)?;
        let (client, t) = ScriptedTransport::new()
            .reply("eth_getTransactionCount", json!("0x5"))
            .reply("eth_getBlockByNumber", head(Some(10))?)
            .reply("eth_maxPriorityFeePerGas", json!("0x3b9aca00"))
            .reply("eth_getCode", json!("0x6080"))
            .reply("eth_estimateGas", json!("0xc350"))
            .reply("eth_chainId", json!("0x1"))
            .connect();

        let env = client
            .build_contract_tx(
                &signer,
                TOKEN,
                &TransactOpts::default(),
                "approve",
                APPROVE_ABI,
                &approve_params(),
            )
            .await?;

        let TxEnvelope::Eip1559(signed) = &env else {
            return Err(eyre::eyre!("expected a dynamic-fee transaction, got {env:?}"));
        };
        let tx = signed.tx();
        assert_eq!(tx.nonce, 5);
        assert_eq!(tx.gas_limit, 50_000);
        assert_eq!(tx.chain_id, 1);
        assert_eq!(tx.max_priority_fee_per_gas, GWEI);
        assert_eq!(tx.max_fee_per_gas, GWEI + 2 * 10 * GWEI);
        assert!(tx.input.starts_with(&[0x09, 0x5e, 0xa7, 0xb3]), "approve selector");
        assert_eq!(env.recover_signer()?, signer.address());

        let code_params = t
            .calls()
            .into_iter()
            .find(|(m, _)| *m == "eth_getCode")
            .map(|(_, p)| p);
        assert_eq!(code_params, Some(json!([TOKEN, "pending"])));
        Ok(())
    }

    #[tokio::test]
    async fn conflicting_fees_fail_before_any_rpc() -> eyre::Result<()> {
        let signer = signer_from_hex(TEST_KEY)?;
        let (client, t) = ScriptedTransport::new().connect();
        let opts = TransactOpts {
            fees: FeeFields {
                gas_price: Some(GWEI),
                max_priority_fee_per_gas: Some(GWEI),
                ..FeeFields::default()
            },
            ..TransactOpts::default()
        };
        let err = client.build_transfer_tx(&signer, SPENDER, &opts).await;
        assert!(
            matches!(err, Err(ClientError::ConflictingFeeFields)),
            "expected ConflictingFeeFields, got {err:?}"
        );
        assert!(t.calls().is_empty(), "no network call may precede the check");
        Ok(())
    }

    #[tokio::test]
    async fn legacy_transfer_before_london() -> eyre::Result<()> {
        let signer = signer_from_hex(TEST_KEY)?;
        let (client, t) = ScriptedTransport::new()
            .reply("eth_getBlockByNumber", head(None)?)
            .reply("eth_gasPrice", json!("0x4a817c800"))
            .reply("eth_chainId", json!("0x5"))
            .connect();
        let opts = TransactOpts {
            nonce: Some(9),
            value: U256::from(7_u64),
            ..TransactOpts::default()
        };
        let env = client.build_transfer_tx(&signer, SPENDER, &opts).await?;
        let TxEnvelope::Legacy(signed) = &env else {
            return Err(eyre::eyre!("expected a legacy transaction, got {env:?}"));
        };
        let tx = signed.tx();
        assert_eq!(tx.gas_limit, TRANSFER_GAS);
        assert_eq!(tx.gas_price, 20 * GWEI);
        assert_eq!(tx.chain_id, Some(5));
        assert_eq!(tx.nonce, 9);
        assert_eq!(tx.value, U256::from(7_u64));
        assert_eq!(t.count("eth_getTransactionCount"), 0, "explicit nonce wins");
        assert_eq!(env.recover_signer()?, signer.address());
        Ok(())
    }

    #[tokio::test]
    async fn dynamic_fields_rejected_before_london() -> eyre::Result<()> {
        let signer = signer_from_hex(TEST_KEY)?;
        let (client, _t) = ScriptedTransport::new()
            .reply("eth_getBlockByNumber", head(None)?)
            .connect();
        let opts = TransactOpts {
            nonce: Some(0),
            fees: FeeFields {
                max_fee_per_gas: Some(GWEI),
                ..FeeFields::default()
            },
            ..TransactOpts::default()
        };
        let err = client.build_transfer_tx(&signer, SPENDER, &opts).await;
        assert!(
            matches!(err, Err(ClientError::DynamicFeeNotActive)),
            "expected DynamicFeeNotActive, got {err:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn estimation_requires_pending_code() -> eyre::Result<()> {
        let signer = signer_from_hex(TEST_KEY)?;
        let (client, t) = ScriptedTransport::new()
            .reply("eth_getBlockByNumber", head(Some(1))?)
            .reply("eth_getCode", json!("0x"))
            .connect();
        let opts = TransactOpts {
            nonce: Some(0),
            fees: FeeFields {
                max_fee_per_gas: Some(10 * GWEI),
                max_priority_fee_per_gas: Some(GWEI),
                gas_price: None,
            },
            ..TransactOpts::default()
        };
        let err = client
            .build_contract_tx(&signer, TOKEN, &opts, "approve", APPROVE_ABI, &approve_params())
            .await;
        assert!(
            matches!(err, Err(ClientError::NoContractCode { address }) if address == TOKEN),
            "expected NoContractCode, got {err:?}"
        );
        assert_eq!(t.count("eth_estimateGas"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn chain_id_fetched_once_across_builds() -> eyre::Result<()> {
        let signer = signer_from_hex(TEST_KEY)?;
        let (client, t) = ScriptedTransport::new()
            .reply("eth_getBlockByNumber", head(None)?)
            .reply("eth_getBlockByNumber", head(None)?)
            .reply("eth_chainId", json!("0x1"))
            .connect();
        let opts = TransactOpts {
            nonce: Some(1),
            gas_limit: Some(30_000),
            fees: FeeFields {
                gas_price: Some(GWEI),
                ..FeeFields::default()
            },
            ..TransactOpts::default()
        };
        client.build_transfer_tx(&signer, SPENDER, &opts).await?;
        client.build_transfer_tx(&signer, SPENDER, &opts).await?;
        assert_eq!(t.count("eth_chainId"), 1);
        Ok(())
    }

    #[test]
    fn bad_private_key_is_rejected() {
        assert!(
            matches!(signer_from_hex("0xnothex"), Err(ClientError::InvalidPrivateKey(_))),
            "non-hex key must fail"
        );
    }
}
