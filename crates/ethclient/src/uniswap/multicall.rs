//! Batched read-only calls through the Multicall2 contract.

use crate::client::Client;
use crate::contract::CallOpts;
use crate::errors::{ClientError, Result};
use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{address, Address, Bytes};

/// Multicall2 deployment shared by mainnet and most testnets.
pub const MULTICALL2: Address = address!("0x5BA1e12693Dc8F9c48aAD8770482f4739bEeD696");

pub const MULTICALL2_ABI: &str = r#"[
  {"type":"function","name":"tryAggregate","stateMutability":"nonpayable",
   "inputs":[
     {"name":"requireSuccess","type":"bool"},
     {"name":"calls","type":"tuple[]","components":[
       {"name":"target","type":"address"},
       {"name":"callData","type":"bytes"}]}],
   "outputs":[
     {"name":"returnData","type":"tuple[]","components":[
       {"name":"success","type":"bool"},
       {"name":"returnData","type":"bytes"}]}]}
]"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub target: Address,
    pub call_data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticallResult {
    pub success: bool,
    pub return_data: Bytes,
}

impl Call {
    pub const fn new(target: Address, call_data: Bytes) -> Self {
        Self { target, call_data }
    }

    fn to_dyn(&self) -> DynSolValue {
        DynSolValue::Tuple(vec![
            DynSolValue::Address(self.target),
            DynSolValue::Bytes(self.call_data.to_vec()),
        ])
    }
}

fn result_from_dyn(item: DynSolValue) -> Result<MulticallResult> {
    let DynSolValue::Tuple(fields) = item else {
        return Err(unexpected("result entry is not a tuple"));
    };
    match fields.as_slice() {
        [DynSolValue::Bool(success), DynSolValue::Bytes(data)] => Ok(MulticallResult {
            success: *success,
            return_data: Bytes::copy_from_slice(data),
        }),
        _ => Err(unexpected("result entry is not (bool, bytes)")),
    }
}

fn unexpected(reason: &str) -> ClientError {
    ClientError::ResultDecoding {
        method: "tryAggregate".to_owned(),
        reason: reason.to_owned(),
    }
}

/// Runs `calls` in one `eth_call`. With `require_success` any failing sub-call reverts the
/// whole batch; otherwise failures come back with `success == false`.
pub async fn try_aggregate(
    client: &Client,
    require_success: bool,
    calls: &[Call],
    opts: &CallOpts,
) -> Result<Vec<MulticallResult>> {
    let params = [
        DynSolValue::Bool(require_success),
        DynSolValue::Array(calls.iter().map(Call::to_dyn).collect()),
    ];
    let items: Vec<DynSolValue> = client
        .call_into(MULTICALL2, opts, "tryAggregate", MULTICALL2_ABI, &params)
        .await?;
    items.into_iter().map(result_from_dyn).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::scripted::ScriptedTransport;
    use alloy::primitives::hex;
    use serde_json::json;

    #[tokio::test]
    async fn results_are_unpacked_in_order() -> eyre::Result<()> {
        let encoded = DynSolValue::Tuple(vec![DynSolValue::Array(vec![
            DynSolValue::Tuple(vec![DynSolValue::Bool(true), DynSolValue::Bytes(vec![0x12])]),
            DynSolValue::Tuple(vec![DynSolValue::Bool(false), DynSolValue::Bytes(vec![])]),
        ])])
        .abi_encode_params();
        let (client, t) = ScriptedTransport::new()
            .reply("eth_call", json!(hex::encode_prefixed(encoded)))
            .connect();

        let token = address!("0x6b175474e89094c44da98b954eedeac495271d0f");
        let calls = [
            Call::new(token, Bytes::from_static(&[0x31, 0x3c, 0xe5, 0x67])),
            Call::new(token, Bytes::from_static(&[0x95, 0xd8, 0x9b, 0x41])),
        ];
        let results = try_aggregate(&client, false, &calls, &CallOpts::default()).await?;
        assert_eq!(
            results,
            vec![
                MulticallResult {
                    success: true,
                    return_data: Bytes::from_static(&[0x12]),
                },
                MulticallResult {
                    success: false,
                    return_data: Bytes::new(),
                },
            ]
        );

        let to = t
            .calls()
            .first()
            .and_then(|(_, p)| p.pointer("/0/to").cloned())
            .ok_or_else(|| eyre::eyre!("no eth_call"))?;
        assert_eq!(to, json!(MULTICALL2));
        Ok(())
    }
}
