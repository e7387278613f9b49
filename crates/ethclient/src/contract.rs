use crate::client::Client;
use crate::errors::{ClientError, Result};
use alloy::dyn_abi::{DynSolValue, FunctionExt as _, JsonAbiExt as _};
use alloy::json_abi::Function;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::rpc::types::{BlockNumberOrTag, TransactionInput, TransactionRequest};
use tracing::debug;

/// Minimal ERC-20 ABI used by [`Client::balance_of`].
pub const ERC20_ABI: &str = r#"[
  {"type":"function","name":"balanceOf","stateMutability":"view",
   "inputs":[{"name":"owner","type":"address"}],
   "outputs":[{"name":"","type":"uint256"}]},
  {"type":"function","name":"decimals","stateMutability":"view",
   "inputs":[],"outputs":[{"name":"","type":"uint8"}]},
  {"type":"function","name":"symbol","stateMutability":"view",
   "inputs":[],"outputs":[{"name":"","type":"string"}]}
]"#;

/// Which state a read-only call runs against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOpts {
    /// Run against pending state; wins over `block_number`.
    pub pending: bool,
    /// Historical height; `None` means latest.
    pub block_number: Option<u64>,
    pub from: Option<Address>,
}

impl CallOpts {
    pub const fn pending() -> Self {
        Self {
            pending: true,
            block_number: None,
            from: None,
        }
    }

    pub const fn at(block_number: u64) -> Self {
        Self {
            pending: false,
            block_number: Some(block_number),
            from: None,
        }
    }

    pub const fn block(&self) -> BlockNumberOrTag {
        if self.pending {
            return BlockNumberOrTag::Pending;
        }
        match self.block_number {
            Some(n) => BlockNumberOrTag::Number(n),
            None => BlockNumberOrTag::Latest,
        }
    }
}

/// Conversion from a decoded ABI value into a caller-chosen output type.
pub trait FromDynValue: Sized {
    fn from_dyn(value: DynSolValue) -> Option<Self>;
}

impl FromDynValue for DynSolValue {
    fn from_dyn(value: DynSolValue) -> Option<Self> {
        Some(value)
    }
}

impl FromDynValue for U256 {
    fn from_dyn(value: DynSolValue) -> Option<Self> {
        value.as_uint().map(|(v, _)| v)
    }
}

impl FromDynValue for Address {
    fn from_dyn(value: DynSolValue) -> Option<Self> {
        value.as_address()
    }
}

impl FromDynValue for bool {
    fn from_dyn(value: DynSolValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromDynValue for String {
    fn from_dyn(value: DynSolValue) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl FromDynValue for Bytes {
    fn from_dyn(value: DynSolValue) -> Option<Self> {
        value.as_bytes().map(|b| Self::copy_from_slice(b))
    }
}

impl FromDynValue for B256 {
    fn from_dyn(value: DynSolValue) -> Option<Self> {
        match value {
            DynSolValue::FixedBytes(word, 32) => Some(word),
            _ => None,
        }
    }
}

impl FromDynValue for u8 {
    fn from_dyn(value: DynSolValue) -> Option<Self> {
        value.as_uint().and_then(|(v, _)| Self::try_from(v).ok())
    }
}

impl FromDynValue for Vec<DynSolValue> {
    fn from_dyn(value: DynSolValue) -> Option<Self> {
        match value {
            DynSolValue::Array(items)
            | DynSolValue::FixedArray(items)
            | DynSolValue::Tuple(items) => Some(items),
            _ => None,
        }
    }
}

fn render_params(params: &[DynSolValue]) -> String {
    format!("{params:?}")
}

impl Client {
    /// Resolves `method` in the (cached) ABI for `contract` and packs `params` into call data.
    ///
    /// Overloads are matched on argument count.
    pub fn pack(
        &self,
        contract: Address,
        abi_description: &str,
        method: &str,
        params: &[DynSolValue],
    ) -> Result<(Function, Bytes)> {
        let abi = self.abi_cache().get_or_parse(contract, abi_description)?;
        let encoding_error = |reason: String| ClientError::ArgumentEncoding {
            method: method.to_owned(),
            params: render_params(params),
            reason,
        };
        let overloads = abi
            .function(method)
            .ok_or_else(|| encoding_error(format!("method {method:?} not found in abi")))?;
        let func = overloads
            .iter()
            .find(|f| f.inputs.len() == params.len())
            .or_else(|| overloads.first())
            .ok_or_else(|| encoding_error(format!("method {method:?} not found in abi")))?;
        let data = func
            .abi_encode_input(params)
            .map_err(|e| encoding_error(e.to_string()))?;
        Ok((func.clone(), Bytes::from(data)))
    }

    /// Read-only contract call returning every declared output.
    pub async fn call(
        &self,
        contract: Address,
        opts: &CallOpts,
        method: &str,
        abi_description: &str,
        params: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>> {
        let (func, data) = self.pack(contract, abi_description, method, params)?;
        let block = opts.block();
        let msg = TransactionRequest {
            from: opts.from,
            to: Some(TxKind::Call(contract)),
            input: TransactionInput::new(data),
            ..Default::default()
        };
        let output = self.call_contract(&msg, block).await?;

        if output.is_empty() {
            // Either an empty return or nothing deployed; the code decides.
            let code = self.code_at(contract, block).await?;
            if code.is_empty() {
                return Err(ClientError::NoContractCode { address: contract });
            }
            debug!(%contract, method, "empty return from deployed contract");
        }
        func.abi_decode_output(&output)
            .map_err(|e| ClientError::ResultDecoding {
                method: method.to_owned(),
                reason: e.to_string(),
            })
    }

    /// Like [`Client::call`], converting the first declared output into `T`.
    pub async fn call_into<T: FromDynValue>(
        &self,
        contract: Address,
        opts: &CallOpts,
        method: &str,
        abi_description: &str,
        params: &[DynSolValue],
    ) -> Result<T> {
        let outputs = self
            .call(contract, opts, method, abi_description, params)
            .await?;
        let decoding_error = |reason: &str| ClientError::ResultDecoding {
            method: method.to_owned(),
            reason: reason.to_owned(),
        };
        let first = outputs
            .into_iter()
            .next()
            .ok_or_else(|| decoding_error("method declares no outputs"))?;
        T::from_dyn(first).ok_or_else(|| {
            decoding_error(&format!(
                "first output does not convert to {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// ERC-20 `balanceOf(owner)` on `token`, at the latest block.
    pub async fn balance_of(&self, owner: Address, token: Address) -> Result<U256> {
        self.call_into(
            token,
            &CallOpts::default(),
            "balanceOf",
            ERC20_ABI,
            &[DynSolValue::Address(owner)],
        )
        .await
    }
}
