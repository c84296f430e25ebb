//! Typed helpers for the `eth_*` methods the client itself relies on.

use serde_json::{json, Map, Value};

use ethlink_core::error::RpcError;
use ethlink_core::result::RpcResult;

use crate::client::RpcClient;

/// Block selector for `eth_call`, `eth_getBlockByNumber` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockNumber {
    #[default]
    Latest,
    Pending,
    Earliest,
    Safe,
    Finalized,
    Number(u64),
}

impl BlockNumber {
    pub fn to_param(&self) -> Value {
        match self {
            Self::Latest => json!("latest"),
            Self::Pending => json!("pending"),
            Self::Earliest => json!("earliest"),
            Self::Safe => json!("safe"),
            Self::Finalized => json!("finalized"),
            Self::Number(n) => json!(to_quantity(*n)),
        }
    }
}

impl From<u64> for BlockNumber {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

/// `0x`-prefixed hex quantity.
pub fn to_quantity(n: u64) -> String {
    format!("{n:#x}")
}

pub fn parse_quantity(s: &str) -> Result<u64, RpcError> {
    let digits = strip_hex(s)?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| RpcError::Deserialization(format!("bad quantity {s:?}: {e}")))
}

pub fn parse_quantity_u128(s: &str) -> Result<u128, RpcError> {
    let digits = strip_hex(s)?;
    u128::from_str_radix(digits, 16)
        .map_err(|e| RpcError::Deserialization(format!("bad quantity {s:?}: {e}")))
}

fn strip_hex(s: &str) -> Result<&str, RpcError> {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .filter(|d| !d.is_empty())
        .ok_or_else(|| RpcError::Deserialization(format!("not a hex quantity: {s:?}")))
}

fn quantity_of(value: &Value) -> Result<u64, RpcError> {
    value
        .as_str()
        .ok_or_else(|| RpcError::Deserialization(format!("expected hex string, got {value}")))
        .and_then(parse_quantity)
}

/// The fields of a block header the subscriber needs, plus the raw object.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: Option<String>,
    pub parent_hash: Option<String>,
    pub timestamp: Option<u64>,
    pub raw: Value,
}

impl BlockHeader {
    pub fn from_value(raw: Value) -> Result<Self, RpcError> {
        let number = raw
            .get("number")
            .ok_or_else(|| RpcError::Deserialization("block has no number".into()))
            .and_then(quantity_of)?;
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);
        let timestamp = match raw.get("timestamp") {
            Some(ts) => Some(quantity_of(ts)?),
            None => None,
        };
        Ok(Self {
            number,
            hash: text("hash"),
            parent_hash: text("parentHash"),
            timestamp,
            raw,
        })
    }
}

/// Transaction-shaped argument of `eth_call` and `eth_estimateGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<String>,
    pub to: String,
    pub data: String,
    pub gas: Option<u64>,
    pub value: Option<u128>,
}

impl CallRequest {
    pub fn new(to: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn to_param(&self) -> Value {
        let mut obj = Map::new();
        if let Some(from) = &self.from {
            obj.insert("from".into(), json!(from));
        }
        obj.insert("to".into(), json!(self.to));
        obj.insert("data".into(), json!(self.data));
        if let Some(gas) = self.gas {
            obj.insert("gas".into(), json!(to_quantity(gas)));
        }
        if let Some(value) = self.value {
            obj.insert("value".into(), json!(format!("{value:#x}")));
        }
        Value::Object(obj)
    }
}

impl RpcClient {
    pub fn block_number(&self) -> RpcResult<u64> {
        self.request("eth_blockNumber", vec![])
            .try_map(|v| quantity_of(&v))
    }

    pub fn chain_id(&self) -> RpcResult<u64> {
        self.request("eth_chainId", vec![]).try_map(|v| quantity_of(&v))
    }

    pub fn gas_price(&self) -> RpcResult<u128> {
        self.request("eth_gasPrice", vec![]).try_map(|v| {
            v.as_str()
                .ok_or_else(|| RpcError::Deserialization(format!("expected hex string, got {v}")))
                .and_then(parse_quantity_u128)
        })
    }

    /// `None` when the node does not know the block yet.
    pub fn get_block_by_number(&self, block: BlockNumber, full: bool) -> RpcResult<Option<Value>> {
        self.request("eth_getBlockByNumber", vec![block.to_param(), json!(full)])
            .map(non_null)
    }

    pub fn get_block_by_hash(&self, hash: &str, full: bool) -> RpcResult<Option<Value>> {
        self.request("eth_getBlockByHash", vec![json!(hash), json!(full)])
            .map(non_null)
    }

    pub fn get_block_header(&self, block: BlockNumber) -> RpcResult<Option<BlockHeader>> {
        self.get_block_by_number(block, false)
            .try_map(|block| block.map(BlockHeader::from_value).transpose())
    }

    /// Returns the raw hex return data.
    pub fn call(&self, call: &CallRequest, block: BlockNumber) -> RpcResult<String> {
        self.request_as("eth_call", vec![call.to_param(), block.to_param()])
    }

    pub fn estimate_gas(&self, call: &CallRequest) -> RpcResult<u64> {
        self.request("eth_estimateGas", vec![call.to_param()])
            .try_map(|v| quantity_of(&v))
    }

    pub fn get_logs(&self, filter: Value) -> RpcResult<Vec<Value>> {
        self.request_as("eth_getLogs", vec![filter])
    }

    /// Returns the transaction hash.
    pub fn send_raw_transaction(&self, raw_tx: &str) -> RpcResult<String> {
        self.request_as("eth_sendRawTransaction", vec![json!(raw_tx)])
    }

    /// One-shot `eth_subscribe`. The subscription dies with the connection;
    /// use [`BlockSubscriber`](crate::BlockSubscriber) for one that survives
    /// failover.
    pub fn subscribe(&self, kind: &str, address: Option<&str>, topics: Vec<Value>) -> RpcResult<String> {
        let mut params = vec![json!(kind)];
        if address.is_some() || !topics.is_empty() {
            let mut filter = Map::new();
            if let Some(address) = address {
                filter.insert("address".into(), json!(address));
            }
            if !topics.is_empty() {
                filter.insert("topics".into(), Value::Array(topics));
            }
            params.push(Value::Object(filter));
        }
        self.request_as("eth_subscribe", params)
    }

    pub fn unsubscribe(&self, subscription_id: &str) -> RpcResult<bool> {
        self.request_as("eth_unsubscribe", vec![json!(subscription_id)])
    }
}

fn non_null(v: Value) -> Option<Value> {
    if v.is_null() {
        None
    } else {
        Some(v)
    }
}
