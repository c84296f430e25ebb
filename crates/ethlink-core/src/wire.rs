//! JSON-RPC 2.0 wire types and frame decoding.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::error::DecodeError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of server-pushed subscription events.
pub const SUBSCRIPTION_METHOD: &str = "eth_subscription";

/// JSON-RPC response ID — string, number, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    String(String),
    Null,
}

impl RpcId {
    /// Numeric value used for routing. Some nodes echo ids back as strings.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.parse().ok(),
            Self::Null => None,
        }
    }
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A JSON-RPC 2.0 request. Ids are allocated by the client and never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            method: method.into(),
            params,
        }
    }

    /// Serialize to the text sent on the wire.
    pub fn encode(&self) -> String {
        json!({
            "jsonrpc": self.jsonrpc,
            "id": self.id,
            "method": self.method,
            "params": self.params,
        })
        .to_string()
    }
}

/// Encode several requests as one JSON array.
pub fn encode_batch(requests: &[JsonRpcRequest]) -> String {
    let frames: Vec<String> = requests.iter().map(JsonRpcRequest::encode).collect();
    join_batch(&frames)
}

/// Join already-encoded request texts into one batch frame.
pub fn join_batch(frames: &[String]) -> String {
    format!("[{}]", frames.join(","))
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 response.
///
/// `result` is `Some(Value::Null)` when the node sent `"result": null`, and
/// `None` only when the field is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: RpcId,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

impl JsonRpcResponse {
    /// Returns `true` if this is a successful response (has result, no error).
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.result.is_some()
    }

    /// Unwrap the result value or return the node's error.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

/// Any incoming object carrying a `method` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Payload of an `eth_subscription` notification.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionEvent {
    pub subscription: String,
    pub result: Value,
}

impl JsonRpcNotification {
    /// Extract `{subscription, result}` if this is an `eth_subscription` push.
    pub fn subscription_event(&self) -> Option<SubscriptionEvent> {
        if self.method != SUBSCRIPTION_METHOD {
            return None;
        }
        let subscription = self.params.get("subscription")?.as_str()?.to_string();
        let result = self.params.get("result").cloned().unwrap_or(Value::Null);
        Some(SubscriptionEvent {
            subscription,
            result,
        })
    }
}

/// A routable incoming message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

/// Decode an incoming frame: a single object or a batch array.
///
/// Each batch element is classified on its own, so one bad element does not
/// drop its siblings.
pub fn decode(text: &str) -> Vec<Result<Incoming, DecodeError>> {
    match serde_json::from_str::<Value>(text) {
        Err(e) => vec![Err(DecodeError::Json(e))],
        Ok(Value::Array(items)) => items.into_iter().map(classify).collect(),
        Ok(value) => vec![classify(value)],
    }
}

fn classify(value: Value) -> Result<Incoming, DecodeError> {
    let (has_method, has_id) = match &value {
        Value::Object(obj) => (obj.contains_key("method"), obj.contains_key("id")),
        _ => return Err(DecodeError::NotAnObject),
    };

    if has_method {
        return Ok(Incoming::Notification(serde_json::from_value(value)?));
    }
    if !has_id {
        return Err(DecodeError::MissingField("id"));
    }

    let resp: JsonRpcResponse = serde_json::from_value(value)?;
    if resp.result.is_none() && resp.error.is_none() {
        return Err(DecodeError::Unroutable {
            id: resp.id.to_string(),
        });
    }
    Ok(Incoming::Response(resp))
}
