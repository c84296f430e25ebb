//! Error types, one enum per concern.
//!
//! - [`TransportError`] describes a broken connection. The client recovers from
//!   it by failing over, so request callers never observe it.
//! - [`RpcError`] is what an [`RpcResult`](crate::RpcResult) fails with.
//! - [`DecodeError`] marks an incoming frame that could not be routed.
//! - [`ConfigError`] is fatal and raised while building endpoints or clients.

use thiserror::Error;

use crate::wire::JsonRpcError;

/// A fault on a single connection.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, non-2xx status, timeout).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket handshake, send or receive failed.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Unix socket connect, read or write failed.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The remote side closed the session.
    #[error("Connection closed by peer")]
    Closed,

    /// No connection type is available for this endpoint on this platform.
    #[error("Unsupported transport for {url}")]
    Unsupported { url: String },
}

/// Terminal outcome of a failed request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    /// JSON-RPC error object returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The result was cancelled before a response arrived.
    #[error("Request cancelled")]
    Cancelled,

    /// A bounded wait elapsed. The result itself is still pending.
    #[error("Timed out after {ms}ms waiting for result")]
    Timeout { ms: u64 },

    /// The response could not be converted into the requested type.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl RpcError {
    /// Returns `true` if the node rejected the request.
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Deserialization(e.to_string())
    }
}

/// An incoming frame element that cannot be routed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message has no `{0}` field")]
    MissingField(&'static str),

    #[error("response {id} carries neither result nor error")]
    Unroutable { id: String },
}

/// Invalid endpoint or client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An endpoint pool needs at least one endpoint.
    #[error("endpoint pool is empty")]
    EmptyPool,

    /// URL-key authorization was configured for a URL without the token.
    #[error("URL {url} does not contain the {{API_KEY}} token")]
    MissingApiKeyToken { url: String },

    /// The transport could not be inferred from the URL scheme.
    #[error("cannot infer transport from URL {url}")]
    UnknownTransport { url: String },

    /// The client was created outside a Tokio runtime.
    #[error("no Tokio runtime available")]
    NoRuntime,
}
