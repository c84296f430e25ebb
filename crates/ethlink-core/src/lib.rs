//! ethlink-core — foundation types for the ethlink JSON-RPC client.
//!
//! # Overview
//!
//! ethlink talks JSON-RPC to one or more Ethereum nodes, fails over between
//! them and replays in-flight requests on the new connection. The core crate
//! defines:
//!
//! - [`wire`] — JSON-RPC 2.0 requests, responses, notifications and frame decoding
//! - [`Endpoint`] / [`EndpointPool`] — node descriptions and round-robin rotation
//! - [`RpcResult`] — single-assignment async result (blocking, callback or `.await`)
//! - [`Connection`] / [`Connector`] — the seam every transport implements
//! - [`outbox`] — shared send pacing (cooldown and batching)
//! - [`policy`] — reconnect backoff and request cooldown
//! - [`config`] — serde configuration structs

pub mod chain;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod outbox;
pub mod policy;
pub mod pool;
pub mod result;
pub mod wire;

pub use chain::{Chain, Currency};
pub use config::{ClientConfig, EndpointConfig, NetworkConfig};
pub use connection::{Connection, ConnectionHandler, ConnectionState, Connector, StateCell};
pub use endpoint::{Authorization, Endpoint, EndpointSettings, TransportKind, UrlApiKey};
pub use error::{ConfigError, DecodeError, RpcError, TransportError};
pub use outbox::{Outbox, OutboxConfig};
pub use pool::EndpointPool;
pub use result::RpcResult;
pub use wire::{Incoming, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RpcId};
