//! ethlink-client — failover JSON-RPC client for Ethereum nodes.
//!
//! # Features
//! - One live connection at a time, rotated through an [`EndpointPool`] on error or close
//! - Pending requests replayed under their original ids on the new endpoint
//! - Responses matched by id, in any order; node errors fail only their own request
//! - [`BlockSubscriber`]: `newHeads` push with automatic fallback to polling
//! - Typed `eth_*` helpers and a table-driven [`ContractDispatcher`]
//!
//! # Example
//!
//! ```rust,no_run
//! use ethlink_client::{BlockSubscriber, RpcClient};
//! use ethlink_core::{Endpoint, EndpointPool};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = EndpointPool::new(vec![
//!     Endpoint::new("wss://ethereum-rpc.publicnode.com"),
//!     Endpoint::new("https://eth.llamarpc.com"),
//! ])?;
//! let client = RpcClient::new(pool)?;
//!
//! let head = client.block_number().await?;
//! println!("head: {head}");
//!
//! let blocks = BlockSubscriber::new(client.clone());
//! blocks.on_block(|header| println!("block {}", header.number));
//! # Ok(())
//! # }
//! ```
//!
//! [`EndpointPool`]: ethlink_core::EndpointPool

pub mod client;
pub mod connector;
pub mod contract;
pub mod eth;
pub mod pending;
pub mod subscriber;

pub use client::RpcClient;
pub use connector::TransportConnector;
pub use contract::{
    AbiCodec, CallExecutor, CapturedCall, CapturingExecutor, ContractDispatcher, DispatchOutcome,
    MethodDescriptor, PreparedCall, RpcExecutor,
};
pub use eth::{BlockHeader, BlockNumber, CallRequest};
pub use pending::DurableRequest;
pub use subscriber::{BlockSubscriber, ConsumerId, SubscriptionMode};
