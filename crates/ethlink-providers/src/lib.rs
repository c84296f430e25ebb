//! ethlink-providers — ready-made endpoints for common RPC providers.
//!
//! Keyed providers return URL templates with an `{API_KEY}` placeholder and
//! attach the key as an authorization, so logs only ever show the template.
//!
//! # Quick start
//! ```rust,no_run
//! use ethlink_core::EndpointPool;
//! use ethlink_providers::{alchemy, PublicNode};
//!
//! let mut endpoints = vec![PublicNode::Ethereum.endpoint()];
//! endpoints.extend(alchemy::ws("YOUR_API_KEY", 1));
//! let pool = EndpointPool::new(endpoints).unwrap();
//! ```

pub mod alchemy;
pub mod infura;
pub mod publicnode;

pub use publicnode::PublicNode;
