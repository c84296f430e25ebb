//! ethlink-http — HTTP transport for ethlink.
//!
//! One POST per outgoing frame, with the endpoint's cooldown, batch window
//! and request timeout applied.

pub mod connection;

pub use connection::HttpConnection;
