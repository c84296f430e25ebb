//! ethlink-ws — WebSocket transport for ethlink.
//!
//! # Features
//! - Non-blocking dial; frames queue until the handshake completes
//! - Request multiplexing over a single socket
//! - Subscription pushes delivered through the same handler as responses
//! - Peer close and socket errors reported once, then the connection is dead

pub mod connection;

pub use connection::WsConnection;
