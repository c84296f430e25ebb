//! ethlink-ipc — Unix domain socket transport for ethlink.
//!
//! Only available on Unix; elsewhere [`connect`] reports the endpoint as
//! unsupported so the client fails over to the next one.

#[cfg(unix)]
pub mod connection;

#[cfg(unix)]
pub use connection::IpcConnection;

use std::sync::Arc;

use ethlink_core::connection::{Connection, ConnectionHandler};
use ethlink_core::endpoint::Endpoint;
use ethlink_core::error::TransportError;

/// Open an IPC connection on the current runtime.
pub fn connect(
    endpoint: &Endpoint,
    handler: Arc<dyn ConnectionHandler>,
) -> Result<Arc<dyn Connection>, TransportError> {
    #[cfg(unix)]
    {
        let conn: Arc<dyn Connection> = IpcConnection::open(endpoint, handler)?;
        Ok(conn)
    }
    #[cfg(not(unix))]
    {
        let _ = handler;
        Err(TransportError::Unsupported {
            url: endpoint.label().to_string(),
        })
    }
}
