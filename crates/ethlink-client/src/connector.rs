//! Picks a transport by endpoint kind.

use std::sync::Arc;

use ethlink_core::connection::{Connection, ConnectionHandler, Connector};
use ethlink_core::endpoint::{Endpoint, TransportKind};
use ethlink_core::error::TransportError;
use ethlink_http::HttpConnection;
use ethlink_ws::WsConnection;

/// Connector over the HTTP, WebSocket and IPC transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportConnector;

impl Connector for TransportConnector {
    fn connect(
        &self,
        endpoint: &Endpoint,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        let kind = endpoint
            .transport()
            .map_err(|_| TransportError::Unsupported {
                url: endpoint.label().to_string(),
            })?;

        tracing::debug!(url = %endpoint.label(), transport = %kind, "opening connection");
        let conn: Arc<dyn Connection> = match kind {
            TransportKind::Http => HttpConnection::open(endpoint, handler)?,
            TransportKind::WebSocket => WsConnection::open(endpoint, handler)?,
            TransportKind::Ipc => ethlink_ipc::connect(endpoint, handler)?,
        };
        Ok(conn)
    }
}
