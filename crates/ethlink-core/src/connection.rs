//! Connection traits: the seam between the RPC client and its transports.
//!
//! A [`Connector`] opens a [`Connection`] to an endpoint and wires it to a
//! [`ConnectionHandler`]. Connections are single-use: once closed they are
//! never reopened, the client opens a fresh one instead.

use std::sync::{Arc, Mutex};

use crate::endpoint::Endpoint;
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Shared, monotonic connection state. Once `Closed` it never changes again.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<Mutex<ConnectionState>>);

impl StateCell {
    pub fn new(initial: ConnectionState) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    pub fn get(&self) -> ConnectionState {
        *self.0.lock().unwrap()
    }

    /// Move to `next` unless already closed. Returns `false` if closed.
    pub fn set(&self, next: ConnectionState) -> bool {
        let mut state = self.0.lock().unwrap();
        if *state == ConnectionState::Closed {
            return false;
        }
        *state = next;
        true
    }

    /// Mark closed. Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let mut state = self.0.lock().unwrap();
        let was_open = *state != ConnectionState::Closed;
        *state = ConnectionState::Closed;
        was_open
    }
}

/// One live session to one endpoint.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; `send` is called from arbitrary
/// threads and must never block on I/O. Neither `send` nor `close` may call
/// into the handler before returning.
pub trait Connection: Send + Sync + 'static {
    fn endpoint(&self) -> &Endpoint;

    fn state(&self) -> ConnectionState;

    /// Queue an encoded frame. Failures surface through the handler.
    fn send(&self, payload: String);

    /// Close without notifying the handler.
    fn close(&self);
}

/// Receives a connection's events. Callbacks run on the connection's task.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn on_message(&self, text: &str);

    fn on_error(&self, error: TransportError);

    /// The peer ended the session.
    fn on_closed(&self);
}

/// Opens connections. Must not block: a returned connection may still be
/// `Connecting`, and queues sends until it is open. Handler events are
/// delivered from the connection's own task, never from inside `connect`.
pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        endpoint: &Endpoint,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Arc<dyn Connection>, TransportError>;
}
