//! WebSocket JSON-RPC connection.
//!
//! A background task owns the socket. It dials the endpoint, then multiplexes
//! paced outbound frames and inbound messages until either side closes. The
//! connection is never redialed; the client opens a new one on failover.

use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use ethlink_core::connection::{Connection, ConnectionHandler, ConnectionState, StateCell};
use ethlink_core::endpoint::Endpoint;
use ethlink_core::error::TransportError;
use ethlink_core::outbox::{Outbox, OutboxConfig};

pub struct WsConnection {
    endpoint: Endpoint,
    state: StateCell,
    outbox: Outbox,
    close_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl WsConnection {
    /// Start dialing `endpoint` on the current runtime.
    ///
    /// Returns immediately in `Connecting`; frames sent before the handshake
    /// completes are queued.
    pub fn open(
        endpoint: &Endpoint,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Arc<Self>, TransportError> {
        let (outbox, frames) = Outbox::spawn(OutboxConfig::from_settings(endpoint.settings()));
        let (close_tx, close_rx) = oneshot::channel();
        let state = StateCell::new(ConnectionState::Connecting);

        tokio::spawn(ws_task(
            endpoint.clone(),
            frames,
            close_rx,
            handler,
            state.clone(),
        ));

        Ok(Arc::new(Self {
            endpoint: endpoint.clone(),
            state,
            outbox,
            close_tx: Mutex::new(Some(close_tx)),
        }))
    }
}

impl Connection for WsConnection {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn send(&self, payload: String) {
        if self.state.get() == ConnectionState::Closed || !self.outbox.push(payload) {
            tracing::debug!(url = %self.endpoint.label(), "send on closed WS connection dropped");
        }
    }

    fn close(&self) {
        if self.state.close() {
            if let Some(tx) = self.close_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        }
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Why the dispatch loop ended.
enum Exit {
    Local,
    Remote,
    Failed(TransportError),
}

async fn ws_task(
    endpoint: Endpoint,
    mut frames: mpsc::UnboundedReceiver<String>,
    mut close_rx: oneshot::Receiver<()>,
    handler: Arc<dyn ConnectionHandler>,
    state: StateCell,
) {
    tracing::info!(url = %endpoint.label(), "connecting via WebSocket");

    let ws_stream = tokio::select! {
        _ = &mut close_rx => return,
        conn = tokio_tungstenite::connect_async(endpoint.url()) => match conn {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                tracing::warn!(error = %e, url = %endpoint.label(), "WS connect failed");
                if state.close() {
                    handler.on_error(TransportError::WebSocket(e.to_string()));
                }
                return;
            }
        },
    };

    if !state.set(ConnectionState::Open) {
        return;
    }
    tracing::debug!(url = %endpoint.label(), "WS connected");

    let (mut sink, mut stream) = ws_stream.split();

    let exit = loop {
        tokio::select! {
            _ = &mut close_rx => {
                let _ = sink.send(Message::Close(None)).await;
                break Exit::Local;
            }
            frame = frames.recv() => {
                let Some(frame) = frame else { break Exit::Local };
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    break Exit::Failed(TransportError::WebSocket(e.to_string()));
                }
            }
            msg = stream.next() => {
                match msg {
                    None => break Exit::Remote,
                    Some(Err(e)) => break Exit::Failed(TransportError::WebSocket(e.to_string())),
                    Some(Ok(Message::Text(text))) => handler.on_message(text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => handler.on_message(text),
                        Err(_) => tracing::debug!("ignoring non-UTF-8 binary WS frame"),
                    },
                    Some(Ok(Message::Close(_))) => break Exit::Remote,
                    _ => {}
                }
            }
        }
    };

    // a local close already moved the state and must stay silent
    if !state.close() {
        return;
    }
    match exit {
        Exit::Local => {}
        Exit::Remote => {
            tracing::warn!(url = %endpoint.label(), "WS closed by peer");
            handler.on_closed();
        }
        Exit::Failed(e) => {
            tracing::warn!(error = %e, url = %endpoint.label(), "WS connection failed");
            handler.on_error(e);
        }
    }
}
