//! Unix domain socket JSON-RPC connection (geth-style `.ipc` endpoints).
//!
//! The socket carries bare JSON values back to back with no framing, so the
//! reader buffers bytes and peels off complete values as they arrive.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};

use ethlink_core::connection::{Connection, ConnectionHandler, ConnectionState, StateCell};
use ethlink_core::endpoint::Endpoint;
use ethlink_core::error::TransportError;
use ethlink_core::outbox::{Outbox, OutboxConfig};

const READ_CHUNK: usize = 16 * 1024;

pub struct IpcConnection {
    endpoint: Endpoint,
    state: StateCell,
    outbox: Outbox,
    close_tx: Mutex<Option<oneshot::Sender<()>>>,
}

/// Socket path for an `ipc://` URL or a bare absolute path.
pub fn socket_path(url: &str) -> PathBuf {
    PathBuf::from(url.strip_prefix("ipc://").unwrap_or(url))
}

impl IpcConnection {
    pub fn open(
        endpoint: &Endpoint,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Arc<Self>, TransportError> {
        let (outbox, frames) = Outbox::spawn(OutboxConfig::from_settings(endpoint.settings()));
        let (close_tx, close_rx) = oneshot::channel();
        let state = StateCell::new(ConnectionState::Connecting);

        tokio::spawn(ipc_task(
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

impl Connection for IpcConnection {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn send(&self, payload: String) {
        if self.state.get() == ConnectionState::Closed || !self.outbox.push(payload) {
            tracing::debug!(url = %self.endpoint.label(), "send on closed IPC connection dropped");
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

impl Drop for IpcConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Split complete JSON values off the front of `buf`.
///
/// Returns the values and leaves any trailing partial value in `buf`.
pub(crate) fn drain_values(buf: &mut Vec<u8>) -> Result<Vec<Value>, serde_json::Error> {
    let mut values = Vec::new();
    let mut consumed = 0;
    {
        let mut iter = serde_json::Deserializer::from_slice(&buf[..]).into_iter::<Value>();
        loop {
            match iter.next() {
                Some(Ok(value)) => {
                    values.push(value);
                    consumed = iter.byte_offset();
                }
                Some(Err(e)) if e.is_eof() => break,
                Some(Err(e)) => return Err(e),
                None => {
                    consumed = buf.len();
                    break;
                }
            }
        }
    }
    buf.drain(..consumed);
    Ok(values)
}

async fn ipc_task(
    endpoint: Endpoint,
    mut frames: mpsc::UnboundedReceiver<String>,
    mut close_rx: oneshot::Receiver<()>,
    handler: Arc<dyn ConnectionHandler>,
    state: StateCell,
) {
    let path = socket_path(endpoint.url());
    tracing::info!(path = %path.display(), "connecting via IPC");

    let stream = tokio::select! {
        _ = &mut close_rx => return,
        conn = UnixStream::connect(&path) => match conn {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "IPC connect failed");
                if state.close() {
                    handler.on_error(TransportError::Ipc(e.to_string()));
                }
                return;
            }
        },
    };

    if !state.set(ConnectionState::Open) {
        return;
    }

    let (mut reader, mut writer) = stream.into_split();
    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];

    let failure = loop {
        tokio::select! {
            _ = &mut close_rx => break None,
            frame = frames.recv() => {
                let Some(frame) = frame else { break None };
                if let Err(e) = writer.write_all(frame.as_bytes()).await {
                    break Some(TransportError::Ipc(e.to_string()));
                }
            }
            read = reader.read(&mut chunk) => {
                match read {
                    Ok(0) => break Some(TransportError::Closed),
                    Ok(n) => {
                        buf.extend_from_slice(&chunk[..n]);
                        match drain_values(&mut buf) {
                            Ok(values) => {
                                for value in values {
                                    handler.on_message(&value.to_string());
                                }
                            }
                            Err(e) => break Some(TransportError::Ipc(format!("malformed stream: {e}"))),
                        }
                    }
                    Err(e) => break Some(TransportError::Ipc(e.to_string())),
                }
            }
        }
    };

    if !state.close() {
        return;
    }
    match failure {
        None => {}
        Some(TransportError::Closed) => {
            tracing::warn!(path = %path.display(), "IPC socket closed by peer");
            handler.on_closed();
        }
        Some(e) => {
            tracing::warn!(error = %e, path = %path.display(), "IPC connection failed");
            handler.on_error(e);
        }
    }
}
