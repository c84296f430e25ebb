//! HTTP JSON-RPC connection backed by `reqwest`.
//!
//! Every frame leaving the outbox becomes one POST. Posts run concurrently,
//! so responses may reach the handler out of order; the client correlates
//! them by id.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ethlink_core::connection::{Connection, ConnectionHandler, ConnectionState, StateCell};
use ethlink_core::endpoint::Endpoint;
use ethlink_core::error::TransportError;
use ethlink_core::outbox::{Outbox, OutboxConfig};

pub struct HttpConnection {
    endpoint: Endpoint,
    state: StateCell,
    outbox: Outbox,
    writer: JoinHandle<()>,
}

impl HttpConnection {
    /// Build the HTTP client and start the writer on the current runtime.
    ///
    /// HTTP has no session to establish, so the connection is open at once.
    pub fn open(
        endpoint: &Endpoint,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Arc<Self>, TransportError> {
        let timeout = endpoint.settings().request_timeout;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let (outbox, frames) = Outbox::spawn(OutboxConfig::from_settings(endpoint.settings()));
        let state = StateCell::new(ConnectionState::Open);
        let writer = tokio::spawn(write_loop(
            http,
            endpoint.url().to_string(),
            timeout,
            frames,
            handler,
            state.clone(),
        ));

        tracing::debug!(url = %endpoint.label(), "HTTP connection ready");
        Ok(Arc::new(Self {
            endpoint: endpoint.clone(),
            state,
            outbox,
            writer,
        }))
    }
}

impl Connection for HttpConnection {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn send(&self, payload: String) {
        if self.state.get() == ConnectionState::Closed || !self.outbox.push(payload) {
            tracing::debug!(url = %self.endpoint.label(), "send on closed HTTP connection dropped");
        }
    }

    fn close(&self) {
        if self.state.close() {
            self.writer.abort();
        }
    }
}

impl Drop for HttpConnection {
    fn drop(&mut self) {
        self.writer.abort();
    }
}

async fn write_loop(
    http: reqwest::Client,
    url: String,
    timeout: Option<Duration>,
    mut frames: mpsc::UnboundedReceiver<String>,
    handler: Arc<dyn ConnectionHandler>,
    state: StateCell,
) {
    while let Some(frame) = frames.recv().await {
        let http = http.clone();
        let url = url.clone();
        let handler = handler.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let outcome = post(&http, &url, timeout, frame).await;
            if state.get() == ConnectionState::Closed {
                return;
            }
            match outcome {
                Ok(body) => handler.on_message(&body),
                Err(e) => {
                    tracing::warn!(error = %e, "HTTP request failed");
                    handler.on_error(e);
                }
            }
        });
    }
}

async fn post(
    http: &reqwest::Client,
    url: &str,
    timeout: Option<Duration>,
    body: String,
) -> Result<String, TransportError> {
    let resp = http
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .map_err(|e| map_reqwest_error(e, timeout))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(TransportError::Http(format!("HTTP {status}: {body}")));
    }

    resp.text()
        .await
        .map_err(|e| map_reqwest_error(e, timeout))
}

fn map_reqwest_error(e: reqwest::Error, timeout: Option<Duration>) -> TransportError {
    match timeout {
        Some(t) if e.is_timeout() => TransportError::Timeout {
            ms: t.as_millis() as u64,
        },
        _ => TransportError::Http(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethlink_core::endpoint::EndpointSettings;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Debug)]
    enum Event {
        Message(String),
        Error(TransportError),
        Closed,
    }

    struct Recorder(mpsc::UnboundedSender<Event>);

    impl ConnectionHandler for Recorder {
        fn on_message(&self, text: &str) {
            let _ = self.0.send(Event::Message(text.to_string()));
        }
        fn on_error(&self, error: TransportError) {
            let _ = self.0.send(Event::Error(error));
        }
        fn on_closed(&self) {
            let _ = self.0.send(Event::Closed);
        }
    }

    fn recorder() -> (Arc<dyn ConnectionHandler>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Recorder(tx)), rx)
    }

    /// Accept one request, hand its body back, reply with `status` and `body`.
    async fn serve_once(listener: TcpListener, status: &'static str, body: &'static str) -> String {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let request_body = loop {
            let n = sock.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(idx) = text.find("\r\n\r\n") {
                let len = text[..idx]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= idx + 4 + len {
                    break text[idx + 4..idx + 4 + len].to_string();
                }
            }
            assert!(n > 0, "client hung up early");
        };
        let resp = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        sock.write_all(resp.as_bytes()).await.unwrap();
        request_body
    }

    async fn local_endpoint() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        (listener, Endpoint::new(url))
    }

    #[tokio::test]
    async fn post_delivers_body_to_handler() {
        let (listener, endpoint) = local_endpoint().await;
        let server = tokio::spawn(serve_once(
            listener,
            "200 OK",
            r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#,
        ));

        let (handler, mut events) = recorder();
        let conn = HttpConnection::open(&endpoint, handler).unwrap();
        assert_eq!(conn.state(), ConnectionState::Open);
        conn.send(r#"{"jsonrpc":"2.0","id":1,"method":"eth_blockNumber","params":[]}"#.into());

        let posted = server.await.unwrap();
        let posted: serde_json::Value = serde_json::from_str(&posted).unwrap();
        assert_eq!(posted["method"], "eth_blockNumber");

        match events.recv().await.unwrap() {
            Event::Message(body) => assert!(body.contains("0x10")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_reaches_on_error() {
        let (listener, endpoint) = local_endpoint().await;
        tokio::spawn(serve_once(listener, "503 Service Unavailable", "busy"));

        let (handler, mut events) = recorder();
        let conn = HttpConnection::open(&endpoint, handler).unwrap();
        conn.send("{}".into());

        match events.recv().await.unwrap() {
            Event::Error(TransportError::Http(msg)) => assert!(msg.contains("503")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_reaches_on_error() {
        let (listener, endpoint) = local_endpoint().await;
        drop(listener);

        let (handler, mut events) = recorder();
        let conn = HttpConnection::open(
            &endpoint.with_settings(EndpointSettings {
                request_timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            }),
            handler,
        )
        .unwrap();
        conn.send("{}".into());

        assert!(matches!(events.recv().await.unwrap(), Event::Error(_)));
    }

    #[tokio::test]
    async fn closed_connection_stays_closed() {
        let (_listener, endpoint) = local_endpoint().await;
        let (handler, _events) = recorder();
        let conn = HttpConnection::open(&endpoint, handler).unwrap();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        conn.send("{}".into());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
