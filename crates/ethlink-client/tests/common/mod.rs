//! In-memory connector for client tests.
//!
//! Every `connect` creates a [`MockConnection`] that records the frames it is
//! sent. Tests push responses and faults into a connection directly, or
//! install a [`Responder`] that answers requests from a spawned task.

#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::runtime::Handle;

use ethlink_core::config::ClientConfig;
use ethlink_core::connection::{Connection, ConnectionHandler, ConnectionState, Connector, StateCell};
use ethlink_core::endpoint::{Endpoint, EndpointSettings};
use ethlink_core::error::TransportError;
use ethlink_core::pool::EndpointPool;
use ethlink_client::RpcClient;

/// Answer to one request: `Some(Ok(result))`, `Some(Err((code, message)))`,
/// or `None` to stay silent.
pub type Reply = Option<Result<Value, (i64, String)>>;

/// `(endpoint url, method, params) -> reply`
pub type Responder = Arc<dyn Fn(&str, &str, &Value) -> Reply + Send + Sync>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ─── Connector ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockConnector {
    attempts: Mutex<Vec<String>>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    refused: Mutex<HashSet<String>>,
    responder: Mutex<Option<Responder>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_responder<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&str, &str, &Value) -> Reply + Send + Sync + 'static,
    {
        let connector = Self::new();
        *connector.responder.lock().unwrap() = Some(Arc::new(responder));
        connector
    }

    /// Make `connect` fail for `url`.
    pub fn refuse(&self, url: &str) {
        self.refused.lock().unwrap().insert(url.to_string());
    }

    /// Every URL `connect` was called with, refused ones included.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections.lock().unwrap().clone()
    }

    pub fn connection(&self, index: usize) -> Arc<MockConnection> {
        self.connections.lock().unwrap()[index].clone()
    }

    pub fn latest(&self) -> Arc<MockConnection> {
        self.connections
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection opened")
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        endpoint: &Endpoint,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        self.attempts.lock().unwrap().push(endpoint.url().to_string());
        if self.refused.lock().unwrap().contains(endpoint.url()) {
            return Err(TransportError::WebSocket("connection refused".into()));
        }
        let conn = Arc::new(MockConnection {
            endpoint: endpoint.clone(),
            state: StateCell::new(ConnectionState::Open),
            handler,
            sent: Mutex::new(Vec::new()),
            responder: self.responder.lock().unwrap().clone(),
            runtime: Handle::current(),
        });
        self.connections.lock().unwrap().push(conn.clone());
        Ok(conn)
    }
}

// ─── Connection ───────────────────────────────────────────────────────────────

pub struct MockConnection {
    endpoint: Endpoint,
    state: StateCell,
    handler: Arc<dyn ConnectionHandler>,
    sent: Mutex<Vec<Value>>,
    responder: Option<Responder>,
    runtime: Handle,
}

impl MockConnection {
    pub fn url(&self) -> &str {
        self.endpoint.url()
    }

    /// Every request frame sent on this connection, in order.
    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_ids(&self) -> Vec<u64> {
        self.sent().iter().filter_map(|r| r["id"].as_u64()).collect()
    }

    pub fn sent_methods(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|r| r["method"].as_str().map(str::to_string))
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.sent_methods().iter().filter(|m| *m == method).count()
    }

    /// Id of the last request sent for `method`.
    pub fn id_of(&self, method: &str) -> Option<u64> {
        self.sent()
            .iter()
            .rev()
            .find(|r| r["method"] == method)
            .and_then(|r| r["id"].as_u64())
    }

    /// Hand `message` to the client as if it came off the wire.
    pub fn deliver(&self, message: Value) {
        self.handler.on_message(&message.to_string());
    }

    /// Simulate a transport error.
    pub fn fail(&self) {
        if self.state.close() {
            self.handler
                .on_error(TransportError::WebSocket("connection reset".into()));
        }
    }

    /// Report an error even if this connection is already closed, as a late
    /// event from a replaced connection would.
    pub fn late_error(&self) {
        self.handler
            .on_error(TransportError::WebSocket("late error".into()));
    }

    /// Simulate the peer closing the session.
    pub fn close_by_peer(&self) {
        if self.state.close() {
            self.handler.on_closed();
        }
    }
}

impl Connection for MockConnection {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn send(&self, payload: String) {
        if self.state.get() == ConnectionState::Closed {
            return;
        }
        let request: Value = serde_json::from_str(&payload).expect("client sent invalid JSON");
        self.sent.lock().unwrap().push(request.clone());

        let Some(responder) = &self.responder else {
            return;
        };
        let method = request["method"].as_str().unwrap_or_default();
        let Some(reply) = responder(self.endpoint.url(), method, &request["params"]) else {
            return;
        };
        let message = match reply {
            Ok(result) => ok(&request["id"], result),
            Err((code, msg)) => err(&request["id"], code, &msg),
        };

        let handler = self.handler.clone();
        let state = self.state.clone();
        self.runtime.spawn(async move {
            if state.get() != ConnectionState::Closed {
                handler.on_message(&message.to_string());
            }
        });
    }

    fn close(&self) {
        self.state.close();
    }
}

// ─── Messages ─────────────────────────────────────────────────────────────────

pub fn ok(id: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

pub fn err(id: &Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

pub fn new_head(subscription: &str, number: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "eth_subscription",
        "params": {
            "subscription": subscription,
            "result": block(number),
        }
    })
}

pub fn block(number: u64) -> Value {
    json!({
        "number": format!("{number:#x}"),
        "hash": format!("0x{number:064x}"),
        "parentHash": format!("0x{:064x}", number.saturating_sub(1)),
        "timestamp": format!("{:#x}", 1_700_000_000 + number * 12),
    })
}

// ─── Setup ────────────────────────────────────────────────────────────────────

pub fn pool(urls: &[&str]) -> EndpointPool {
    EndpointPool::new(urls.iter().map(|u| Endpoint::new(*u)).collect()).unwrap()
}

pub fn polling_pool(urls: &[&str], interval: Duration) -> EndpointPool {
    let settings = EndpointSettings {
        polling_interval: Some(interval),
        ..Default::default()
    };
    EndpointPool::new(
        urls.iter()
            .map(|u| Endpoint::new(*u).with_settings(settings.clone()))
            .collect(),
    )
    .unwrap()
}

pub fn client(pool: EndpointPool, connector: &Arc<MockConnector>) -> RpcClient {
    init_tracing();
    RpcClient::with_connector(pool, connector.clone(), ClientConfig::default()).unwrap()
}

/// Poll `condition` until it holds, yielding to spawned tasks in between.
pub async fn wait_for<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..2_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Run `fut`, failing the test if it takes longer than five seconds.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}
