//! Failover JSON-RPC client.
//!
//! The client owns at most one live connection, to the pool's current
//! endpoint. Requests are recorded in a pending table before they are sent.
//! When the connection errors or closes, the client rotates to the next
//! endpoint, opens a fresh connection and re-sends every pending request
//! under its original id. Transport faults therefore never fail a request;
//! only an error object from a node does.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;

use ethlink_core::config::{ClientConfig, NetworkConfig};
use ethlink_core::connection::{Connection, ConnectionHandler, Connector};
use ethlink_core::endpoint::Endpoint;
use ethlink_core::error::{ConfigError, RpcError, TransportError};
use ethlink_core::policy::Backoff;
use ethlink_core::pool::EndpointPool;
use ethlink_core::result::RpcResult;
use ethlink_core::wire::{decode, Incoming, JsonRpcRequest, JsonRpcResponse};

use crate::connector::TransportConnector;
use crate::pending::{DurableRequest, PendingEntry, PendingTable, Routed};

struct ActiveConnection {
    generation: u64,
    connection: Arc<dyn Connection>,
}

pub(crate) struct ClientInner {
    pool: EndpointPool,
    connector: Arc<dyn Connector>,
    runtime: Handle,
    /// Guards connection swaps. Held while inserting and sending so a
    /// request is either part of a replay snapshot or sent directly.
    active: Mutex<Option<ActiveConnection>>,
    generation: AtomicU64,
    /// A reconnect is scheduled; requests wait for its replay.
    reconnecting: AtomicBool,
    pending: PendingTable,
    next_id: AtomicU64,
    shutdown: AtomicBool,
    backoff: Mutex<Backoff>,
    faults_in_cycle: AtomicUsize,
}

/// JSON-RPC client with endpoint failover and request replay.
///
/// Cheap to clone; clones share the connection and the pending table.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

impl RpcClient {
    /// Client over the built-in HTTP, WebSocket and IPC transports.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(pool: EndpointPool) -> Result<Self, ConfigError> {
        Self::with_connector(pool, Arc::new(TransportConnector), ClientConfig::default())
    }

    pub fn from_config(config: &NetworkConfig) -> Result<Self, ConfigError> {
        let pool = config.build_pool()?;
        Self::with_connector(pool, Arc::new(TransportConnector), config.client.clone())
    }

    /// Client over a custom connector, on the current Tokio runtime.
    pub fn with_connector(
        pool: EndpointPool,
        connector: Arc<dyn Connector>,
        config: ClientConfig,
    ) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        Ok(Self::with_runtime(pool, connector, config, runtime))
    }

    /// Client bound to an explicit runtime; usable from non-runtime threads.
    pub fn with_runtime(
        pool: EndpointPool,
        connector: Arc<dyn Connector>,
        config: ClientConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                pool,
                connector,
                runtime,
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
                reconnecting: AtomicBool::new(false),
                pending: PendingTable::default(),
                next_id: AtomicU64::new(1),
                shutdown: AtomicBool::new(false),
                backoff: Mutex::new(Backoff::new(config.backoff())),
                faults_in_cycle: AtomicUsize::new(0),
            }),
        }
    }

    /// Send `method` and return its eventual result. Never blocks on I/O.
    ///
    /// Cancelling the result removes the request; nothing is sent to the node.
    /// After [`shutdown`](Self::shutdown) the result stays pending forever.
    pub fn request(&self, method: &str, params: Vec<Value>) -> RpcResult<Value> {
        let result = RpcResult::new();
        if self.inner.shutdown.load(Ordering::Acquire) {
            tracing::debug!(method, "request after shutdown not sent");
            return result;
        }

        let id = self.inner.allocate_id();
        let payload = JsonRpcRequest::new(id, method, params).encode();

        let weak = Arc::downgrade(&self.inner);
        result.on_complete(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.pending.remove(id);
            }
        });

        tracing::trace!(id, method, "request queued");
        self.inner.submit(
            id,
            PendingEntry::OneShot {
                payload,
                result: result.clone(),
            },
        );
        result
    }

    /// Like [`request`](Self::request), deserializing the result into `T`.
    pub fn request_as<T>(&self, method: &str, params: Vec<Value>) -> RpcResult<T>
    where
        T: DeserializeOwned + Clone + Send + 'static,
    {
        self.request(method, params)
            .try_map(|value| serde_json::from_value(value).map_err(RpcError::from))
    }

    /// Register a request that survives failover. Returns its id.
    pub fn request_durable(&self, handler: Arc<dyn DurableRequest>) -> u64 {
        let id = self.inner.allocate_id();
        let payload = JsonRpcRequest::new(id, handler.method(), handler.params()).encode();
        tracing::debug!(id, method = handler.method(), "durable request registered");
        if self.inner.shutdown.load(Ordering::Acquire) {
            return id;
        }
        self.inner.submit(id, PendingEntry::Durable { payload, handler });
        id
    }

    /// Stop replaying a durable request. Returns `false` if it was unknown.
    pub fn release_durable(&self, id: u64) -> bool {
        self.inner.pending.remove(id)
    }

    /// Close the connection and stop failover. Pending results are left as
    /// they are.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let old = self.inner.lock_active().take();
        if let Some(active) = old {
            active.connection.close();
        }
        tracing::info!(pending = self.inner.pending.len(), "RPC client shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// The endpoint requests are currently routed to.
    pub fn endpoint(&self) -> Endpoint {
        self.inner.pool.current().clone()
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.inner.pool
    }

    /// Requests awaiting a response, durable ones included.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.len()
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("endpoint", &self.inner.pool.current().label())
            .field("pending", &self.inner.pending.len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl ClientInner {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveConnection>> {
        self.active.lock().unwrap()
    }

    /// Ids start at 1 and wrap back to 1.
    fn allocate_id(&self) -> u64 {
        self.next_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(if n == u64::MAX { 1 } else { n + 1 })
            })
            .unwrap_or_else(|n| n)
    }

    fn submit(self: &Arc<Self>, id: u64, entry: PendingEntry) {
        let payload = entry.payload().to_string();
        let active = self.lock_active();
        self.pending.insert(id, entry);

        if let Some(current) = active.as_ref() {
            current.connection.send(payload);
            return;
        }
        if self.reconnecting.load(Ordering::Acquire) || self.shutdown.load(Ordering::Acquire) {
            // picked up by the next replay
            return;
        }
        self.open_and_replay(active);
    }

    /// Open a connection to the current endpoint and send the whole pending
    /// table. On failure, schedules the next failover.
    fn open_and_replay(self: &Arc<Self>, mut active: MutexGuard<'_, Option<ActiveConnection>>) {
        let endpoint = self.pool.current();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let handler: Arc<dyn ConnectionHandler> = Arc::new(GenerationHandler {
            client: Arc::downgrade(self),
            generation,
        });

        let opened = {
            let _enter = self.runtime.enter();
            self.connector.connect(endpoint, handler)
        };

        match opened {
            Ok(connection) => {
                tracing::info!(url = %endpoint.label(), generation, "connection opened");
                let entries = self.pending.snapshot();
                if !entries.is_empty() {
                    tracing::info!(
                        count = entries.len(),
                        url = %endpoint.label(),
                        "replaying pending requests"
                    );
                }
                for (_, payload) in entries {
                    connection.send(payload);
                }
                *active = Some(ActiveConnection {
                    generation,
                    connection,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %endpoint.label(), "connect failed");
                self.reconnecting.store(true, Ordering::Release);
                drop(active);
                self.schedule_reconnect();
            }
        }
    }

    fn on_fault(self: &Arc<Self>, generation: u64, reason: &str) {
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }
        let lost = {
            let mut active = self.lock_active();
            match active.as_ref() {
                Some(current) if current.generation == generation => {
                    self.reconnecting.store(true, Ordering::Release);
                    active.take()
                }
                _ => None,
            }
        };
        let Some(lost) = lost else {
            tracing::debug!(generation, reason, "fault from replaced connection ignored");
            return;
        };

        tracing::warn!(
            url = %lost.connection.endpoint().label(),
            reason,
            pending = self.pending.len(),
            "connection lost, failing over"
        );
        lost.connection.close();
        self.schedule_reconnect();
    }

    /// Rotate the pool and reconnect after the backoff delay.
    ///
    /// The caller has already set `reconnecting` under the `active` lock.
    fn schedule_reconnect(self: &Arc<Self>) {
        let next = self.pool.next();

        let faults = self.faults_in_cycle.fetch_add(1, Ordering::AcqRel) + 1;
        if faults >= self.pool.len() {
            self.faults_in_cycle.store(0, Ordering::Release);
            tracing::warn!(
                endpoints = self.pool.len(),
                "every endpoint failed in this cycle, still retrying"
            );
        }

        let delay = self.backoff.lock().unwrap().next_delay();
        tracing::info!(
            url = %next.label(),
            delay_ms = delay.as_millis() as u64,
            "switching endpoint"
        );

        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            inner.reconnect();
        });
    }

    fn reconnect(self: &Arc<Self>) {
        let active = self.lock_active();
        self.reconnecting.store(false, Ordering::Release);
        if self.shutdown.load(Ordering::Acquire) || active.is_some() {
            return;
        }
        self.open_and_replay(active);
    }

    fn on_message(&self, text: &str) {
        self.backoff.lock().unwrap().reset();
        self.faults_in_cycle.store(0, Ordering::Release);

        for item in decode(text) {
            match item {
                Ok(Incoming::Response(resp)) => self.on_response(resp),
                Ok(Incoming::Notification(notification)) => {
                    for handler in self.pending.durable_handlers() {
                        handler.on_notification(&notification);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "dropping undecodable message"),
            }
        }
    }

    fn on_response(&self, resp: JsonRpcResponse) {
        let Some(id) = resp.id.as_u64() else {
            tracing::warn!(id = %resp.id, "response with non-numeric id dropped");
            return;
        };
        match self.pending.route(id, resp) {
            Routed::Completed => tracing::trace!(id, "request completed"),
            Routed::Durable(handler, resp) => {
                handler.on_response(resp.into_result().map_err(RpcError::Rpc));
            }
            Routed::Unknown(_) => tracing::debug!(id, "response for unknown request dropped"),
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Ok(active) = self.active.get_mut() {
            if let Some(active) = active.take() {
                active.connection.close();
            }
        }
    }
}

/// Routes one connection's events back to the client, tagged with the
/// connection's generation so faults from replaced connections are ignored.
struct GenerationHandler {
    client: Weak<ClientInner>,
    generation: u64,
}

impl ConnectionHandler for GenerationHandler {
    fn on_message(&self, text: &str) {
        if let Some(client) = self.client.upgrade() {
            client.on_message(text);
        }
    }

    fn on_error(&self, error: TransportError) {
        if let Some(client) = self.client.upgrade() {
            client.on_fault(self.generation, &error.to_string());
        }
    }

    fn on_closed(&self) {
        if let Some(client) = self.client.upgrade() {
            client.on_fault(self.generation, "closed by peer");
        }
    }
}
