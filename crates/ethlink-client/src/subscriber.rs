//! New-block subscriber.
//!
//! Subscribes to `newHeads` through a durable `eth_subscribe` request, so the
//! subscription is re-established on every endpoint the client fails over
//! to. When the current endpoint rejects `eth_subscribe` (plain HTTP nodes,
//! most public gateways) the subscriber falls back to polling
//! `eth_blockNumber` at the endpoint's polling interval. Both paths feed one
//! dedupe step, so consumers see strictly increasing block numbers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use ethlink_core::error::RpcError;
use ethlink_core::wire::JsonRpcNotification;

use crate::client::RpcClient;
use crate::eth::{BlockHeader, BlockNumber};
use crate::pending::DurableRequest;

pub type ConsumerId = u64;

type Consumer = Arc<dyn Fn(&BlockHeader) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    /// No consumer registered yet.
    Idle,
    /// `eth_subscribe` sent, no answer yet.
    Subscribing,
    /// Blocks arrive as `eth_subscription` notifications.
    Push,
    /// The endpoint refused the subscription; blocks are polled.
    Poll,
    Closed,
}

struct Control {
    mode: SubscriptionMode,
    subscription_id: Option<String>,
    durable_id: Option<u64>,
    poll_task: Option<JoinHandle<()>>,
}

struct SubscriberInner {
    client: RpcClient,
    /// Highest dispatched block. Held for the whole dispatch.
    last_block: Mutex<u64>,
    last_seen: AtomicU64,
    consumers: Mutex<Vec<(ConsumerId, Consumer)>>,
    next_consumer: AtomicU64,
    // lock order: control, then consumers
    control: Mutex<Control>,
}

/// Delivers each new block header to registered consumers once, in order.
///
/// Cheap to clone; clones share consumers and state.
#[derive(Clone)]
pub struct BlockSubscriber {
    inner: Arc<SubscriberInner>,
}

impl BlockSubscriber {
    pub fn new(client: RpcClient) -> Self {
        Self {
            inner: Arc::new(SubscriberInner {
                client,
                last_block: Mutex::new(0),
                last_seen: AtomicU64::new(0),
                consumers: Mutex::new(Vec::new()),
                next_consumer: AtomicU64::new(1),
                control: Mutex::new(Control {
                    mode: SubscriptionMode::Idle,
                    subscription_id: None,
                    durable_id: None,
                    poll_task: None,
                }),
            }),
        }
    }

    /// Register a consumer. The first one starts the subscription.
    ///
    /// Consumers run on the client's runtime and must not block.
    pub fn on_block<F>(&self, consumer: F) -> ConsumerId
    where
        F: Fn(&BlockHeader) + Send + Sync + 'static,
    {
        let id = self.inner.next_consumer.fetch_add(1, Ordering::Relaxed);
        let first = {
            let mut consumers = self.inner.consumers.lock().unwrap();
            consumers.push((id, Arc::new(consumer)));
            consumers.len() == 1
        };
        if first {
            self.inner.activate();
        }
        id
    }

    /// Remove a consumer. Removing the last one stops polling; the
    /// subscription itself stays registered until [`close`](Self::close).
    pub fn unsubscribe(&self, id: ConsumerId) -> bool {
        let mut control = self.inner.control.lock().unwrap();
        let now_empty = {
            let mut consumers = self.inner.consumers.lock().unwrap();
            let before = consumers.len();
            consumers.retain(|(cid, _)| *cid != id);
            if consumers.len() == before {
                return false;
            }
            consumers.is_empty()
        };
        if now_empty {
            if let Some(task) = control.poll_task.take() {
                tracing::debug!("last consumer left, polling stopped");
                task.abort();
            }
        }
        true
    }

    /// Stop polling, drop the durable subscription request and tell the node
    /// to drop its subscription.
    pub fn close(&self) {
        let (durable_id, subscription_id, poll_task) = {
            let mut control = self.inner.control.lock().unwrap();
            if control.mode == SubscriptionMode::Closed {
                return;
            }
            control.mode = SubscriptionMode::Closed;
            (
                control.durable_id.take(),
                control.subscription_id.take(),
                control.poll_task.take(),
            )
        };

        if let Some(task) = poll_task {
            task.abort();
        }
        if let Some(id) = durable_id {
            self.inner.client.release_durable(id);
        }
        if let Some(sub) = subscription_id {
            self.inner
                .client
                .unsubscribe(&sub)
                .on_error(|e| tracing::debug!(error = %e, "eth_unsubscribe failed"));
        }
        self.inner.consumers.lock().unwrap().clear();
        tracing::debug!("block subscriber closed");
    }

    /// Highest block number dispatched so far, 0 before the first.
    pub fn last_block(&self) -> u64 {
        self.inner.last_seen.load(Ordering::Acquire)
    }

    pub fn mode(&self) -> SubscriptionMode {
        self.inner.control.lock().unwrap().mode
    }

    /// The node's id for the push subscription, if one is active.
    pub fn subscription_id(&self) -> Option<String> {
        self.inner.control.lock().unwrap().subscription_id.clone()
    }
}

impl std::fmt::Debug for BlockSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSubscriber")
            .field("mode", &self.mode())
            .field("last_block", &self.last_block())
            .finish()
    }
}

impl SubscriberInner {
    fn activate(self: &Arc<Self>) {
        let mut control = self.control.lock().unwrap();
        let mode = control.mode;
        match mode {
            SubscriptionMode::Idle => {
                control.mode = SubscriptionMode::Subscribing;
                drop(control);

                let request = Arc::new(NewHeads {
                    subscriber: Arc::downgrade(self),
                });
                let id = self.client.request_durable(request);

                let mut control = self.control.lock().unwrap();
                if control.mode == SubscriptionMode::Closed {
                    drop(control);
                    self.client.release_durable(id);
                } else {
                    control.durable_id = Some(id);
                }
            }
            SubscriptionMode::Poll => self.ensure_poller(&mut control),
            SubscriptionMode::Subscribing | SubscriptionMode::Push | SubscriptionMode::Closed => {}
        }
    }

    fn on_subscribe_response(self: &Arc<Self>, outcome: Result<Value, RpcError>) {
        let mut control = self.control.lock().unwrap();
        if control.mode == SubscriptionMode::Closed {
            return;
        }
        match outcome {
            Ok(Value::String(id)) => {
                tracing::info!(
                    subscription = %id,
                    url = %self.client.endpoint().label(),
                    "subscribed to new heads"
                );
                control.mode = SubscriptionMode::Push;
                control.subscription_id = Some(id);
                if let Some(task) = control.poll_task.take() {
                    task.abort();
                }
            }
            Ok(other) => {
                tracing::warn!(result = %other, "unexpected eth_subscribe result, polling instead");
                self.enter_poll(&mut control);
            }
            Err(e) => {
                tracing::info!(
                    error = %e,
                    url = %self.client.endpoint().label(),
                    "eth_subscribe refused, polling for new blocks"
                );
                self.enter_poll(&mut control);
            }
        }
    }

    fn enter_poll(self: &Arc<Self>, control: &mut Control) {
        control.mode = SubscriptionMode::Poll;
        control.subscription_id = None;
        self.ensure_poller(control);
    }

    fn ensure_poller(self: &Arc<Self>, control: &mut Control) {
        if control.poll_task.is_some() || self.consumers.lock().unwrap().is_empty() {
            return;
        }
        control.poll_task = Some(self.spawn_poller());
    }

    fn spawn_poller(self: &Arc<Self>) -> JoinHandle<()> {
        let period = self.client.endpoint().settings().polling_interval_or_default();
        tracing::debug!(interval_ms = period.as_millis() as u64, "block poller started");

        let weak = Arc::downgrade(self);
        self.client.runtime().spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.poll_once().await;
            }
        })
    }

    async fn poll_once(&self) {
        let number = match self.client.block_number().await {
            Ok(number) => number,
            Err(e) => {
                tracing::warn!(error = %e, "eth_blockNumber failed");
                return;
            }
        };
        if number <= self.last_seen.load(Ordering::Acquire) {
            return;
        }
        match self.client.get_block_header(BlockNumber::Number(number)).await {
            Ok(Some(header)) => self.emit(header),
            Ok(None) => tracing::debug!(number, "block not available yet"),
            Err(e) => tracing::warn!(error = %e, number, "eth_getBlockByNumber failed"),
        }
    }

    fn on_notification(&self, notification: &JsonRpcNotification) {
        let Some(event) = notification.subscription_event() else {
            return;
        };
        let ours = {
            let control = self.control.lock().unwrap();
            control.subscription_id.as_deref() == Some(event.subscription.as_str())
        };
        if !ours || event.result.get("number").is_none() {
            return;
        }
        match BlockHeader::from_value(event.result) {
            Ok(header) => self.emit(header),
            Err(e) => tracing::warn!(error = %e, "malformed newHeads notification"),
        }
    }

    fn emit(&self, header: BlockHeader) {
        let mut last = self.last_block.lock().unwrap();
        if header.number <= *last {
            tracing::trace!(number = header.number, last = *last, "duplicate block skipped");
            return;
        }
        *last = header.number;
        self.last_seen.store(header.number, Ordering::Release);

        let consumers: Vec<Consumer> = self
            .consumers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| Arc::clone(c))
            .collect();
        tracing::debug!(number = header.number, consumers = consumers.len(), "new block");
        for consumer in consumers {
            consumer(&header);
        }
    }
}

impl Drop for SubscriberInner {
    fn drop(&mut self) {
        if let Ok(control) = self.control.get_mut() {
            if let Some(task) = control.poll_task.take() {
                task.abort();
            }
            if let Some(id) = control.durable_id.take() {
                self.client.release_durable(id);
            }
        }
    }
}

/// The never-ending `eth_subscribe(["newHeads"])` request.
struct NewHeads {
    subscriber: Weak<SubscriberInner>,
}

impl DurableRequest for NewHeads {
    fn method(&self) -> &str {
        "eth_subscribe"
    }

    fn params(&self) -> Vec<Value> {
        vec![json!("newHeads")]
    }

    fn on_response(&self, outcome: Result<Value, RpcError>) {
        if let Some(subscriber) = self.subscriber.upgrade() {
            subscriber.on_subscribe_response(outcome);
        }
    }

    fn on_notification(&self, notification: &JsonRpcNotification) {
        if let Some(subscriber) = self.subscriber.upgrade() {
            subscriber.on_notification(notification);
        }
    }
}
