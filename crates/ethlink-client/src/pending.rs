//! Pending request table.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use ethlink_core::error::RpcError;
use ethlink_core::result::RpcResult;
use ethlink_core::wire::{JsonRpcNotification, JsonRpcResponse};

/// A request that never completes. It is re-sent on every replay and sees
/// every response to its id as well as every incoming notification.
///
/// Used for server-side subscriptions, which have to be re-established on
/// each new connection.
pub trait DurableRequest: Send + Sync + 'static {
    fn method(&self) -> &str;

    fn params(&self) -> Vec<Value>;

    /// Called for each response to this request's id.
    fn on_response(&self, outcome: Result<Value, RpcError>);

    /// Called for each notification, whatever it belongs to.
    fn on_notification(&self, notification: &JsonRpcNotification);
}

pub(crate) enum PendingEntry {
    OneShot {
        payload: String,
        result: RpcResult<Value>,
    },
    Durable {
        payload: String,
        handler: Arc<dyn DurableRequest>,
    },
}

impl PendingEntry {
    pub(crate) fn payload(&self) -> &str {
        match self {
            Self::OneShot { payload, .. } | Self::Durable { payload, .. } => payload,
        }
    }
}

/// What to do with a response, decided without holding a map guard.
pub(crate) enum Routed {
    Completed,
    Durable(Arc<dyn DurableRequest>, JsonRpcResponse),
    Unknown(JsonRpcResponse),
}

/// id → entry. One-shot entries leave the table the moment their result
/// settles; durable entries stay until released.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: DashMap<u64, PendingEntry>,
}

impl PendingTable {
    pub(crate) fn insert(&self, id: u64, entry: PendingEntry) {
        self.entries.insert(id, entry);
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Route a response to its entry. One-shot results are completed after
    /// the entry has left the map.
    pub(crate) fn route(&self, id: u64, resp: JsonRpcResponse) -> Routed {
        let durable = match self.entries.get(&id) {
            None => return Routed::Unknown(resp),
            Some(entry) => match entry.value() {
                PendingEntry::Durable { handler, .. } => Some(handler.clone()),
                PendingEntry::OneShot { .. } => None,
            },
        };
        if let Some(handler) = durable {
            return Routed::Durable(handler, resp);
        }

        let Some((_, PendingEntry::OneShot { result, .. })) = self
            .entries
            .remove_if(&id, |_, e| matches!(e, PendingEntry::OneShot { .. }))
        else {
            return Routed::Unknown(resp);
        };
        match resp.into_result() {
            Ok(value) => result.complete(value),
            Err(e) => result.complete_exceptionally(RpcError::Rpc(e)),
        };
        Routed::Completed
    }

    pub(crate) fn durable_handlers(&self) -> Vec<Arc<dyn DurableRequest>> {
        self.entries
            .iter()
            .filter_map(|entry| match entry.value() {
                PendingEntry::Durable { handler, .. } => Some(handler.clone()),
                PendingEntry::OneShot { .. } => None,
            })
            .collect()
    }

    /// Payloads of every entry in id order, for replay.
    pub(crate) fn snapshot(&self) -> Vec<(u64, String)> {
        let mut out: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().payload().to_string()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }
}
