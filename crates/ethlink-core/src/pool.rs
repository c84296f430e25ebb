//! Ordered endpoint pool with lock-free round-robin rotation.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::endpoint::Endpoint;
use crate::error::ConfigError;

/// A non-empty, ordered list of authorized endpoints plus a cursor.
///
/// Every endpoint is authorized up front, so a bad API key setup fails at
/// construction rather than on the first failover.
#[derive(Debug)]
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
    cursor: AtomicUsize,
}

impl EndpointPool {
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::EmptyPool);
        }
        let endpoints = endpoints
            .iter()
            .map(|ep| {
                let resolved = ep.authorize()?;
                resolved.transport()?;
                Ok(resolved)
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self {
            endpoints,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Single-endpoint convenience constructor.
    pub fn single(endpoint: Endpoint) -> Result<Self, ConfigError> {
        Self::new(vec![endpoint])
    }

    /// Number of endpoints in the pool. Never zero.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn current(&self) -> &Endpoint {
        &self.endpoints[self.current_index()]
    }

    /// Advance the cursor by one, wrapping to the first endpoint.
    ///
    /// Concurrent callers each advance once; there is no lock.
    pub fn next(&self) -> &Endpoint {
        let len = self.endpoints.len();
        let prev = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i);
        &self.endpoints[(prev + 1) % len]
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}
