//! Serde-deserializable configuration.
//!
//! Durations are integer milliseconds. Loading from a file or environment is
//! left to the application; these structs only describe the shape.
//!
//! ```json
//! {
//!   "endpoints": [
//!     { "url": "wss://ethereum-rpc.publicnode.com", "request_cooldown_ms": 200 },
//!     { "url": "https://eth-mainnet.g.alchemy.com/v2/{API_KEY}", "api_key": "..." }
//!   ],
//!   "client": { "reconnect_initial_ms": 250 }
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chain::Chain;
use crate::endpoint::{Endpoint, EndpointSettings, TransportKind, UrlApiKey};
use crate::error::ConfigError;
use crate::policy::BackoffConfig;
use crate::pool::EndpointPool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    /// Overrides scheme-based inference.
    #[serde(default)]
    pub transport: Option<TransportKind>,
    /// Substituted for `{API_KEY}` in `url`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub chain: Option<Chain>,
    #[serde(default)]
    pub gas_limit: Option<u64>,
    #[serde(default)]
    pub polling_interval_ms: Option<u64>,
    #[serde(default)]
    pub request_cooldown_ms: Option<u64>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub batch_window_ms: Option<u64>,
}

impl EndpointConfig {
    pub fn to_endpoint(&self) -> Endpoint {
        let mut endpoint = Endpoint::new(&self.url).with_settings(EndpointSettings {
            gas_limit: self.gas_limit,
            polling_interval: self.polling_interval_ms.map(Duration::from_millis),
            request_cooldown: self.request_cooldown_ms.map(Duration::from_millis),
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
            batch_window: self.batch_window_ms.map(Duration::from_millis),
        });
        if let Some(kind) = self.transport {
            endpoint = endpoint.with_transport(kind);
        }
        if let Some(key) = &self.api_key {
            endpoint = endpoint.with_authorization(UrlApiKey::new(key));
        }
        if let Some(chain) = &self.chain {
            endpoint = endpoint.with_chain(chain.clone());
        }
        endpoint
    }
}

/// Failover tuning for the RPC client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Delay after the second consecutive fault; the first fails over at once.
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,
}

fn default_reconnect_initial_ms() -> u64 {
    500
}
fn default_reconnect_max_ms() -> u64 {
    60_000
}
fn default_reconnect_multiplier() -> f64 {
    2.0
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            reconnect_multiplier: default_reconnect_multiplier(),
        }
    }
}

impl ClientConfig {
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial: Duration::from_millis(self.reconnect_initial_ms),
            max: Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_initial_ms)),
            multiplier: self.reconnect_multiplier.max(1.0),
            immediate_first: true,
        }
    }
}

/// Endpoints plus client tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub client: ClientConfig,
}

impl NetworkConfig {
    pub fn build_pool(&self) -> Result<EndpointPool, ConfigError> {
        EndpointPool::new(self.endpoints.iter().map(EndpointConfig::to_endpoint).collect())
    }
}
