//! Remote node endpoints: URL, transport kind, authorization and settings.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chain::Chain;
use crate::error::ConfigError;

pub const DEFAULT_GAS_LIMIT: u64 = 50_000_000;
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(10);

/// Literal token replaced by [`UrlApiKey`].
pub const API_KEY_TOKEN: &str = "{API_KEY}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    #[serde(alias = "ws")]
    WebSocket,
    Ipc,
}

impl TransportKind {
    /// Infer the transport from a URL scheme.
    ///
    /// `http(s)://` is HTTP, `ws(s)://` is WebSocket, and `ipc://` or an
    /// absolute filesystem path is IPC.
    pub fn infer(url: &str) -> Result<Self, ConfigError> {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(Self::Http)
        } else if lower.starts_with("ws://") || lower.starts_with("wss://") {
            Ok(Self::WebSocket)
        } else if lower.starts_with("ipc://") || url.starts_with('/') {
            Ok(Self::Ipc)
        } else {
            Err(ConfigError::UnknownTransport { url: url.to_string() })
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::WebSocket => write!(f, "websocket"),
            Self::Ipc => write!(f, "ipc"),
        }
    }
}

/// Transforms a configured URL into the URL actually dialed.
pub trait Authorization: std::fmt::Debug + Send + Sync + 'static {
    fn authorize(&self, url: &str) -> Result<String, ConfigError>;
}

/// Substitutes an API key for the literal `{API_KEY}` in the URL.
#[derive(Clone)]
pub struct UrlApiKey {
    api_key: String,
}

impl UrlApiKey {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into() }
    }
}

impl std::fmt::Debug for UrlApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlApiKey").field("api_key", &"<redacted>").finish()
    }
}

impl Authorization for UrlApiKey {
    fn authorize(&self, url: &str) -> Result<String, ConfigError> {
        if !url.contains(API_KEY_TOKEN) {
            return Err(ConfigError::MissingApiKeyToken { url: url.to_string() });
        }
        Ok(url.replace(API_KEY_TOKEN, &self.api_key))
    }
}

/// Per-endpoint tuning. `None` means "use the default".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSettings {
    pub gas_limit: Option<u64>,
    pub polling_interval: Option<Duration>,
    /// Minimum spacing between two sends on one connection.
    pub request_cooldown: Option<Duration>,
    /// Upper bound for a single HTTP round trip.
    pub request_timeout: Option<Duration>,
    /// Coalesce requests queued within this window into one batch frame.
    pub batch_window: Option<Duration>,
}

impl EndpointSettings {
    pub fn gas_limit_or_default(&self) -> u64 {
        self.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT)
    }

    pub fn polling_interval_or_default(&self) -> Duration {
        self.polling_interval.unwrap_or(DEFAULT_POLLING_INTERVAL)
    }
}

/// An immutable description of one remote node.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: String,
    label: String,
    transport: Option<TransportKind>,
    authorization: Option<Arc<dyn Authorization>>,
    settings: EndpointSettings,
    chain: Option<Chain>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            label: url.clone(),
            url,
            transport: None,
            authorization: None,
            settings: EndpointSettings::default(),
            chain: None,
        }
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_authorization(mut self, authorization: impl Authorization) -> Self {
        self.authorization = Some(Arc::new(authorization));
        self
    }

    pub fn with_settings(mut self, settings: EndpointSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_chain(mut self, chain: Chain) -> Self {
        self.chain = Some(chain);
        self
    }

    /// The URL to dial. Only meaningful after [`authorize`](Self::authorize).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The URL as configured, before any secret was substituted. Safe to log.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Explicit transport, or the one inferred from the URL.
    pub fn transport(&self) -> Result<TransportKind, ConfigError> {
        match self.transport {
            Some(kind) => Ok(kind),
            None => TransportKind::infer(&self.url),
        }
    }

    pub fn settings(&self) -> &EndpointSettings {
        &self.settings
    }

    pub fn chain(&self) -> Option<&Chain> {
        self.chain.as_ref()
    }

    pub fn is_authorized(&self) -> bool {
        self.authorization.is_none()
    }

    /// Resolve the URL through the authorization transform, if any.
    pub fn authorize(&self) -> Result<Endpoint, ConfigError> {
        let Some(auth) = &self.authorization else {
            return Ok(self.clone());
        };
        Ok(Endpoint {
            url: auth.authorize(&self.url)?,
            label: self.label.clone(),
            transport: self.transport,
            authorization: None,
            settings: self.settings.clone(),
            chain: self.chain.clone(),
        })
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}
