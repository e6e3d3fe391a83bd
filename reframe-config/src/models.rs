use std::path::PathBuf;
use std::time::Duration;

use reframe_core::{HttpGatewayConfig, PollerConfig};
use serde::{Deserialize, Serialize};

/// Where the file/inline layer of a [`ClientConfig`] came from. Environment
/// overrides are applied on top of every source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Backend origin, e.g. `http://localhost:8000`. A missing scheme is
    /// filled in and trailing slashes are dropped at load time.
    pub base_url: String,
    pub api_prefix: String,
    /// Bearer credential sent with every request when present.
    pub access_token: Option<String>,
    /// Transport-level timeout handed to the HTTP client.
    pub request_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            api_prefix: "/api/v1".into(),
            access_token: None,
            request_timeout_ms: 30_000,
        }
    }
}

/// Status poller cadence. `backoff_max_ms` equal to `interval_ms` turns
/// failure backoff off; `stall_after_ms = 0` turns stall reporting off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_ms: u64,
    pub backoff_max_ms: u64,
    pub stall_after_ms: Option<u64>,
    /// Core-side limit around every gateway call.
    pub request_timeout_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 3_000,
            backoff_max_ms: 30_000,
            stall_after_ms: Some(600_000),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerSettings,
    pub polling: PollingSettings,
}

impl ClientConfig {
    pub fn poller_config(&self) -> PollerConfig {
        let polling = &self.polling;
        PollerConfig {
            interval: Duration::from_millis(polling.interval_ms),
            backoff_max: Duration::from_millis(
                polling.backoff_max_ms.max(polling.interval_ms),
            ),
            stall_after: polling
                .stall_after_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            request_timeout: (polling.request_timeout_ms > 0)
                .then(|| Duration::from_millis(polling.request_timeout_ms)),
        }
    }

    pub fn gateway_config(&self) -> HttpGatewayConfig {
        HttpGatewayConfig {
            base_url: self.server.base_url.clone(),
            api_prefix: self.server.api_prefix.clone(),
            access_token: self.server.access_token.clone(),
            request_timeout: Duration::from_millis(
                self.server.request_timeout_ms,
            ),
        }
    }
}
