use thiserror::Error;
use url::Url;

use crate::models::ClientConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("polling interval must be greater than zero")]
    ZeroInterval,
    #[error(
        "backoff ceiling ({backoff_max_ms}ms) is below the polling interval ({interval_ms}ms)"
    )]
    BackoffBelowInterval { interval_ms: u64, backoff_max_ms: u64 },
    #[error(
        "stall threshold ({stall_after_ms}ms) must exceed the polling interval ({interval_ms}ms)"
    )]
    StallWithinInterval { interval_ms: u64, stall_after_ms: u64 },
    #[error("invalid backend base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

/// Reject configurations the poller cannot run with; collect softer issues
/// as warnings.
pub fn apply_guard_rails(
    config: &ClientConfig,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();
    let polling = &config.polling;

    if polling.interval_ms == 0 {
        return Err(ConfigGuardRailError::ZeroInterval);
    }
    if polling.backoff_max_ms < polling.interval_ms {
        return Err(ConfigGuardRailError::BackoffBelowInterval {
            interval_ms: polling.interval_ms,
            backoff_max_ms: polling.backoff_max_ms,
        });
    }
    if let Some(stall_after_ms) = polling.stall_after_ms
        && stall_after_ms > 0
        && stall_after_ms <= polling.interval_ms
    {
        return Err(ConfigGuardRailError::StallWithinInterval {
            interval_ms: polling.interval_ms,
            stall_after_ms,
        });
    }

    validate_base_url(&config.server.base_url)?;

    if config.server.access_token.is_none() {
        warnings.push_with_hint(
            "no access token configured; requests are sent unauthenticated",
            "Set REFRAME_TOKEN or server.access_token",
        );
    }

    if polling.request_timeout_ms == 0 {
        warnings.push(
            "polling.request_timeout_ms is 0; a hung backend call will stall the poller",
        );
    } else if polling.request_timeout_ms < polling.interval_ms {
        warnings.push_with_hint(
            "request timeout is shorter than the polling interval",
            "Slow status endpoints will surface as timeouts on every tick",
        );
    }

    if polling.interval_ms < 250 {
        warnings.push(format!(
            "polling interval of {}ms is aggressive for a shared backend",
            polling.interval_ms
        ));
    }

    Ok(warnings)
}

fn validate_base_url(raw: &str) -> Result<(), ConfigGuardRailError> {
    let invalid = |reason: String| ConfigGuardRailError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }
    Ok(())
}
