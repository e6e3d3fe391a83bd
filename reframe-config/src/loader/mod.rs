//! Layered client configuration: optional `.env`, then one file or inline
//! source, then `REFRAME_*` overrides, then guard rails.

pub mod error;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use reframe_core::normalize_base_url;
use tracing::{debug, info};

use crate::models::{ClientConfig, ConfigSource};
use crate::validation::{ConfigWarnings, apply_guard_rails};
use error::ConfigLoadError;

pub const CONFIG_PATH_VAR: &str = "REFRAME_CONFIG_PATH";
pub const CONFIG_JSON_VAR: &str = "REFRAME_CONFIG_JSON";
pub const BASE_URL_VAR: &str = "REFRAME_BASE_URL";
pub const TOKEN_VAR: &str = "REFRAME_TOKEN";
pub const POLL_INTERVAL_VAR: &str = "REFRAME_POLL_INTERVAL_MS";

const DEFAULT_FILES: &[&str] = &[
    "reframe.toml",
    "reframe.json",
    "config/reframe.toml",
    "config/reframe.json",
];

#[derive(Debug, Clone, Default)]
pub struct ConfigLoaderOptions {
    /// Explicit config file; takes precedence over `REFRAME_CONFIG_PATH`.
    pub config_path: Option<PathBuf>,
    /// Explicit `.env` file. A missing explicit file is an error.
    pub env_file: Option<PathBuf>,
    /// Directory searched for `.env` and the default config files. Defaults
    /// to the working directory.
    pub search_root: Option<PathBuf>,
    pub skip_dotenv: bool,
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: ClientConfig,
    pub source: ConfigSource,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
    vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Loader reading the process environment.
    pub fn new(options: ConfigLoaderOptions) -> Self {
        Self::with_vars(options, std::env::vars())
    }

    /// Loader reading an explicit variable set instead of the process
    /// environment.
    pub fn with_vars<I, K, V>(options: ConfigLoaderOptions, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            options,
            vars: vars
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn load(mut self) -> Result<ConfigLoad, ConfigLoadError> {
        self.merge_dotenv()?;

        let (mut config, source) = self.load_base()?;
        self.apply_env_overrides(&mut config)?;
        config.server.base_url = normalize_base_url(&config.server.base_url);

        let warnings = apply_guard_rails(&config)?;
        info!(source = ?source, base_url = %config.server.base_url, "loaded client configuration");
        Ok(ConfigLoad {
            config,
            source,
            warnings,
        })
    }

    fn search_root(&self) -> PathBuf {
        self.options
            .search_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// `.env` values never override variables already present.
    fn merge_dotenv(&mut self) -> Result<(), ConfigLoadError> {
        let path = match &self.options.env_file {
            Some(path) => path.clone(),
            None if self.options.skip_dotenv => return Ok(()),
            None => {
                let candidate = self.search_root().join(".env");
                if !candidate.is_file() {
                    return Ok(());
                }
                candidate
            }
        };

        debug!(path = %path.display(), "reading env file");
        for item in dotenvy::from_path_iter(&path)? {
            let (key, value) = item?;
            self.vars.entry(key).or_insert(value);
        }
        Ok(())
    }

    fn load_base(&self) -> Result<(ClientConfig, ConfigSource), ConfigLoadError> {
        if let Some(path) = &self.options.config_path {
            let config = load_from_file(path)?;
            return Ok((config, ConfigSource::File(path.clone())));
        }

        if let Some(path) = self.var(CONFIG_PATH_VAR) {
            let path = PathBuf::from(path);
            let config = load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Some(raw) = self.var(CONFIG_JSON_VAR) {
            let config = parse_json(raw)
                .map_err(|err| ConfigLoadError::Parse(err.context(CONFIG_JSON_VAR)))?;
            return Ok((config, ConfigSource::EnvInline));
        }

        let root = self.search_root();
        if let Some(path) = DEFAULT_FILES
            .iter()
            .map(|candidate| root.join(candidate))
            .find(|path| path.is_file())
        {
            let config = load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((ClientConfig::default(), ConfigSource::Default))
    }

    fn apply_env_overrides(
        &self,
        config: &mut ClientConfig,
    ) -> Result<(), ConfigLoadError> {
        if let Some(url) = self.var(BASE_URL_VAR) {
            config.server.base_url = url.to_string();
        }
        if let Some(token) = self.var(TOKEN_VAR) {
            config.server.access_token = Some(token.to_string());
        }
        if let Some(raw) = self.var(POLL_INTERVAL_VAR) {
            let interval_ms: u64 =
                raw.parse().map_err(|_| ConfigLoadError::InvalidEnvValue {
                    key: POLL_INTERVAL_VAR,
                    value: raw.to_string(),
                })?;
            config.polling.interval_ms = interval_ms;
            // Keep the ceiling valid when only the interval was raised.
            config.polling.backoff_max_ms =
                config.polling.backoff_max_ms.max(interval_ms);
        }
        if config
            .server
            .access_token
            .as_deref()
            .is_some_and(|token| token.trim().is_empty())
        {
            config.server.access_token = None;
        }
        Ok(())
    }
}

pub fn load_from_file(path: &Path) -> Result<ClientConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::FileIo {
            path: path.to_path_buf(),
            source,
        })?;

    let origin = path.display().to_string();
    let parsed = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents),
        Some("toml") => toml::from_str(&contents)
            .map_err(|err| anyhow!("invalid config {origin}: {err}")),
        _ => parse_from_str(&contents, &origin),
    };
    parsed.map_err(ConfigLoadError::Parse)
}

/// TOML first, then JSON.
pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<ClientConfig> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| {
            anyhow!(
                "failed to parse {origin}: toml error: {toml_err}; json error: {json_err}"
            )
        })
    })
}

pub fn parse_json(raw: &str) -> anyhow::Result<ClientConfig> {
    serde_json::from_str(raw).map_err(|err| anyhow!("invalid config json: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_override_matches_gateway_normalization() {
        let dir = tempfile::tempdir().unwrap();
        let raw = " api.example.com// ";
        let load = ConfigLoader::with_vars(
            ConfigLoaderOptions {
                search_root: Some(dir.path().to_path_buf()),
                skip_dotenv: true,
                ..ConfigLoaderOptions::default()
            },
            [(BASE_URL_VAR, raw)],
        )
        .load()
        .unwrap();
        assert_eq!(load.config.server.base_url, "http://api.example.com");
        assert_eq!(load.config.server.base_url, normalize_base_url(raw));
    }

    #[test]
    fn unknown_extension_tries_both_formats() {
        let from_json = parse_from_str(r#"{"polling": {"interval_ms": 700}}"#, "inline").unwrap();
        assert_eq!(from_json.polling.interval_ms, 700);

        let err = parse_from_str("polling = [", "inline").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("toml error"), "{message}");
        assert!(message.contains("json error"), "{message}");
    }

    #[test]
    fn non_numeric_interval_override_is_rejected() {
        let options = ConfigLoaderOptions {
            skip_dotenv: true,
            search_root: Some(PathBuf::from("/nonexistent-reframe-root")),
            ..ConfigLoaderOptions::default()
        };
        let err = ConfigLoader::with_vars(options, [(POLL_INTERVAL_VAR, "soon")])
            .load()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::InvalidEnvValue { key: POLL_INTERVAL_VAR, .. }
        ));
    }
}
