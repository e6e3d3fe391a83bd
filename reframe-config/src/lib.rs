//! Client configuration for Reframe front ends.
//!
//! Settings are layered the same way for every binary: an optional `.env`
//! file, one config file or inline JSON source, then `REFRAME_*` environment
//! overrides. The result is checked by guard rails before it is converted
//! into the core's [`reframe_core::PollerConfig`] and
//! [`reframe_core::HttpGatewayConfig`].

#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError,
};
pub use models::{ClientConfig, ConfigSource, PollingSettings, ServerSettings};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
