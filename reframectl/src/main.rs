//! `reframectl`: terminal front end for the Reframe workflow. Renders
//! snapshots and forwards intents; all polling and reconciliation happens in
//! `reframe-core`.

mod cli;
mod commands;
mod render;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use reframe_config::loader::{BASE_URL_VAR, POLL_INTERVAL_VAR, TOKEN_VAR};
use reframe_config::{ConfigLoad, ConfigLoader, ConfigLoaderOptions};
use reframe_core::{HttpGateway, WorkflowController};
use reframe_model::DownloadOptions;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command, GlobalArgs};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                |_| "info,reframe_core=info,reqwest=warn".into(),
            ),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let load = load_config(&cli.global)?;
    debug!(source = ?load.source, "client configuration source");
    for warning in load.warnings.iter() {
        match &warning.hint {
            Some(hint) => warn!(hint = %hint, "{}", warning.message),
            None => warn!("{}", warning.message),
        }
    }

    let gateway = HttpGateway::new(load.config.gateway_config())
        .context("failed to build backend client")?;
    let controller =
        WorkflowController::new(Arc::new(gateway), load.config.poller_config());

    let code = match cli.command {
        Command::Watch {
            project_id,
            wait_review,
        } => commands::watch(&controller, project_id, wait_review).await?,
        Command::Upload { name, files } => {
            commands::upload(&controller, name, files).await?
        }
        Command::Generate {
            project_id,
            formats,
            prompt,
        } => commands::generate(&controller, project_id, formats, prompt).await?,
        Command::Formats => commands::formats(&controller).await?,
        Command::Download {
            asset_ids,
            output,
            format,
            quality,
            grouping,
        } => {
            let options = DownloadOptions {
                format: format.into(),
                quality: quality.into(),
                grouping: grouping.into(),
            };
            commands::download(&controller, asset_ids, &output, options).await?
        }
    };

    controller.reset().await;
    Ok(code)
}

/// Command-line flags win over every other layer, so they are fed to the
/// loader as the variables it already understands.
fn load_config(global: &GlobalArgs) -> Result<ConfigLoad> {
    let mut vars: Vec<(String, String)> = std::env::vars().collect();
    if let Some(url) = &global.base_url {
        vars.push((BASE_URL_VAR.into(), url.clone()));
    }
    if let Some(token) = &global.token {
        vars.push((TOKEN_VAR.into(), token.clone()));
    }
    if let Some(interval) = global.interval {
        vars.push((POLL_INTERVAL_VAR.into(), interval.as_millis().to_string()));
    }

    let options = ConfigLoaderOptions {
        config_path: global.config.clone(),
        ..ConfigLoaderOptions::default()
    };
    ConfigLoader::with_vars(options, vars)
        .load()
        .context("failed to load client configuration")
}
