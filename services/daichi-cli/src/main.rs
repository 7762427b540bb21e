//! Daichi cloud command-line client
//!
//! Logs in with the configured account and prints the requested resources
//! as JSON on stdout:
//!
//! ```text
//! daichi [--config <path>] [user|buildings]
//! ```
//!
//! Without a command both the user profile and the buildings are printed.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use breaker::CircuitBreaker;
use daichi_client::AuthorizedClient;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// What to fetch and print
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    User,
    Buildings,
    All,
}

impl Command {
    fn parse(arg: Option<&str>) -> Result<Self> {
        match arg {
            None => Ok(Self::All),
            Some("user") => Ok(Self::User),
            Some("buildings") => Ok(Self::Buildings),
            Some(other) => anyhow::bail!("unknown command: {other} (expected user or buildings)"),
        }
    }
}

#[derive(Serialize)]
struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<daichi_client::User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buildings: Option<Vec<daichi_client::Building>>,
}

/// Initialize tracing with LOG_LEVEL / RUST_LOG support, falling back to
/// `default_level` when neither is set.
fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // CLI: simple --config flag parsing, first other argument is the command
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_flag = args.iter().position(|a| a == "--config");
    let cli_config_path = config_flag.and_then(|i| args.get(i + 1)).map(|s| s.as_str());
    let command_arg = args
        .iter()
        .enumerate()
        .find(|(i, _)| config_flag.is_none_or(|flag| *i != flag && *i != flag + 1))
        .map(|(_, a)| a.as_str());
    let command = Command::parse(command_arg)?;

    let config_path = Config::resolve_path(cli_config_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    init_tracing(if config.client.debug { "debug" } else { "info" });
    info!(
        path = %config_path.display(),
        base_url = %config.client.base_url,
        username = %config.account.username,
        "configuration loaded"
    );

    let breaker = Arc::new(
        CircuitBreaker::new(config.breaker_settings()).context("invalid breaker settings")?,
    );
    let client_config = config
        .client_config(breaker)
        .context("invalid client settings")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let client = AuthorizedClient::connect(client_config, &cancel)
        .await
        .context("failed to authenticate with Daichi cloud")?;

    let mut report = Report {
        user: None,
        buildings: None,
    };
    if matches!(command, Command::User | Command::All) {
        report.user = Some(
            client
                .user_info(&cancel)
                .await
                .context("failed to fetch user info")?,
        );
    }
    if matches!(command, Command::Buildings | Command::All) {
        let buildings = client
            .buildings(&cancel)
            .await
            .context("failed to fetch buildings")?;
        info!(count = buildings.len(), "buildings fetched");
        report.buildings = Some(buildings);
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
