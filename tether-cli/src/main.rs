use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

use tether_config::{ConfigLoader, LogLevel, TetherConfig};
use tether_execution::process::ROOT_ENV_VAR;
use tether_ipc::Layout;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn load_config(config_path: Option<&PathBuf>, log_level: Option<&String>) -> Result<TetherConfig> {
    let mut config = ConfigLoader::new()
        .load(config_path)
        .with_context(|| match config_path {
            Some(path) => format!("Failed to load configuration from {}", path.display()),
            None => "Failed to load configuration from environment".to_string(),
        })?;

    if let Some(level) = log_level {
        config.logging.level = LogLevel::from_str(level).map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(config)
}

/// Protocol root for the worker: flag, then $TETHER_ROOT, then configuration
fn worker_root(flag: Option<&PathBuf>, config: &TetherConfig) -> PathBuf {
    flag.cloned()
        .or_else(|| std::env::var_os(ROOT_ENV_VAR).map(PathBuf::from))
        .unwrap_or_else(|| config.protocol.root_dir.clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref(), cli.log_level.as_ref())?;

    match cli.command {
        // The worker logs into the session log of its own root
        Commands::Worker { root } => {
            let layout = Layout::new(worker_root(root.as_ref(), &config));
            if config.logging.session_log {
                tether_logging::init_session_logging(
                    &layout.session_log_path(),
                    &config.logging.level.to_string(),
                )?;
            } else {
                tether_logging::init_logging_from_config(&config.logging)?;
            }
            commands::worker::run(&config, layout).await
        }
        command => {
            tether_logging::init_logging_from_config(&config.logging)?;
            debug!("Tether CLI starting");
            dispatch(command, &config, cli.config.as_ref()).await
        }
    }
}

async fn dispatch(
    command: Commands,
    config: &TetherConfig,
    config_path: Option<&PathBuf>,
) -> Result<()> {
    match command {
        Commands::Exec { payload, timeout } => commands::engine::exec(config, &payload, timeout).await,
        Commands::Status => commands::engine::status(config).await,
        Commands::Logs { lines } => commands::engine::logs(config, lines).await,
        Commands::Config { config_cmd } => commands::config::handle(config_cmd, config, config_path),
        Commands::Keys { keys_cmd } => commands::keys::handle(keys_cmd, config).await,
        Commands::Worker { root } => {
            let layout = Layout::new(worker_root(root.as_ref(), config));
            commands::worker::run(config, layout).await
        }
    }
}
