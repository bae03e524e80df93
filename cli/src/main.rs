// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Forum Outbox CLI
//!
//! The `forum-outbox` binary runs the outbox relay and the operator commands
//! around it.
//!
//! ## Commands
//!
//! - `forum-outbox relay` - Run the publisher on its fixed-delay schedule until Ctrl+C/SIGTERM
//! - `forum-outbox drain` - Run exactly one drain cycle and print its report
//! - `forum-outbox outbox stats|failed` - Inspect the outbox table
//! - `forum-outbox migrate` - Apply the aggregate and outbox schema
//! - `forum-outbox config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use forum_outbox_core::domain::relay_config::{LogFormat, RelayConfigManifest};

mod commands;
mod runtime;

use commands::{ConfigCommand, OutboxCommand};

/// Forum outbox relay - deliver committed domain events to the broker
#[derive(Parser)]
#[command(name = "forum-outbox")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "FORUM_OUTBOX_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config file value
    #[arg(long, global = true, env = "FORUM_OUTBOX_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the outbox relay until interrupted
    #[command(name = "relay")]
    Relay,

    /// Run a single drain cycle
    #[command(name = "drain")]
    Drain,

    /// Inspect outbox records
    #[command(name = "outbox")]
    Outbox {
        #[command(subcommand)]
        command: OutboxCommand,
    },

    /// Apply the database schema
    #[command(name = "migrate")]
    Migrate,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Config { command } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), LogFormat::Compact)?;
            return commands::config::handle_command(command, cli.config).await;
        }
        other => other,
    };

    let manifest = RelayConfigManifest::load_or_default(cli.config.clone())
        .context("Failed to load configuration")?;
    manifest.validate().context("Configuration validation failed")?;

    let observability = &manifest.spec.observability;
    init_logging(
        cli.log_level.as_deref().unwrap_or(&observability.log_level),
        observability.log_format,
    )?;
    info!(relay = %manifest.metadata.name, "Configuration loaded");

    match command {
        Commands::Relay => commands::relay::run(manifest).await,
        Commands::Drain => commands::drain::run(manifest).await,
        Commands::Outbox { command } => commands::outbox::handle_command(command, manifest).await,
        Commands::Migrate => commands::migrate::run(manifest).await,
        // Dispatched before the configuration was loaded.
        Commands::Config { .. } => Ok(()),
    }
}

/// Initialize tracing subscriber for logging. `RUST_LOG` wins over `level`.
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_outbox_command() {
        let cli = Cli::try_parse_from([
            "forum-outbox",
            "--config",
            "relay.yaml",
            "outbox",
            "failed",
            "--limit",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("relay.yaml")));
        assert!(matches!(
            cli.command,
            Commands::Outbox {
                command: OutboxCommand::Failed { limit: 5, .. }
            }
        ));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["forum-outbox"]).is_err());
    }
}
