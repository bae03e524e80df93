// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use forum_outbox_core::domain::relay_config::{BrokerConfig, RelayConfigManifest, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./forum-outbox.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, force } => generate(&output, force),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = RelayConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  --config flag: {}", path.display()),
            None => println!("  --config flag: {}", "(not set)".dimmed()),
        }
        for (i, path) in RelayConfigManifest::candidate_paths().iter().enumerate() {
            let marker = if path.exists() { "✓".green() } else { "-".dimmed() };
            println!("  {}. {} {}", i + 1, marker, path.display());
        }
        println!("  ({} is read first when set)", CONFIG_PATH_ENV);
        println!();
    }

    let outbox = &config.spec.outbox;
    println!("{}", "Outbox Publisher:".bold());
    println!("  Topic:        {}", outbox.topic);
    println!("  Batch size:   {}", outbox.batch_size);
    println!("  Fixed delay:  {:?}", outbox.fixed_delay);
    println!("  Retry limit:  {}", outbox.retry_limit);
    println!("  Send timeout: {:?}", outbox.send_timeout);
    println!();

    println!("{}", "Storage:".bold());
    match &config.spec.database {
        Some(db) => println!("  PostgreSQL (max {} connections)", db.max_connections),
        None => println!("  {}", "in-memory (no database configured)".yellow()),
    }
    println!();

    println!("{}", "Broker:".bold());
    match &config.spec.broker {
        BrokerConfig::InMemory => println!("  {}", "in-memory".yellow()),
        BrokerConfig::KafkaRest { endpoint } => println!("  Kafka REST proxy at {}", endpoint),
    }
    println!();

    let observability = &config.spec.observability;
    println!("{}", "Observability:".bold());
    println!("  Log level:  {}", observability.log_level);
    println!("  Log format: {:?}", observability.log_format);
    println!(
        "  Metrics:    {}",
        observability.metrics_listen.as_deref().unwrap_or("(disabled)")
    );

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = RelayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    RelayConfigManifest::default()
        .to_yaml_file(output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forum-outbox.yaml");

        generate(&path, false).unwrap();
        validate(Some(path.clone())).unwrap();

        assert!(generate(&path, false).is_err(), "refuses to overwrite");
        generate(&path, true).unwrap();
    }
}
