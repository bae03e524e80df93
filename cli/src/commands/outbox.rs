// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Outbox inspection commands
//!
//! Commands: stats, failed

use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use colored::Colorize;

use forum_outbox_core::domain::relay_config::RelayConfigManifest;

use crate::runtime;

#[derive(Subcommand)]
pub enum OutboxCommand {
    /// Show pending and quarantined record counts
    Stats,

    /// List quarantined (FAILED) records, oldest first
    Failed {
        /// Maximum number of records to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Print full records as JSON lines
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: OutboxCommand, manifest: RelayConfigManifest) -> Result<()> {
    match command {
        OutboxCommand::Stats => stats(manifest).await,
        OutboxCommand::Failed { limit, json } => failed(manifest, limit, json).await,
    }
}

async fn stats(manifest: RelayConfigManifest) -> Result<()> {
    let store = runtime::outbox_store(&manifest).await?;
    let stats = store.stats().await?;

    println!("{}", "Outbox:".bold());
    println!("  Pending:     {}", stats.pending);
    let failed = stats.failed.to_string();
    println!(
        "  Quarantined: {}",
        if stats.failed > 0 { failed.red() } else { failed.normal() }
    );
    match stats.oldest_pending_at {
        Some(oldest) => {
            let age = Utc::now().signed_duration_since(oldest);
            println!("  Oldest pending: {} ({}s ago)", oldest.to_rfc3339(), age.num_seconds());
        }
        None => println!("  Oldest pending: {}", "(none)".dimmed()),
    }
    Ok(())
}

async fn failed(manifest: RelayConfigManifest, limit: usize, json: bool) -> Result<()> {
    let store = runtime::outbox_store(&manifest).await?;
    let records = store.list_failed(limit).await?;

    if json {
        for record in &records {
            println!("{}", serde_json::to_string(record)?);
        }
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No quarantined records".green());
        return Ok(());
    }

    for record in &records {
        println!(
            "{} {} {}",
            record.id.to_string().bold(),
            record.event_type,
            record.created_at.to_rfc3339().dimmed()
        );
        println!("    tenant:    {}", record.tenant_id);
        if let Some(aggregate_id) = record.aggregate_id {
            println!("    aggregate: {}", aggregate_id);
        }
        println!("    attempts:  {}", record.retry_count);
        println!(
            "    error:     {}",
            record.error_message.as_deref().unwrap_or("(none)").red()
        );
    }
    Ok(())
}
