// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! One-shot drain, for cron jobs and manual recovery.

use anyhow::{Context, Result};
use colored::Colorize;

use forum_outbox_core::domain::relay_config::RelayConfigManifest;

use crate::runtime;

pub async fn run(manifest: RelayConfigManifest) -> Result<()> {
    let publisher = runtime::publisher(&manifest).await?;
    let report = publisher.run_cycle().await.context("Drain cycle aborted")?;

    if report.is_idle() {
        println!("{}", "Outbox is empty".dimmed());
        return Ok(());
    }

    println!("{}", "Drain cycle complete".bold());
    println!("  Rounds:      {}", report.rounds);
    println!("  Attempted:   {}", report.attempted);
    println!("  Published:   {}", report.published.to_string().green());
    println!("  Retrying:    {}", report.retried.to_string().yellow());
    println!("  Quarantined: {}", report.quarantined.to_string().red());
    Ok(())
}
