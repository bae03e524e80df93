// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use colored::Colorize;

use forum_outbox_core::domain::relay_config::RelayConfigManifest;

use crate::runtime;

pub async fn run(manifest: RelayConfigManifest) -> Result<()> {
    let db = runtime::connect_database(&manifest).await?;
    db.apply_schema().await?;
    println!("{}", "✓ Schema is up to date".green());
    Ok(())
}
