// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that is
//! injected into the PostgreSQL forum and outbox stores.
//!
//! The schema lives in `migrations/` and is applied with [`Database::apply_schema`].

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

pub const SCHEMA: &str = include_str!("../../migrations/0001_forum_outbox.sql");

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str) -> Result<Self> {
        Self::with_max_connections(connection_string, 5).await
    }

    pub async fn with_max_connections(connection_string: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn apply_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("Failed to apply forum outbox schema")?;
        tracing::info!("Forum outbox schema applied");
        Ok(())
    }
}
