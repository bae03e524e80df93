// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Outbox Store
//!
//! Relay-side access to `outbox_records`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements `OutboxStore`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::outbox::{OutboxCursor, OutboxError, OutboxRecord, OutboxRecordId, OutboxStats, OutboxStatus};
use crate::domain::repository::{OutboxStore, RepositoryError};
use crate::domain::tenant::TenantId;

const RECORD_COLUMNS: &str =
    "id, tenant_id, aggregate_id, event_type, payload, created_at, retry_count, status, error_message";

#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &PgRow) -> Result<OutboxRecord, RepositoryError> {
    let status: String = row.try_get("status")?;
    let retry_count: i32 = row.try_get("retry_count")?;

    Ok(OutboxRecord {
        id: OutboxRecordId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        aggregate_id: row.try_get("aggregate_id")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
        retry_count: u32::try_from(retry_count).unwrap_or_default(),
        status: status
            .parse()
            .map_err(|e: OutboxError| RepositoryError::Serialization(e.to_string()))?,
        error_message: row.try_get("error_message")?,
    })
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn fetch_pending_oldest_first(
        &self,
        limit: usize,
        after: Option<OutboxCursor>,
    ) -> Result<Vec<OutboxRecord>, RepositoryError> {
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM outbox_records
            WHERE status = 'PENDING'
              AND ($1::timestamptz IS NULL OR (created_at, id) > ($1::timestamptz, $2::uuid))
            ORDER BY created_at ASC, id ASC
            LIMIT $3
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(after.map(|c| c.created_at))
            .bind(after.map(|c| c.id.0))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn delete(&self, record: &OutboxRecord) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM outbox_records WHERE id = $1")
            .bind(record.id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save(&self, record: &OutboxRecord) -> Result<(), RepositoryError> {
        // FAILED rows are terminal and deleted rows stay deleted.
        let result = sqlx::query(
            r#"
            UPDATE outbox_records
            SET retry_count = $2, status = $3, error_message = $4
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(record.id.0)
        .bind(record.retry_count as i32)
        .bind(record.status.as_str())
        .bind(record.error_message.as_deref())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(record_id = %record.id, "Outbox record already settled elsewhere");
        }
        Ok(())
    }

    async fn stats(&self) -> Result<OutboxStats, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'PENDING') AS pending,
                COUNT(*) FILTER (WHERE status = 'FAILED') AS failed,
                MIN(created_at) FILTER (WHERE status = 'PENDING') AS oldest_pending_at
            FROM outbox_records
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let pending: i64 = row.try_get("pending")?;
        let failed: i64 = row.try_get("failed")?;
        let oldest_pending_at: Option<DateTime<Utc>> = row.try_get("oldest_pending_at")?;
        Ok(OutboxStats {
            pending: pending.max(0) as u64,
            failed: failed.max(0) as u64,
            oldest_pending_at,
        })
    }

    async fn list_failed(&self, limit: usize) -> Result<Vec<OutboxRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM outbox_records WHERE status = $1 ORDER BY created_at ASC, id ASC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(OutboxStatus::Failed.as_str())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }
}
