// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Forum Store
//!
//! Atomic append-on-commit over PostgreSQL: the aggregate row and its outbox
//! records are written in one transaction.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements `AggregateRepository` over `forum_aggregates` + `outbox_records`

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use uuid::Uuid;

use super::postgres_outbox::PostgresOutboxStore;
use super::{next_stamp_base, stamp_outbox_records};
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::event_buffer::Aggregate;
use crate::domain::events::DomainEvent;
use crate::domain::outbox::OutboxRecord;
use crate::domain::repository::{AggregateRepository, RepositoryError};
use crate::domain::tenant::{TenantContext, TenantId};

pub struct PostgresForumStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresForumStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub fn outbox(&self) -> PostgresOutboxStore {
        PostgresOutboxStore::new(self.pool.clone())
    }

    async fn commit(
        &self,
        kind: &'static str,
        ctx: &TenantContext,
        id: Uuid,
        expected: i64,
        state: serde_json::Value,
        events: &[Box<dyn DomainEvent>],
    ) -> Result<i64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let version = expected + 1;

        // (a) state upsert guarded by the optimistic version
        let written = if expected == 0 {
            sqlx::query(
                r#"
                INSERT INTO forum_aggregates (kind, id, tenant_id, version, state, updated_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                ON CONFLICT (kind, id) DO NOTHING
                "#,
            )
            .bind(kind)
            .bind(id)
            .bind(ctx.tenant_id().0)
            .bind(version)
            .bind(&state)
            .execute(&mut *tx)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE forum_aggregates
                SET version = $4, state = $5, updated_at = NOW()
                WHERE kind = $1 AND id = $2 AND tenant_id = $3 AND version = $6
                "#,
            )
            .bind(kind)
            .bind(id)
            .bind(ctx.tenant_id().0)
            .bind(version)
            .bind(&state)
            .bind(expected)
            .execute(&mut *tx)
            .await?
            .rows_affected()
        };
        if written == 0 {
            // Dropping `tx` rolls back.
            return Err(RepositoryError::Conflict { kind, id, expected });
        }

        // (c) one PENDING record per drained event
        if !events.is_empty() {
            let last_stamp = lock_watermark(&mut tx).await?;
            let base = next_stamp_base(self.clock.now(), last_stamp);
            let records = stamp_outbox_records(ctx.tenant_id(), events, base)?;
            insert_outbox_records(&mut tx, &records).await?;
            if let Some(last) = records.last() {
                advance_watermark(&mut tx, last.created_at).await?;
            }
        }

        tx.commit().await?;
        Ok(version)
    }
}

/// Row-locks the watermark until the transaction ends, serializing stamping.
async fn lock_watermark(tx: &mut Transaction<'_, Postgres>) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    let row = sqlx::query("SELECT last_stamp FROM outbox_watermark WHERE id = 1 FOR UPDATE")
        .fetch_optional(&mut **tx)
        .await?;
    match row {
        Some(row) => Ok(row.try_get("last_stamp")?),
        None => Ok(None),
    }
}

async fn advance_watermark(tx: &mut Transaction<'_, Postgres>, stamp: DateTime<Utc>) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO outbox_watermark (id, last_stamp)
        VALUES (1, $1)
        ON CONFLICT (id) DO UPDATE SET last_stamp = GREATEST(outbox_watermark.last_stamp, EXCLUDED.last_stamp)
        "#,
    )
    .bind(stamp)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Bulk insert inside the caller's transaction.
pub(crate) async fn insert_outbox_records(
    tx: &mut Transaction<'_, Postgres>,
    records: &[OutboxRecord],
) -> Result<(), RepositoryError> {
    if records.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO outbox_records \
         (id, tenant_id, aggregate_id, event_type, payload, created_at, retry_count, status, error_message) ",
    );
    builder.push_values(records, |mut row, record| {
        row.push_bind(record.id.0)
            .push_bind(record.tenant_id.0)
            .push_bind(record.aggregate_id)
            .push_bind(record.event_type.as_str())
            .push_bind(record.payload.as_str())
            .push_bind(record.created_at)
            .push_bind(record.retry_count as i32)
            .push_bind(record.status.as_str())
            .push_bind(record.error_message.as_deref());
    });
    builder.build().execute(&mut **tx).await?;
    Ok(())
}

#[async_trait]
impl AggregateRepository for PostgresForumStore {
    async fn save<A: Aggregate>(&self, ctx: &TenantContext, aggregate: &mut A) -> Result<(), RepositoryError> {
        if !ctx.owns(&aggregate.tenant_id()) {
            return Err(RepositoryError::TenantMismatch(aggregate.aggregate_id()));
        }

        // Serialization failures surface before anything is drained or written.
        let state = serde_json::to_value(&*aggregate)?;
        let events = aggregate.poll_events();
        let result = self
            .commit(A::KIND, ctx, aggregate.aggregate_id(), aggregate.version(), state, &events)
            .await;

        match result {
            Ok(version) => {
                aggregate.set_version(version);
                tracing::debug!(
                    kind = A::KIND,
                    aggregate_id = %aggregate.aggregate_id(),
                    version,
                    events = events.len(),
                    "Aggregate saved with outbox records"
                );
                Ok(())
            }
            Err(e) => {
                aggregate.events_mut().restore(events);
                Err(e)
            }
        }
    }

    async fn find_by_id<A: Aggregate>(&self, ctx: &TenantContext, id: Uuid) -> Result<Option<A>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT tenant_id, version, state
            FROM forum_aggregates
            WHERE kind = $1 AND id = $2 AND tenant_id = $3
            "#,
        )
        .bind(A::KIND)
        .bind(id)
        .bind(ctx.tenant_id().0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tenant_id = TenantId(row.try_get("tenant_id")?);
        if !ctx.owns(&tenant_id) {
            return Ok(None);
        }
        let state: serde_json::Value = row.try_get("state")?;
        let mut aggregate: A = serde_json::from_value(state)?;
        aggregate.set_version(row.try_get("version")?);
        Ok(Some(aggregate))
    }
}
