// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the outbox pipeline, defined in the domain layer
//! and implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Used by | Implementations |
//! |-------|---------|----------------|
//! | `AggregateRepository` | business use cases | `InMemoryForumStore`, `PostgresForumStore` |
//! | `OutboxStore` | the relay only | `InMemoryOutboxStore`, `PostgresOutboxStore` |
//!
//! Each outbox store is a handle onto the same backing store as its aggregate
//! repository: the outbox table has to live in the same transactional store as
//! the aggregate state.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::event_buffer::Aggregate;
use crate::domain::outbox::{OutboxCursor, OutboxRecord, OutboxStats};
use crate::domain::tenant::TenantContext;

/// Atomic append-on-commit persistence for aggregates.
#[async_trait]
pub trait AggregateRepository: Send + Sync {
    /// Persist the aggregate state and its drained events as one unit.
    ///
    /// On success the aggregate's buffer is empty, its version is bumped and
    /// one PENDING outbox record exists per drained event, stamped in strictly
    /// ascending `created_at` order. On failure nothing is written and the
    /// drained events are back in the buffer.
    async fn save<A: Aggregate>(&self, ctx: &TenantContext, aggregate: &mut A) -> Result<(), RepositoryError>;

    /// Load an aggregate visible to `ctx`. Rows owned by another tenant are
    /// reported as absent.
    async fn find_by_id<A: Aggregate>(&self, ctx: &TenantContext, id: Uuid) -> Result<Option<A>, RepositoryError>;
}

/// Relay-facing query interface over the outbox table.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Up to `limit` PENDING records ordered by `(created_at, id)`, strictly
    /// after `after` when given.
    async fn fetch_pending_oldest_first(
        &self,
        limit: usize,
        after: Option<OutboxCursor>,
    ) -> Result<Vec<OutboxRecord>, RepositoryError>;

    /// Remove a delivered record. Deleting an absent record is not an error.
    async fn delete(&self, record: &OutboxRecord) -> Result<(), RepositoryError>;

    /// Upsert retry count, status and error message.
    async fn save(&self, record: &OutboxRecord) -> Result<(), RepositoryError>;

    async fn stats(&self) -> Result<OutboxStats, RepositoryError>;

    /// Quarantined records, oldest first.
    async fn list_failed(&self, limit: usize) -> Result<Vec<OutboxRecord>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Concurrent modification of {kind} {id}: expected version {expected}")]
    Conflict { kind: &'static str, id: Uuid, expected: i64 },

    #[error("Aggregate {0} belongs to a different tenant")]
    TenantMismatch(Uuid),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
