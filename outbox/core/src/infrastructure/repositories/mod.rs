// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the aggregate repository and the outbox
//! store defined in the domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist aggregates together with their outbox records
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL
//!
//! - **PostgresForumStore** - aggregate state and outbox insert in one transaction
//! - **PostgresOutboxStore** - relay-side queries over `outbox_records`
//!
//! ## In-Memory
//!
//! - **InMemoryForumStore** - one mutex guards both tables, so a save is atomic
//! - **InMemoryOutboxStore** - relay handle onto the same tables
//!
//! The in-memory store also exposes fault injection hooks used by tests to
//! exercise the rollback and cycle-abort paths.

pub mod postgres_forum;
pub mod postgres_outbox;

pub use postgres_forum::PostgresForumStore;
pub use postgres_outbox::PostgresOutboxStore;

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::clock::{Clock, SystemClock};
use crate::domain::event_buffer::Aggregate;
use crate::domain::events::DomainEvent;
use crate::domain::outbox::{OutboxCursor, OutboxRecord, OutboxStats, OutboxStatus};
use crate::domain::repository::{AggregateRepository, OutboxStore, RepositoryError};
use crate::domain::tenant::{TenantContext, TenantId};

/// Build the PENDING records for one save.
///
/// Timestamps are truncated to microseconds (the storage resolution) and the
/// i-th event is stamped `base + i µs`, so recording order survives as
/// strictly ascending `created_at`.
pub(crate) fn stamp_outbox_records(
    tenant_id: TenantId,
    events: &[Box<dyn DomainEvent>],
    base: DateTime<Utc>,
) -> Result<Vec<OutboxRecord>, RepositoryError> {
    let base = base.trunc_subsecs(6);
    events
        .iter()
        .enumerate()
        .map(|(i, event)| {
            let created_at = base + Duration::microseconds(i as i64);
            OutboxRecord::pending(tenant_id, event.as_ref(), created_at).map_err(RepositoryError::from)
        })
        .collect()
}

/// First timestamp for a save, given the newest stamp ever handed out.
///
/// Never goes backwards, even when the clock does or two saves land in the
/// same microsecond.
pub(crate) fn next_stamp_base(now: DateTime<Utc>, last_stamp: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(6);
    match last_stamp {
        Some(last) if last >= now => last + Duration::microseconds(1),
        _ => now,
    }
}

struct StoredAggregate {
    tenant_id: TenantId,
    version: i64,
    state: serde_json::Value,
}

#[derive(Default)]
struct Tables {
    aggregates: HashMap<(&'static str, Uuid), StoredAggregate>,
    outbox: BTreeMap<OutboxCursor, OutboxRecord>,
    last_stamp: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Faults {
    state_write: AtomicBool,
    outbox_insert: AtomicBool,
    outbox_update: AtomicBool,
}

fn take(flag: &AtomicBool) -> bool {
    flag.swap(false, Ordering::SeqCst)
}

struct Shared {
    tables: Mutex<Tables>,
    faults: Faults,
    clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct InMemoryForumStore {
    shared: Arc<Shared>,
}

impl InMemoryForumStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                faults: Faults::default(),
                clock,
            }),
        }
    }

    /// Relay handle onto the same tables.
    pub fn outbox(&self) -> InMemoryOutboxStore {
        InMemoryOutboxStore {
            shared: self.shared.clone(),
        }
    }

    /// Every outbox record, PENDING and FAILED, in delivery order.
    pub fn outbox_snapshot(&self) -> Vec<OutboxRecord> {
        self.shared.tables.lock().outbox.values().cloned().collect()
    }

    pub fn aggregate_count(&self) -> usize {
        self.shared.tables.lock().aggregates.len()
    }

    /// Make the next aggregate state write fail.
    pub fn fail_next_state_write(&self) {
        self.shared.faults.state_write.store(true, Ordering::SeqCst);
    }

    /// Make the next outbox insert (inside a save) fail.
    pub fn fail_next_outbox_insert(&self) {
        self.shared.faults.outbox_insert.store(true, Ordering::SeqCst);
    }

    /// Make the next relay-side delete or update fail.
    pub fn fail_next_outbox_update(&self) {
        self.shared.faults.outbox_update.store(true, Ordering::SeqCst);
    }

    fn commit(
        &self,
        kind: &'static str,
        ctx: &TenantContext,
        id: Uuid,
        expected: i64,
        state: serde_json::Value,
        events: &[Box<dyn DomainEvent>],
    ) -> Result<i64, RepositoryError> {
        let mut tables = self.shared.tables.lock();

        // Stage everything first; the tables are only touched once nothing can fail.
        match tables.aggregates.get(&(kind, id)) {
            Some(stored) if !ctx.owns(&stored.tenant_id) => return Err(RepositoryError::TenantMismatch(id)),
            Some(stored) if stored.version != expected => {
                return Err(RepositoryError::Conflict { kind, id, expected })
            }
            None if expected != 0 => return Err(RepositoryError::Conflict { kind, id, expected }),
            _ => {}
        }
        if take(&self.shared.faults.state_write) {
            return Err(RepositoryError::Database(format!("state write for {kind} {id} failed")));
        }

        let base = next_stamp_base(self.shared.clock.now(), tables.last_stamp);
        let records = stamp_outbox_records(ctx.tenant_id(), events, base)?;
        if take(&self.shared.faults.outbox_insert) {
            return Err(RepositoryError::Database("outbox insert failed".to_string()));
        }

        let version = expected + 1;
        tables.aggregates.insert(
            (kind, id),
            StoredAggregate {
                tenant_id: ctx.tenant_id(),
                version,
                state,
            },
        );
        if let Some(last) = records.last() {
            tables.last_stamp = Some(last.created_at);
        }
        for record in records {
            tables.outbox.insert(record.cursor(), record);
        }
        Ok(version)
    }
}

impl Default for InMemoryForumStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AggregateRepository for InMemoryForumStore {
    async fn save<A: Aggregate>(&self, ctx: &TenantContext, aggregate: &mut A) -> Result<(), RepositoryError> {
        if !ctx.owns(&aggregate.tenant_id()) {
            return Err(RepositoryError::TenantMismatch(aggregate.aggregate_id()));
        }

        let state = serde_json::to_value(&*aggregate)?;
        let events = aggregate.poll_events();
        match self.commit(A::KIND, ctx, aggregate.aggregate_id(), aggregate.version(), state, &events) {
            Ok(version) => {
                aggregate.set_version(version);
                Ok(())
            }
            Err(e) => {
                aggregate.events_mut().restore(events);
                Err(e)
            }
        }
    }

    async fn find_by_id<A: Aggregate>(&self, ctx: &TenantContext, id: Uuid) -> Result<Option<A>, RepositoryError> {
        let tables = self.shared.tables.lock();
        let Some(stored) = tables.aggregates.get(&(A::KIND, id)) else {
            return Ok(None);
        };
        if !ctx.owns(&stored.tenant_id) {
            return Ok(None);
        }

        let mut aggregate: A = serde_json::from_value(stored.state.clone())?;
        aggregate.set_version(stored.version);
        Ok(Some(aggregate))
    }
}

#[derive(Clone)]
pub struct InMemoryOutboxStore {
    shared: Arc<Shared>,
}

impl InMemoryOutboxStore {
    fn check_update_fault(&self) -> Result<(), RepositoryError> {
        if take(&self.shared.faults.outbox_update) {
            return Err(RepositoryError::Database("outbox update failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn fetch_pending_oldest_first(
        &self,
        limit: usize,
        after: Option<OutboxCursor>,
    ) -> Result<Vec<OutboxRecord>, RepositoryError> {
        let tables = self.shared.tables.lock();
        let lower = match after {
            Some(cursor) => Bound::Excluded(cursor),
            None => Bound::Unbounded,
        };
        Ok(tables
            .outbox
            .range((lower, Bound::Unbounded))
            .map(|(_, record)| record)
            .filter(|record| record.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete(&self, record: &OutboxRecord) -> Result<(), RepositoryError> {
        self.check_update_fault()?;
        self.shared.tables.lock().outbox.remove(&record.cursor());
        Ok(())
    }

    async fn save(&self, record: &OutboxRecord) -> Result<(), RepositoryError> {
        self.check_update_fault()?;
        let mut tables = self.shared.tables.lock();
        if let Some(stored) = tables.outbox.get_mut(&record.cursor()) {
            if stored.status == OutboxStatus::Pending {
                stored.retry_count = record.retry_count;
                stored.status = record.status;
                stored.error_message = record.error_message.clone();
            }
        }
        Ok(())
    }

    async fn stats(&self) -> Result<OutboxStats, RepositoryError> {
        let tables = self.shared.tables.lock();
        let mut stats = OutboxStats::default();
        for record in tables.outbox.values() {
            match record.status {
                OutboxStatus::Pending => {
                    stats.pending += 1;
                    if stats.oldest_pending_at.is_none() {
                        stats.oldest_pending_at = Some(record.created_at);
                    }
                }
                OutboxStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn list_failed(&self, limit: usize) -> Result<Vec<OutboxRecord>, RepositoryError> {
        let tables = self.shared.tables.lock();
        Ok(tables
            .outbox
            .values()
            .filter(|record| record.status == OutboxStatus::Failed)
            .take(limit)
            .cloned()
            .collect())
    }
}
