// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Outbox Records
//!
//! Persisted representation of one undelivered event.
//!
//! ## Lifecycle
//!
//! ```text
//! (save) ──► PENDING ──send ok──► deleted
//!              │  ▲
//!     send err │  │ retry_count < limit
//!              ▼  │
//!            retry_count += 1 ──retry_count >= limit──► FAILED (terminal)
//! ```
//!
//! Records are created by the storage layer inside the aggregate's save
//! transaction and afterwards touched only by the relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, EventEnvelope};
use crate::domain::tenant::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutboxRecordId(pub Uuid);

impl OutboxRecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OutboxRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OutboxRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "FAILED" => Ok(OutboxStatus::Failed),
            other => Err(OutboxError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutboxError {
    #[error("Unknown outbox status: {0}")]
    UnknownStatus(String),

    #[error("Outbox record {0} is already quarantined")]
    AlreadyQuarantined(OutboxRecordId),
}

/// Position of a record in delivery order.
///
/// Records are delivered by ascending `(created_at, id)`; the id only breaks
/// ties between records stamped in the same microsecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutboxCursor {
    pub created_at: DateTime<Utc>,
    pub id: OutboxRecordId,
}

/// What a failed delivery attempt did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still PENDING; will be attempted again on a later cycle.
    Retrying { retry_count: u32 },
    /// Transitioned to FAILED on this attempt.
    Quarantined { retry_count: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: OutboxRecordId,
    pub tenant_id: TenantId,
    pub aggregate_id: Option<Uuid>,
    pub event_type: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub status: OutboxStatus,
    pub error_message: Option<String>,
}

impl OutboxRecord {
    /// Serializes `event` into a fresh PENDING record.
    pub fn pending(
        tenant_id: TenantId,
        event: &dyn DomainEvent,
        created_at: DateTime<Utc>,
    ) -> serde_json::Result<Self> {
        let envelope = EventEnvelope::seal(event)?;
        Ok(Self {
            id: OutboxRecordId::new(),
            tenant_id,
            aggregate_id: envelope.aggregate_id,
            event_type: envelope.event_type.clone(),
            payload: envelope.to_payload()?,
            created_at,
            retry_count: 0,
            status: OutboxStatus::Pending,
            error_message: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }

    pub fn cursor(&self) -> OutboxCursor {
        OutboxCursor {
            created_at: self.created_at,
            id: self.id,
        }
    }

    /// Applies one failed delivery attempt.
    ///
    /// `retry_count` is incremented; once it reaches `retry_limit` the record
    /// becomes FAILED and keeps `error` as its error message. A PENDING record
    /// never carries an error message.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        retry_limit: u32,
    ) -> Result<FailureOutcome, OutboxError> {
        if self.status == OutboxStatus::Failed {
            return Err(OutboxError::AlreadyQuarantined(self.id));
        }

        self.retry_count = self.retry_count.saturating_add(1);
        if self.retry_count >= retry_limit {
            self.status = OutboxStatus::Failed;
            self.error_message = Some(error.into());
            Ok(FailureOutcome::Quarantined {
                retry_count: self.retry_count,
            })
        } else {
            Ok(FailureOutcome::Retrying {
                retry_count: self.retry_count,
            })
        }
    }
}

/// Operator view of the outbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    pub pending: u64,
    pub failed: u64,
    pub oldest_pending_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::PollVoteCast;
    use crate::domain::forum::PollId;

    fn record() -> OutboxRecord {
        let event = PollVoteCast {
            poll_id: PollId::new(),
            option_index: 0,
            cast_at: Utc::now(),
        };
        OutboxRecord::pending(TenantId::default_tenant(), &event, Utc::now()).unwrap()
    }

    #[test]
    fn new_record_is_pending_with_no_error() {
        let record = record();
        assert!(record.is_pending());
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.error_message, None);
        assert_eq!(record.event_type, "PollVoteCast");
        assert_eq!(record.aggregate_id, None);
    }

    #[test]
    fn quarantine_happens_exactly_at_the_limit() {
        let mut record = record();

        assert_eq!(
            record.record_failure("broker down", 3),
            Ok(FailureOutcome::Retrying { retry_count: 1 })
        );
        assert_eq!(
            record.record_failure("broker down", 3),
            Ok(FailureOutcome::Retrying { retry_count: 2 })
        );
        assert!(record.is_pending());
        assert_eq!(record.error_message, None);

        assert_eq!(
            record.record_failure("broker rejected", 3),
            Ok(FailureOutcome::Quarantined { retry_count: 3 })
        );
        assert_eq!(record.status, OutboxStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("broker rejected"));
    }

    #[test]
    fn failed_is_terminal() {
        let mut record = record();
        record.record_failure("x", 1).unwrap();

        assert_eq!(
            record.record_failure("y", 1),
            Err(OutboxError::AlreadyQuarantined(record.id))
        );
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.error_message.as_deref(), Some("x"));
    }

    #[test]
    fn status_parses_from_storage_form() {
        assert_eq!("PENDING".parse::<OutboxStatus>(), Ok(OutboxStatus::Pending));
        assert_eq!(OutboxStatus::Failed.to_string(), "FAILED");
        assert!("DONE".parse::<OutboxStatus>().is_err());
    }
}
