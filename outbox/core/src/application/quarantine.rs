// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Failure Quarantine Policy
//!
//! Applies one failed delivery attempt to a record and, once the transition is
//! durable, emits the quarantine signal.
//!
//! The two steps are split so the publisher can persist the updated record in
//! between: the counter must only move for a FAILED transition the store has
//! actually accepted.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{error, warn};

use crate::domain::outbox::{FailureOutcome, OutboxError, OutboxRecord};

pub const QUARANTINED_COUNTER: &str = "forum_outbox_records_quarantined_total";

#[derive(Debug)]
pub struct QuarantinePolicy {
    retry_limit: u32,
    quarantined: AtomicU64,
}

impl QuarantinePolicy {
    pub fn new(retry_limit: u32) -> Self {
        Self {
            retry_limit: retry_limit.max(1),
            quarantined: AtomicU64::new(0),
        }
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Mutates `record` in place; the caller persists it.
    pub fn register_failure(&self, record: &mut OutboxRecord, error: &str) -> Result<FailureOutcome, OutboxError> {
        record.record_failure(error, self.retry_limit)
    }

    /// Called after the updated record has been saved.
    pub fn settled(&self, record: &OutboxRecord, outcome: FailureOutcome) {
        match outcome {
            FailureOutcome::Retrying { retry_count } => {
                warn!(
                    record_id = %record.id,
                    event_type = %record.event_type,
                    retry_count,
                    retry_limit = self.retry_limit,
                    "Outbox record will be retried on a later cycle"
                );
            }
            FailureOutcome::Quarantined { retry_count } => {
                self.quarantined.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(QUARANTINED_COUNTER, "event_type" => record.event_type.clone()).increment(1);
                error!(
                    record_id = %record.id,
                    tenant_id = %record.tenant_id,
                    event_type = %record.event_type,
                    retry_count,
                    error = record.error_message.as_deref().unwrap_or_default(),
                    "Outbox record quarantined after exhausting retries"
                );
            }
        }
    }

    /// Records quarantined by this process since start.
    pub fn quarantined_total(&self) -> u64 {
        self.quarantined.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::PollVoteCast;
    use crate::domain::forum::PollId;
    use crate::domain::outbox::OutboxStatus;
    use crate::domain::tenant::TenantId;
    use chrono::Utc;

    fn record() -> OutboxRecord {
        let event = PollVoteCast {
            poll_id: PollId::new(),
            option_index: 0,
            cast_at: Utc::now(),
        };
        OutboxRecord::pending(TenantId::default_tenant(), &event, Utc::now()).unwrap()
    }

    #[test]
    fn counter_moves_only_when_quarantine_is_settled() {
        let policy = QuarantinePolicy::new(2);
        let mut record = record();

        let first = policy.register_failure(&mut record, "timeout").unwrap();
        policy.settled(&record, first);
        assert_eq!(policy.quarantined_total(), 0);

        let second = policy.register_failure(&mut record, "timeout").unwrap();
        assert_eq!(second, FailureOutcome::Quarantined { retry_count: 2 });
        assert_eq!(record.status, OutboxStatus::Failed);
        assert_eq!(policy.quarantined_total(), 0);

        policy.settled(&record, second);
        assert_eq!(policy.quarantined_total(), 1);
    }

    #[test]
    fn zero_limit_is_treated_as_one() {
        let policy = QuarantinePolicy::new(0);
        let mut record = record();
        assert_eq!(policy.retry_limit(), 1);
        assert!(matches!(
            policy.register_failure(&mut record, "boom"),
            Ok(FailureOutcome::Quarantined { retry_count: 1 })
        ));
    }
}
