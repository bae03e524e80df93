// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Outbox Publisher
//!
//! One drain cycle is a loop of three phases:
//!
//! 1. **Poll** up to `batch_size` PENDING records, oldest first.
//! 2. **Send** each record in batch order and wait for the broker to
//!    acknowledge it (bounded by `send_timeout`).
//! 3. **Settle**: delete on success, otherwise apply the quarantine policy and
//!    persist the record before moving on.
//!
//! The loop repeats until a poll comes back empty, so a backlog of several
//! batches drains within one scheduled invocation. Each poll resumes after the
//! last record attempted in this cycle; a record that failed is therefore not
//! attempted twice in one cycle, and newer records are never blocked behind it.
//!
//! Broker failures never leave this module. A storage failure during
//! settlement aborts the cycle: the record stays as the store last saw it and
//! the next invocation starts again from the store.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::partition_key::PartitionKeyExtractor;
use crate::application::quarantine::QuarantinePolicy;
use crate::domain::broker::{BrokerError, DeliveryAck, MessageBroker};
use crate::domain::outbox::{FailureOutcome, OutboxCursor, OutboxRecord};
use crate::domain::relay_config::OutboxSettings;
use crate::domain::repository::{OutboxStore, RepositoryError};

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Outbox store failure: {0}")]
    Store(#[from] RepositoryError),
}

/// Counters for one drain cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Non-empty poll/send/settle rounds
    pub rounds: u32,
    pub attempted: u64,
    pub published: u64,
    pub retried: u64,
    pub quarantined: u64,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        self.attempted == 0
    }
}

pub struct OutboxPublisher {
    store: Arc<dyn OutboxStore>,
    broker: Arc<dyn MessageBroker>,
    settings: OutboxSettings,
    keys: PartitionKeyExtractor,
    quarantine: QuarantinePolicy,
}

impl OutboxPublisher {
    pub fn new(store: Arc<dyn OutboxStore>, broker: Arc<dyn MessageBroker>, settings: OutboxSettings) -> Self {
        let quarantine = QuarantinePolicy::new(settings.retry_limit);
        let keys = PartitionKeyExtractor::new(&settings.partition_key);
        Self {
            store,
            broker,
            settings,
            keys,
            quarantine,
        }
    }

    pub fn settings(&self) -> &OutboxSettings {
        &self.settings
    }

    pub fn quarantine(&self) -> &QuarantinePolicy {
        &self.quarantine
    }

    /// Drain the outbox until a poll returns nothing.
    pub async fn run_cycle(&self) -> Result<CycleReport, PublisherError> {
        let started = Instant::now();
        let mut report = CycleReport::default();
        let mut cursor: Option<OutboxCursor> = None;

        loop {
            let batch = self
                .store
                .fetch_pending_oldest_first(self.settings.batch_size, cursor)
                .await
                .inspect_err(|e| error!(error = %e, "Failed to poll outbox; aborting cycle"))?;
            if batch.is_empty() {
                break;
            }

            report.rounds += 1;
            info!(
                round = report.rounds,
                batch_size = batch.len(),
                topic = %self.settings.topic,
                "Publishing outbox batch"
            );

            for record in batch {
                cursor = Some(record.cursor());
                self.process_record(record, &mut report).await?;
            }
        }

        metrics::histogram!("forum_outbox_cycle_duration_seconds").record(started.elapsed().as_secs_f64());
        if report.is_idle() {
            debug!("Outbox empty");
        } else {
            info!(
                rounds = report.rounds,
                attempted = report.attempted,
                published = report.published,
                retried = report.retried,
                quarantined = report.quarantined,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Outbox drain cycle complete"
            );
        }
        Ok(report)
    }

    async fn process_record(&self, mut record: OutboxRecord, report: &mut CycleReport) -> Result<(), PublisherError> {
        report.attempted += 1;
        let key = self.keys.extract(&record.payload);

        match self.send(&record, key.as_deref()).await {
            Ok(ack) => {
                self.store.delete(&record).await.inspect_err(|e| {
                    error!(
                        record_id = %record.id,
                        error = %e,
                        "Delivered record could not be deleted; aborting cycle (it will be redelivered)"
                    )
                })?;
                report.published += 1;
                metrics::counter!("forum_outbox_records_published_total").increment(1);
                debug!(
                    record_id = %record.id,
                    event_type = %record.event_type,
                    key = key.as_deref().unwrap_or("<none>"),
                    partition = ?ack.partition,
                    offset = ?ack.offset,
                    "Outbox record published"
                );
            }
            Err(send_error) => {
                metrics::counter!("forum_outbox_send_failures_total").increment(1);
                warn!(
                    record_id = %record.id,
                    tenant_id = %record.tenant_id,
                    event_type = %record.event_type,
                    retry_count = record.retry_count,
                    error = %send_error,
                    "Outbox record delivery failed"
                );

                let outcome = match self.quarantine.register_failure(&mut record, &send_error.to_string()) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(record_id = %record.id, error = %e, "Skipping record that is not pending");
                        return Ok(());
                    }
                };

                self.store.save(&record).await.inspect_err(|e| {
                    error!(
                        record_id = %record.id,
                        error = %e,
                        "Failed to persist delivery failure; aborting cycle"
                    )
                })?;
                self.quarantine.settled(&record, outcome);

                match outcome {
                    FailureOutcome::Retrying { .. } => report.retried += 1,
                    FailureOutcome::Quarantined { .. } => report.quarantined += 1,
                }
            }
        }
        Ok(())
    }

    async fn send(&self, record: &OutboxRecord, key: Option<&str>) -> Result<DeliveryAck, BrokerError> {
        let timeout = self.settings.send_timeout;
        match tokio::time::timeout(
            timeout,
            self.broker.send(&self.settings.topic, key, record.payload.as_bytes()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout(timeout)),
        }
    }
}
