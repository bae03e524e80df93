// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Publisher Scheduler
//!
//! Fixed-delay trigger for [`OutboxPublisher::run_cycle`]: the delay is
//! measured from the end of one drain cycle to the start of the next, so a
//! long drain never overlaps the following one. Cycle errors are logged and
//! the loop carries on; nothing is kept in memory between cycles.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Runs the relay in the background, decoupled from request handling

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::application::publisher::{CycleReport, OutboxPublisher};

pub struct PublisherScheduler {
    publisher: Arc<OutboxPublisher>,
    fixed_delay: Duration,
}

impl PublisherScheduler {
    pub fn new(publisher: Arc<OutboxPublisher>) -> Self {
        let fixed_delay = publisher.settings().fixed_delay;
        Self {
            publisher,
            fixed_delay,
        }
    }

    /// Run one cycle, swallowing (but logging) its error.
    pub async fn run_once(&self) -> Option<CycleReport> {
        match self.publisher.run_cycle().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Outbox drain cycle aborted; retrying after fixed delay");
                None
            }
        }
    }

    /// Loop until `shutdown` is cancelled. An in-flight cycle is allowed to
    /// finish before the loop observes cancellation.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            fixed_delay_ms = self.fixed_delay.as_millis() as u64,
            batch_size = self.publisher.settings().batch_size,
            retry_limit = self.publisher.settings().retry_limit,
            "Outbox publisher scheduler started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            self.run_once().await;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.fixed_delay) => {}
            }
        }

        info!("Outbox publisher scheduler stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forum::Thread;
    use crate::domain::relay_config::OutboxSettings;
    use crate::domain::repository::AggregateRepository;
    use crate::domain::tenant::{TenantContext, UserId};
    use crate::infrastructure::brokers::InMemoryBroker;
    use crate::infrastructure::repositories::InMemoryForumStore;

    fn scheduler(store: &InMemoryForumStore, broker: Arc<InMemoryBroker>) -> PublisherScheduler {
        let settings = OutboxSettings {
            fixed_delay: Duration::from_secs(5),
            ..OutboxSettings::default()
        };
        let publisher = OutboxPublisher::new(Arc::new(store.outbox()), broker, settings);
        PublisherScheduler::new(Arc::new(publisher))
    }

    #[tokio::test(start_paused = true)]
    async fn picks_up_new_records_after_the_fixed_delay() {
        let store = InMemoryForumStore::new();
        let broker = Arc::new(InMemoryBroker::new());
        let shutdown = CancellationToken::new();
        let handle = scheduler(&store, broker.clone()).spawn(shutdown.clone());

        // First cycle runs immediately against an empty outbox.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let ctx = TenantContext::default();
        let mut thread = Thread::create(&ctx, UserId::new(), "later").unwrap();
        store.save(&ctx, &mut thread).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(broker.deliveries().is_empty(), "still inside the fixed delay");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(broker.deliveries().len(), 1);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_cycle_does_not_stop_the_loop() {
        let store = InMemoryForumStore::new();
        let ctx = TenantContext::default();
        let mut thread = Thread::create(&ctx, UserId::new(), "flaky store").unwrap();
        store.save(&ctx, &mut thread).await.unwrap();
        store.fail_next_outbox_update();

        let broker = Arc::new(InMemoryBroker::new());
        broker.fail_next(1);
        let scheduler = scheduler(&store, broker.clone());

        assert!(scheduler.run_once().await.is_none());
        let report = scheduler.run_once().await.unwrap();
        assert_eq!(report.published, 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_exits_without_polling() {
        let store = InMemoryForumStore::new();
        let broker = Arc::new(InMemoryBroker::new());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        scheduler(&store, broker.clone()).run(shutdown).await;
        assert_eq!(broker.attempts(), 0);
    }
}
