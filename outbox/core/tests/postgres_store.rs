// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Runs against a live PostgreSQL pointed to by `DATABASE_URL`.
//! `cargo test -- --ignored`

use std::sync::Arc;

use chrono::Utc;
use forum_outbox_core::application::publisher::OutboxPublisher;
use forum_outbox_core::domain::clock::FixedClock;
use forum_outbox_core::domain::event_buffer::Aggregate;
use forum_outbox_core::domain::forum::Thread;
use forum_outbox_core::domain::outbox::OutboxStatus;
use forum_outbox_core::domain::relay_config::OutboxSettings;
use forum_outbox_core::domain::repository::{AggregateRepository, OutboxStore, RepositoryError};
use forum_outbox_core::domain::tenant::{TenantContext, TenantId, UserId};
use forum_outbox_core::infrastructure::brokers::InMemoryBroker;
use forum_outbox_core::infrastructure::db::Database;
use forum_outbox_core::infrastructure::repositories::PostgresForumStore;

async fn database() -> Database {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = Database::new(&url).await.unwrap();
    db.apply_schema().await.unwrap();
    db
}

async fn store() -> PostgresForumStore {
    PostgresForumStore::new(database().await.get_pool().clone())
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn save_commits_state_and_records_together() {
    let store = store().await;
    // Fresh tenant keeps this test isolated from other rows in the table.
    let ctx = TenantContext::new(TenantId::new());
    let mut thread = Thread::create(&ctx, UserId::new(), "pg atomic").unwrap();
    thread.lock(UserId::new()).unwrap();

    store.save(&ctx, &mut thread).await.unwrap();
    assert_eq!(thread.version(), 1);

    let loaded: Thread = store.find_by_id(&ctx, thread.id.0).await.unwrap().unwrap();
    assert!(loaded.locked);
    assert_eq!(loaded.version(), 1);

    let other = TenantContext::new(TenantId::new());
    let hidden: Option<Thread> = store.find_by_id(&other, thread.id.0).await.unwrap();
    assert!(hidden.is_none());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn version_conflict_rolls_back_everything() {
    let store = store().await;
    let ctx = TenantContext::new(TenantId::new());
    let mut thread = Thread::create(&ctx, UserId::new(), "pg conflict").unwrap();
    store.save(&ctx, &mut thread).await.unwrap();

    let mut stale: Thread = store.find_by_id(&ctx, thread.id.0).await.unwrap().unwrap();
    thread.lock(UserId::new()).unwrap();
    store.save(&ctx, &mut thread).await.unwrap();

    stale.lock(UserId::new()).unwrap();
    let err = store.save(&ctx, &mut stale).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { .. }));
    assert_eq!(stale.events().len(), 1);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn relay_drains_postgres_outbox() {
    let store = store().await;
    let outbox = Arc::new(store.outbox());
    let ctx = TenantContext::new(TenantId::new());
    let mut thread = Thread::create(&ctx, UserId::new(), "pg relay").unwrap();
    store.save(&ctx, &mut thread).await.unwrap();

    let broker = Arc::new(InMemoryBroker::new());
    let publisher = OutboxPublisher::new(outbox.clone(), broker.clone(), OutboxSettings::default());
    publisher.run_cycle().await.unwrap();

    assert!(broker
        .deliveries()
        .iter()
        .any(|d| d.key.as_deref() == Some(thread.id.to_string().as_str())));

    let remaining = outbox.fetch_pending_oldest_first(1000, None).await.unwrap();
    assert!(remaining.iter().all(|r| r.aggregate_id != Some(thread.id.0)));
    let failed = outbox.list_failed(1000).await.unwrap();
    assert!(failed.iter().all(|r| r.status == OutboxStatus::Failed));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn later_save_stays_ordered_after_the_clock_steps_back() {
    let db = database().await;
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let store = PostgresForumStore::with_clock(db.get_pool().clone(), clock.clone());
    let ctx = TenantContext::new(TenantId::new());

    let mut thread = Thread::create(&ctx, UserId::new(), "pg clock skew").unwrap();
    store.save(&ctx, &mut thread).await.unwrap();

    clock.advance(chrono::Duration::seconds(-1));
    thread.lock(UserId::new()).unwrap();
    store.save(&ctx, &mut thread).await.unwrap();

    let broker = Arc::new(InMemoryBroker::new());
    let publisher = OutboxPublisher::new(Arc::new(store.outbox()), broker.clone(), OutboxSettings::default());
    publisher.run_cycle().await.unwrap();

    let key = thread.id.to_string();
    let order: Vec<String> = broker
        .deliveries()
        .iter()
        .filter(|d| d.key.as_deref() == Some(key.as_str()))
        .map(|d| {
            let payload: serde_json::Value = serde_json::from_str(&d.payload_str()).unwrap();
            payload["event_type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(order, vec!["ThreadCreated", "ThreadLocked"]);
}
