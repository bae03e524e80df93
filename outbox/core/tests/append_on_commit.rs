// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use forum_outbox_core::domain::event_buffer::Aggregate;
use forum_outbox_core::domain::forum::{Poll, Thread};
use forum_outbox_core::domain::repository::{AggregateRepository, RepositoryError};
use forum_outbox_core::domain::tenant::{TenantContext, TenantId, UserId};
use forum_outbox_core::infrastructure::repositories::InMemoryForumStore;
use tokio_test::{assert_err, assert_ok};

fn ctx() -> TenantContext {
    TenantContext::default()
}

#[tokio::test]
async fn successful_save_makes_state_and_events_visible_together() {
    let store = InMemoryForumStore::new();
    let mut thread = Thread::create(&ctx(), UserId::new(), "Atomic").unwrap();

    assert_ok!(store.save(&ctx(), &mut thread).await);

    let loaded: Option<Thread> = store.find_by_id(&ctx(), thread.id.0).await.unwrap();
    assert_eq!(loaded.map(|t| t.title), Some("Atomic".to_string()));
    assert_eq!(store.outbox_snapshot().len(), 1);
    assert!(thread.events().is_empty());
}

#[tokio::test]
async fn failed_outbox_insert_rolls_back_the_state_write() {
    let store = InMemoryForumStore::new();
    let mut thread = Thread::create(&ctx(), UserId::new(), "Rollback").unwrap();
    thread.lock(UserId::new()).unwrap();

    store.fail_next_outbox_insert();
    let err = assert_err!(store.save(&ctx(), &mut thread).await);
    assert!(matches!(err, RepositoryError::Database(_)));

    let loaded: Option<Thread> = store.find_by_id(&ctx(), thread.id.0).await.unwrap();
    assert!(loaded.is_none());
    assert!(store.outbox_snapshot().is_empty());
    assert_eq!(thread.version(), 0);

    // The drained events were handed back, so a plain retry succeeds.
    let types: Vec<_> = thread.events().iter().map(|e| e.event_type()).collect();
    assert_eq!(types, vec!["ThreadCreated", "ThreadLocked"]);
    assert_ok!(store.save(&ctx(), &mut thread).await);
    assert_eq!(store.outbox_snapshot().len(), 2);
}

#[tokio::test]
async fn failed_state_write_prevents_record_insertion() {
    let store = InMemoryForumStore::new();
    let mut thread = Thread::create(&ctx(), UserId::new(), "No state").unwrap();

    store.fail_next_state_write();
    assert_err!(store.save(&ctx(), &mut thread).await);
    assert_eq!(store.aggregate_count(), 0);
    assert!(store.outbox_snapshot().is_empty());
    assert_eq!(thread.events().len(), 1);
}

#[tokio::test]
async fn events_recorded_after_a_save_go_out_with_the_next_save() {
    let store = InMemoryForumStore::new();
    let thread = Thread::create(&ctx(), UserId::new(), "Polls").unwrap();
    let mut poll = Poll::open(&thread, "Tabs or spaces?", vec!["tabs".into(), "spaces".into()]).unwrap();
    assert_ok!(store.save(&ctx(), &mut poll).await);

    poll.cast_vote(UserId::new(), 0).unwrap();
    poll.cast_vote(UserId::new(), 1).unwrap();
    assert_ok!(store.save(&ctx(), &mut poll).await);
    assert_eq!(poll.version(), 2);

    let records = store.outbox_snapshot();
    let types: Vec<_> = records.iter().map(|r| r.event_type.as_str()).collect();
    assert_eq!(types, vec!["PollCreated", "PollVoteCast", "PollVoteCast"]);
    assert!(records.windows(2).all(|w| w[0].created_at < w[1].created_at));

    let reloaded: Poll = store.find_by_id(&ctx(), poll.id.0).await.unwrap().unwrap();
    assert_eq!(reloaded.tally(), vec![1, 1]);
}

#[tokio::test]
async fn records_carry_the_tenant_of_the_writing_context() {
    let store = InMemoryForumStore::new();
    let tenant = TenantId::new();
    let scoped = TenantContext::new(tenant);
    let mut thread = Thread::create(&scoped, UserId::new(), "Tenant scoped").unwrap();

    assert_ok!(store.save(&scoped, &mut thread).await);

    let record = &store.outbox_snapshot()[0];
    assert_eq!(record.tenant_id, tenant);
    assert!(record.payload.contains(&tenant.to_string()));
}
