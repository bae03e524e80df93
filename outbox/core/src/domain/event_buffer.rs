// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Event Buffer
//!
//! Per-aggregate accumulator for events raised during one business operation.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Holds events in recording order until the storage layer
//!   drains them inside the save transaction

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::events::DomainEvent;
use crate::domain::tenant::TenantId;

/// Ordered, per-instance event queue.
///
/// No ordering is implied across different aggregate instances.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Vec<Box<dyn DomainEvent>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: impl DomainEvent + 'static) {
        self.events.push(Box::new(event));
    }

    /// Returns every buffered event in recording order and leaves the buffer
    /// empty. A second call returns nothing until new events are recorded.
    pub fn poll_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.events)
    }

    /// Puts drained events back in front of anything recorded since the drain.
    ///
    /// Used by storage adapters when the save transaction aborts, so the
    /// caller can retry without re-running the business operation.
    pub fn restore(&mut self, mut drained: Vec<Box<dyn DomainEvent>>) {
        drained.append(&mut self.events);
        self.events = drained;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn DomainEvent> {
        self.events.iter().map(|e| e.as_ref())
    }
}

/// A consistency boundary whose state and buffered events are persisted as
/// one atomic unit.
///
/// `version` is the optimistic-concurrency token of the persisted row: 0 for an
/// aggregate that has never been saved, bumped by the repository on every
/// successful save.
pub trait Aggregate: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Discriminator stored alongside the serialized state.
    const KIND: &'static str;

    fn aggregate_id(&self) -> Uuid;
    fn tenant_id(&self) -> TenantId;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
    fn events(&self) -> &EventBuffer;
    fn events_mut(&mut self) -> &mut EventBuffer;

    fn poll_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        self.events_mut().poll_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::PollVoteCast;
    use crate::domain::forum::PollId;
    use chrono::Utc;

    fn vote(option_index: usize) -> PollVoteCast {
        PollVoteCast {
            poll_id: PollId::new(),
            option_index,
            cast_at: Utc::now(),
        }
    }

    fn indices(events: &[Box<dyn DomainEvent>]) -> Vec<u64> {
        events
            .iter()
            .map(|e| e.data().unwrap()["option_index"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn poll_returns_events_in_recording_order() {
        let mut buffer = EventBuffer::new();
        for i in 0..5 {
            buffer.record(vote(i));
        }

        let drained = buffer.poll_events();
        assert_eq!(indices(&drained), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn second_poll_is_empty() {
        let mut buffer = EventBuffer::new();
        buffer.record(vote(0));
        buffer.record(vote(1));

        assert_eq!(buffer.poll_events().len(), 2);
        assert!(buffer.poll_events().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn restore_puts_drained_events_first() {
        let mut buffer = EventBuffer::new();
        buffer.record(vote(0));
        buffer.record(vote(1));
        let drained = buffer.poll_events();

        buffer.record(vote(2));
        buffer.restore(drained);

        assert_eq!(indices(&buffer.poll_events()), vec![0, 1, 2]);
    }
}
