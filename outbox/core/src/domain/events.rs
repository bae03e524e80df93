// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Forum Domain Events
//!
//! Events are a side channel: they notify downstream consumers (search
//! indexing, notifications) about committed state changes and are never used
//! to rebuild aggregate state.
//!
//! Two capability tiers:
//!
//! - [`DomainEvent`] is the minimum every event implements. It is enough to
//!   serialize the event into an outbox payload.
//! - [`EventRouting`] is optional. Events that expose it contribute an
//!   aggregate id, a partition key, tenant id and timestamp to the payload
//!   envelope, which the relay uses to derive the broker key. Events without
//!   it are still enqueued and published with a null key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::forum::{PollId, PostId, ThreadId};
use crate::domain::tenant::{TenantId, UserId};

/// Version of the payload envelope written to the outbox.
pub const PAYLOAD_SCHEMA_VERSION: u32 = 1;

pub trait DomainEvent: fmt::Debug + Send + Sync {
    /// Stable type tag, also stored in `OutboxRecord::event_type`.
    fn event_type(&self) -> &'static str;

    /// Variant-specific body.
    fn data(&self) -> serde_json::Result<serde_json::Value>;

    fn routing(&self) -> Option<&dyn EventRouting> {
        None
    }
}

pub trait EventRouting {
    fn aggregate_id(&self) -> Uuid;

    /// Events sharing a key are delivered in order relative to each other.
    fn partition_key(&self) -> Uuid {
        self.aggregate_id()
    }

    fn tenant_id(&self) -> TenantId;
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Serialized form of an event as stored in `OutboxRecord::payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub schema_version: u32,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    pub fn seal(event: &dyn DomainEvent) -> serde_json::Result<Self> {
        let routing = event.routing();
        Ok(Self {
            schema_version: PAYLOAD_SCHEMA_VERSION,
            event_type: event.event_type().to_string(),
            aggregate_id: routing.map(|r| r.aggregate_id()),
            partition_key: routing.map(|r| r.partition_key()),
            tenant_id: routing.map(|r| r.tenant_id()),
            occurred_at: routing.map(|r| r.occurred_at()),
            data: event.data()?,
        })
    }

    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_payload(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

// ============================================================================
// Thread events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadCreated {
    pub thread_id: ThreadId,
    pub tenant_id: TenantId,
    pub author_id: UserId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl DomainEvent for ThreadCreated {
    fn event_type(&self) -> &'static str {
        "ThreadCreated"
    }

    fn data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn routing(&self) -> Option<&dyn EventRouting> {
        Some(self)
    }
}

impl EventRouting for ThreadCreated {
    fn aggregate_id(&self) -> Uuid {
        self.thread_id.0
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadLocked {
    pub thread_id: ThreadId,
    pub tenant_id: TenantId,
    pub locked_by: UserId,
    pub locked_at: DateTime<Utc>,
}

impl DomainEvent for ThreadLocked {
    fn event_type(&self) -> &'static str {
        "ThreadLocked"
    }

    fn data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn routing(&self) -> Option<&dyn EventRouting> {
        Some(self)
    }
}

impl EventRouting for ThreadLocked {
    fn aggregate_id(&self) -> Uuid {
        self.thread_id.0
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.locked_at
    }
}

// ============================================================================
// Post events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostCreated {
    pub post_id: PostId,
    pub thread_id: ThreadId,
    pub tenant_id: TenantId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl DomainEvent for PostCreated {
    fn event_type(&self) -> &'static str {
        "PostCreated"
    }

    fn data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn routing(&self) -> Option<&dyn EventRouting> {
        Some(self)
    }
}

impl EventRouting for PostCreated {
    fn aggregate_id(&self) -> Uuid {
        self.post_id.0
    }

    // Replies stay ordered within their thread.
    fn partition_key(&self) -> Uuid {
        self.thread_id.0
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

// ============================================================================
// Poll events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollCreated {
    pub poll_id: PollId,
    pub thread_id: ThreadId,
    pub tenant_id: TenantId,
    pub question: String,
    pub options: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl DomainEvent for PollCreated {
    fn event_type(&self) -> &'static str {
        "PollCreated"
    }

    fn data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn routing(&self) -> Option<&dyn EventRouting> {
        Some(self)
    }
}

impl EventRouting for PollCreated {
    fn aggregate_id(&self) -> Uuid {
        self.poll_id.0
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Ballots are anonymous: the event carries neither voter nor tenant and does
/// not implement [`EventRouting`], so it is published without a partition key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollVoteCast {
    pub poll_id: PollId,
    pub option_index: usize,
    pub cast_at: DateTime<Utc>,
}

impl DomainEvent for PollVoteCast {
    fn event_type(&self) -> &'static str {
        "PollVoteCast"
    }

    fn data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_routing_fields_when_available() {
        let event = ThreadCreated {
            thread_id: ThreadId::new(),
            tenant_id: TenantId::new(),
            author_id: UserId::new(),
            title: "Welcome".to_string(),
            created_at: Utc::now(),
        };

        let envelope = EventEnvelope::seal(&event).unwrap();
        assert_eq!(envelope.schema_version, PAYLOAD_SCHEMA_VERSION);
        assert_eq!(envelope.event_type, "ThreadCreated");
        assert_eq!(envelope.aggregate_id, Some(event.thread_id.0));
        assert_eq!(envelope.partition_key, Some(event.thread_id.0));
        assert_eq!(envelope.tenant_id, Some(event.tenant_id));
        assert_eq!(envelope.data["title"], "Welcome");
    }

    #[test]
    fn post_keeps_its_own_id_but_is_keyed_by_thread() {
        let event = PostCreated {
            post_id: PostId::new(),
            thread_id: ThreadId::new(),
            tenant_id: TenantId::new(),
            author_id: UserId::new(),
            body: "+1".to_string(),
            created_at: Utc::now(),
        };

        let envelope = EventEnvelope::seal(&event).unwrap();
        assert_eq!(envelope.aggregate_id, Some(event.post_id.0));
        assert_eq!(envelope.partition_key, Some(event.thread_id.0));
    }

    #[test]
    fn envelope_omits_routing_fields_for_plain_events() {
        let event = PollVoteCast {
            poll_id: PollId::new(),
            option_index: 1,
            cast_at: Utc::now(),
        };

        let payload = EventEnvelope::seal(&event).unwrap().to_payload().unwrap();
        let raw: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert!(raw.get("aggregate_id").is_none());
        assert!(raw.get("partition_key").is_none());
        assert!(raw.get("tenant_id").is_none());
        assert_eq!(raw["data"]["option_index"], 1);

        let decoded = EventEnvelope::from_payload(&payload).unwrap();
        assert_eq!(decoded.event_type, "PollVoteCast");
        assert_eq!(decoded.aggregate_id, None);
    }
}
