// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Forum Aggregates
//!
//! Thread, post and poll aggregates. Each one records the events it raises in
//! its own [`EventBuffer`]; nothing here talks to storage or the broker.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Business rules that produce outbox events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::event_buffer::{Aggregate, EventBuffer};
use crate::domain::events::{PollCreated, PollVoteCast, PostCreated, ThreadCreated, ThreadLocked};
use crate::domain::tenant::{TenantContext, TenantId, UserId};

macro_rules! aggregate_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

aggregate_id!(ThreadId);
aggregate_id!(PostId);
aggregate_id!(PollId);

pub const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ForumError {
    #[error("Thread title must not be empty")]
    EmptyTitle,

    #[error("Thread title exceeds 200 characters")]
    TitleTooLong,

    #[error("Post body must not be empty")]
    EmptyBody,

    #[error("Thread {0} is locked")]
    ThreadLocked(ThreadId),

    #[error("Poll needs at least two options")]
    TooFewOptions,

    #[error("Poll {0} is closed")]
    PollClosed(PollId),

    #[error("Poll option {0} does not exist")]
    UnknownOption(usize),

    #[error("User {0} already voted")]
    AlreadyVoted(UserId),
}

// ============================================================================
// Thread
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub tenant_id: TenantId,
    pub author_id: UserId,
    pub title: String,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    version: i64,
    #[serde(skip)]
    events: EventBuffer,
}

impl Thread {
    pub fn create(ctx: &TenantContext, author_id: UserId, title: impl Into<String>) -> Result<Self, ForumError> {
        let title: String = title.into();
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(ForumError::EmptyTitle);
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(ForumError::TitleTooLong);
        }

        let mut thread = Self {
            id: ThreadId::new(),
            tenant_id: ctx.tenant_id(),
            author_id,
            title,
            locked: false,
            created_at: Utc::now(),
            version: 0,
            events: EventBuffer::new(),
        };
        thread.events.record(ThreadCreated {
            thread_id: thread.id,
            tenant_id: thread.tenant_id,
            author_id,
            title: thread.title.clone(),
            created_at: thread.created_at,
        });
        Ok(thread)
    }

    pub fn lock(&mut self, locked_by: UserId) -> Result<(), ForumError> {
        self.ensure_open()?;
        self.locked = true;
        self.events.record(ThreadLocked {
            thread_id: self.id,
            tenant_id: self.tenant_id,
            locked_by,
            locked_at: Utc::now(),
        });
        Ok(())
    }

    pub fn ensure_open(&self) -> Result<(), ForumError> {
        if self.locked {
            return Err(ForumError::ThreadLocked(self.id));
        }
        Ok(())
    }
}

impl Aggregate for Thread {
    const KIND: &'static str = "thread";

    fn aggregate_id(&self) -> Uuid {
        self.id.0
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn events(&self) -> &EventBuffer {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
}

// ============================================================================
// Post
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub thread_id: ThreadId,
    pub tenant_id: TenantId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    version: i64,
    #[serde(skip)]
    events: EventBuffer,
}

impl Post {
    /// Replies to `thread`, which must be open.
    pub fn reply(thread: &Thread, author_id: UserId, body: impl Into<String>) -> Result<Self, ForumError> {
        thread.ensure_open()?;
        let body: String = body.into();
        if body.trim().is_empty() {
            return Err(ForumError::EmptyBody);
        }

        let mut post = Self {
            id: PostId::new(),
            thread_id: thread.id,
            tenant_id: thread.tenant_id,
            author_id,
            body,
            created_at: Utc::now(),
            version: 0,
            events: EventBuffer::new(),
        };
        post.events.record(PostCreated {
            post_id: post.id,
            thread_id: post.thread_id,
            tenant_id: post.tenant_id,
            author_id,
            body: post.body.clone(),
            created_at: post.created_at,
        });
        Ok(post)
    }
}

impl Aggregate for Post {
    const KIND: &'static str = "post";

    fn aggregate_id(&self) -> Uuid {
        self.id.0
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn events(&self) -> &EventBuffer {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
}

// ============================================================================
// Poll
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub thread_id: ThreadId,
    pub tenant_id: TenantId,
    pub question: String,
    pub options: Vec<String>,
    pub closed: bool,
    ballots: BTreeMap<UserId, usize>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    version: i64,
    #[serde(skip)]
    events: EventBuffer,
}

impl Poll {
    pub fn open(thread: &Thread, question: impl Into<String>, options: Vec<String>) -> Result<Self, ForumError> {
        thread.ensure_open()?;
        if options.len() < 2 {
            return Err(ForumError::TooFewOptions);
        }

        let mut poll = Self {
            id: PollId::new(),
            thread_id: thread.id,
            tenant_id: thread.tenant_id,
            question: question.into(),
            options,
            closed: false,
            ballots: BTreeMap::new(),
            created_at: Utc::now(),
            version: 0,
            events: EventBuffer::new(),
        };
        poll.events.record(PollCreated {
            poll_id: poll.id,
            thread_id: poll.thread_id,
            tenant_id: poll.tenant_id,
            question: poll.question.clone(),
            options: poll.options.clone(),
            created_at: poll.created_at,
        });
        Ok(poll)
    }

    pub fn cast_vote(&mut self, voter: UserId, option_index: usize) -> Result<(), ForumError> {
        if self.closed {
            return Err(ForumError::PollClosed(self.id));
        }
        if option_index >= self.options.len() {
            return Err(ForumError::UnknownOption(option_index));
        }
        if self.ballots.contains_key(&voter) {
            return Err(ForumError::AlreadyVoted(voter));
        }

        self.ballots.insert(voter, option_index);
        self.events.record(PollVoteCast {
            poll_id: self.id,
            option_index,
            cast_at: Utc::now(),
        });
        Ok(())
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Vote count per option, in option order.
    pub fn tally(&self) -> Vec<usize> {
        let mut counts = vec![0; self.options.len()];
        for &index in self.ballots.values() {
            if let Some(count) = counts.get_mut(index) {
                *count += 1;
            }
        }
        counts
    }
}

impl Aggregate for Poll {
    const KIND: &'static str = "poll";

    fn aggregate_id(&self) -> Uuid {
        self.id.0
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn events(&self) -> &EventBuffer {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
}
