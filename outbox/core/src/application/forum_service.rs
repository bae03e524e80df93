// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Forum Service
//!
//! Write-side use cases. Each one loads or creates an aggregate, applies a
//! business rule and hands the aggregate to [`AggregateRepository::save`],
//! which commits state and events together. Publishing happens later and
//! never on this path.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates aggregates and the atomic save

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::domain::event_buffer::Aggregate;
use crate::domain::forum::{ForumError, Poll, PollId, Post, Thread, ThreadId};
use crate::domain::repository::{AggregateRepository, RepositoryError};
use crate::domain::tenant::{TenantContext, UserId};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Forum(#[from] ForumError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
}

pub struct ForumService<R> {
    repository: Arc<R>,
}

impl<R: AggregateRepository> ForumService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub async fn start_thread(
        &self,
        ctx: &TenantContext,
        author: UserId,
        title: &str,
    ) -> Result<Thread, ServiceError> {
        let mut thread = Thread::create(ctx, author, title)?;
        self.repository.save(ctx, &mut thread).await?;
        info!(thread_id = %thread.id, tenant_id = %ctx.tenant_id(), "Thread created");
        Ok(thread)
    }

    pub async fn lock_thread(
        &self,
        ctx: &TenantContext,
        thread_id: ThreadId,
        moderator: UserId,
    ) -> Result<Thread, ServiceError> {
        let mut thread: Thread = self.load(ctx, thread_id.0).await?;
        thread.lock(moderator)?;
        self.repository.save(ctx, &mut thread).await?;
        Ok(thread)
    }

    pub async fn reply(
        &self,
        ctx: &TenantContext,
        thread_id: ThreadId,
        author: UserId,
        body: &str,
    ) -> Result<Post, ServiceError> {
        let thread: Thread = self.load(ctx, thread_id.0).await?;
        let mut post = Post::reply(&thread, author, body)?;
        self.repository.save(ctx, &mut post).await?;
        Ok(post)
    }

    pub async fn open_poll(
        &self,
        ctx: &TenantContext,
        thread_id: ThreadId,
        question: &str,
        options: Vec<String>,
    ) -> Result<Poll, ServiceError> {
        let thread: Thread = self.load(ctx, thread_id.0).await?;
        let mut poll = Poll::open(&thread, question, options)?;
        self.repository.save(ctx, &mut poll).await?;
        Ok(poll)
    }

    pub async fn cast_vote(
        &self,
        ctx: &TenantContext,
        poll_id: PollId,
        voter: UserId,
        option_index: usize,
    ) -> Result<Poll, ServiceError> {
        let mut poll: Poll = self.load(ctx, poll_id.0).await?;
        poll.cast_vote(voter, option_index)?;
        self.repository.save(ctx, &mut poll).await?;
        Ok(poll)
    }

    async fn load<A: Aggregate>(&self, ctx: &TenantContext, id: uuid::Uuid) -> Result<A, ServiceError> {
        let found: Option<A> = self.repository.find_by_id(ctx, id).await?;
        found.ok_or_else(|| ServiceError::NotFound {
            kind: A::KIND,
            id: id.to_string(),
        })
    }
}
