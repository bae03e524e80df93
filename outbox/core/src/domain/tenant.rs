// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tenant
//!
//! Tenant and actor identity carried explicitly through every storage call.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Replaces request-scoped ambient tenant state with a value
//!   that is passed into `save`, `find_by_id` and the outbox write path

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tenant
///
/// Default tenant UUID for single-tenant deployments: 00000000-0000-0000-0000-000000000001
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn default_tenant() -> Self {
        Self(Uuid::from_u128(1))
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::default_tenant()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Forum member identifier (resolved upstream from the authenticated principal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-request tenant scope.
///
/// Constructed once at the edge of a request and threaded by reference through
/// the save/poll/publish chain. Storage adapters never read the tenant from
/// anywhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
    actor: Option<UserId>,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id, actor: None }
    }

    pub fn with_actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn actor(&self) -> Option<UserId> {
        self.actor
    }

    /// True when `tenant_id` is the tenant this context is scoped to.
    pub fn owns(&self, tenant_id: &TenantId) -> bool {
        &self.tenant_id == tenant_id
    }
}

impl Default for TenantContext {
    fn default() -> Self {
        Self::new(TenantId::default_tenant())
    }
}
