// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Forum Outbox Core
//!
//! Transactional outbox for forum domain events: aggregates buffer the events
//! they raise, the storage layer appends them to the outbox inside the same
//! transaction as the state write, and the relay drains the outbox into the
//! message broker.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Re-exports the domain, application and infrastructure layers

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
