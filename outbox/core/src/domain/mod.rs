// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Domain model for the forum outbox pipeline.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Aggregates, events, outbox records and the ports the
//!   application layer depends on

pub mod broker;
pub mod clock;
pub mod event_buffer;
pub mod events;
pub mod forum;
pub mod outbox;
pub mod relay_config;
pub mod repository;
pub mod tenant;
