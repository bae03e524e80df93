// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Application services for the outbox pipeline.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Use cases on the write side and the relay on the delivery side

pub mod forum_service;
pub mod partition_key;
pub mod publisher;
pub mod quarantine;
pub mod scheduler;
