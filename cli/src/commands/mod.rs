// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the forum-outbox CLI

pub mod config;
pub mod drain;
pub mod migrate;
pub mod outbox;
pub mod relay;

pub use self::config::ConfigCommand;
pub use self::outbox::OutboxCommand;
