// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod brokers;
pub mod db;
pub mod repositories;
