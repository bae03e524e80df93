// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Message Broker Port
//!
//! The relay's only view of the broker. Implementations must return only after
//! the broker has acknowledged (or refused) the message.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Broker abstraction implemented in `crate::infrastructure::brokers`

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Broker acknowledgment. Fields are filled in when the broker reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryAck {
    pub partition: Option<i32>,
    pub offset: Option<i64>,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker did not acknowledge within {0:?}")]
    Timeout(Duration),

    #[error("Broker rejected message: {0}")]
    Rejected(String),

    #[error("Broker transport error: {0}")]
    Transport(String),

    #[error("Payload serialization error: {0}")]
    Serialization(String),
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Deliver one message. A `None` key leaves partition placement to the broker.
    async fn send(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<DeliveryAck, BrokerError>;
}
