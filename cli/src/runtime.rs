// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Wiring from a loaded [`RelayConfigManifest`] to concrete adapters.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use forum_outbox_core::application::publisher::OutboxPublisher;
use forum_outbox_core::domain::broker::MessageBroker;
use forum_outbox_core::domain::relay_config::{BrokerConfig, RelayConfigManifest};
use forum_outbox_core::domain::repository::OutboxStore;
use forum_outbox_core::infrastructure::brokers::{InMemoryBroker, KafkaRestBroker};
use forum_outbox_core::infrastructure::db::Database;
use forum_outbox_core::infrastructure::repositories::PostgresOutboxStore;

pub async fn connect_database(manifest: &RelayConfigManifest) -> Result<Database> {
    let config = manifest
        .spec
        .database
        .as_ref()
        .context("spec.database is not configured (set it in the config file or via DATABASE_URL)")?;
    Database::with_max_connections(&config.url, config.max_connections).await
}

/// The relay only reads what producers committed, so it always needs the
/// shared database.
pub async fn outbox_store(manifest: &RelayConfigManifest) -> Result<Arc<dyn OutboxStore>> {
    let db = connect_database(manifest).await?;
    Ok(Arc::new(PostgresOutboxStore::new(db.get_pool().clone())))
}

pub fn broker(config: &BrokerConfig) -> Arc<dyn MessageBroker> {
    match config {
        BrokerConfig::InMemory => {
            warn!("Using in-memory broker; delivered events are discarded on exit");
            Arc::new(InMemoryBroker::new())
        }
        BrokerConfig::KafkaRest { endpoint } => Arc::new(KafkaRestBroker::new(endpoint.clone())),
    }
}

pub async fn publisher(manifest: &RelayConfigManifest) -> Result<OutboxPublisher> {
    let store = outbox_store(manifest).await?;
    let broker = broker(&manifest.spec.broker);
    Ok(OutboxPublisher::new(store, broker, manifest.spec.outbox.clone()))
}
