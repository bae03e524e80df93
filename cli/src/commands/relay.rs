// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Long-running relay: metrics exporter, scheduler, graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use forum_outbox_core::application::scheduler::PublisherScheduler;
use forum_outbox_core::domain::relay_config::RelayConfigManifest;

use crate::runtime;

pub async fn run(manifest: RelayConfigManifest) -> Result<()> {
    if let Some(listen) = &manifest.spec.observability.metrics_listen {
        let addr: SocketAddr = listen
            .parse()
            .with_context(|| format!("Invalid metrics_listen address: {listen}"))?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus metrics exporter listening");
    }

    let publisher = Arc::new(runtime::publisher(&manifest).await?);
    let shutdown = CancellationToken::new();
    let handle = PublisherScheduler::new(publisher).spawn(shutdown.clone());
    info!(topic = %manifest.spec.outbox.topic, "Outbox relay running");

    shutdown_signal().await;
    info!("Shutting down outbox relay; waiting for the current cycle to finish");
    shutdown.cancel();
    if let Err(e) = handle.await {
        error!(error = %e, "Scheduler task terminated abnormally");
    }

    info!("Outbox relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
