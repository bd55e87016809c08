// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `concierge serve` command implementation.
//!
//! Opens the SQLite store, builds the channel adapters enabled by the
//! configuration, wires the engine and runs the scheduled-message
//! dispatcher until SIGINT or SIGTERM.

use std::sync::Arc;

use concierge_config::ConciergeConfig;
use concierge_core::types::HealthStatus;
use concierge_core::{
    ContentSanitizer, ConversationStore, ConciergeError, GroupBookingResolver, PluginAdapter,
    TemplateRenderer,
};
use concierge_engine::{ChannelRegistry, Engine, PassthroughSanitizer, PlaceholderRenderer};
use concierge_storage::SqliteStore;
use tracing::{error, info, warn};

use crate::shutdown;

/// Everything `serve` runs, built from the configuration.
pub struct Service {
    pub store: Arc<SqliteStore>,
    pub engine: Engine,
}

/// Opens storage and wires the engine over the configured channels.
pub async fn build_service(config: &ConciergeConfig) -> Result<Service, ConciergeError> {
    let store = Arc::new(SqliteStore::open(config.storage.clone()).await?);
    let caps = store.capabilities();
    info!(
        path = config.storage.database_path.as_str(),
        unsend = caps.unsend,
        participants = caps.participants,
        scheduling = caps.scheduling,
        "storage opened"
    );

    let channels =
        ChannelRegistry::from_adapters(concierge_channels::channels_from_config(config)?);
    let engine = Engine::new(
        store.clone() as Arc<dyn ConversationStore>,
        store.clone() as Arc<dyn GroupBookingResolver>,
        channels,
        Arc::new(PassthroughSanitizer) as Arc<dyn ContentSanitizer>,
        Arc::new(PlaceholderRenderer::new(config.templates.clone())) as Arc<dyn TemplateRenderer>,
        config,
    )?;
    Ok(Service { store, engine })
}

/// Runs the `concierge serve` command.
pub async fn run_serve(config: ConciergeConfig) -> Result<(), ConciergeError> {
    init_tracing(&config.service.log_level);
    info!(service = config.service.name.as_str(), "starting concierge serve");

    let service = build_service(&config).await?;
    for (channel, status) in service.engine.orchestrator.channels().health().await {
        match status {
            HealthStatus::Healthy => info!(channel = %channel, "channel healthy"),
            HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => {
                warn!(channel = %channel, reason = reason.as_str(), "channel not healthy")
            }
        }
    }

    let cancel = shutdown::install_signal_handler();

    let dispatcher = if config.scheduler.enabled {
        let dispatcher = service.engine.dispatcher.clone();
        let dispatcher_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            dispatcher.run(dispatcher_cancel).await;
        }))
    } else {
        info!("scheduled dispatcher disabled by configuration");
        None
    };

    cancel.cancelled().await;

    if let Some(handle) = dispatcher
        && let Err(e) = handle.await
    {
        error!(error = %e, "scheduled dispatcher task failed");
    }
    service.engine.orchestrator.channels().shutdown().await;
    if let Err(e) = service.store.shutdown().await {
        warn!(error = %e, "storage shutdown failed");
    }

    info!("concierge serve shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("concierge={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn service_builds_over_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ConciergeConfig::default();
        config.storage.database_path = dir
            .path()
            .join("serve.db")
            .to_string_lossy()
            .into_owned();

        let service = build_service(&config).await.unwrap();
        assert!(service.store.capabilities().unsend);
        assert_eq!(
            service.engine.orchestrator.channels().channels(),
            vec![concierge_core::Channel::InApp]
        );
        service.store.shutdown().await.unwrap();
    }
}
