// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel -> adapter lookup used by the send path.

use std::collections::HashMap;
use std::sync::Arc;

use concierge_core::types::HealthStatus;
use concierge_core::{Channel, ChannelAdapter, ChannelError};
use tracing::{info, warn};

/// Adapters keyed by the channel they serve.
///
/// Registering a second adapter for a channel replaces the first.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_adapters(adapters: impl IntoIterator<Item = Arc<dyn ChannelAdapter>>) -> Self {
        let mut registry = Self::new();
        for adapter in adapters {
            registry.register(adapter);
        }
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        let channel = adapter.channel();
        if let Some(previous) = self.adapters.insert(channel, adapter) {
            warn!(
                channel = %channel,
                replaced = previous.name(),
                "channel adapter replaced"
            );
        } else {
            info!(channel = %channel, "channel adapter registered");
        }
    }

    /// The adapter serving `channel`; a `system` error when none is configured.
    pub fn get(&self, channel: Channel) -> Result<Arc<dyn ChannelAdapter>, ChannelError> {
        self.adapters
            .get(&channel)
            .cloned()
            .ok_or_else(|| ChannelError::system(channel, "no adapter configured for channel"))
    }

    /// Registered channels in declaration order.
    pub fn channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.adapters.contains_key(c))
            .collect()
    }

    /// Health of every adapter; a failing check is reported as unhealthy.
    pub async fn health(&self) -> Vec<(Channel, HealthStatus)> {
        let mut report = Vec::with_capacity(self.adapters.len());
        for channel in self.channels() {
            let Some(adapter) = self.adapters.get(&channel) else {
                continue;
            };
            let status = match adapter.health_check().await {
                Ok(status) => status,
                Err(e) => HealthStatus::Unhealthy(e.to_string()),
            };
            report.push((channel, status));
        }
        report
    }

    pub async fn shutdown(&self) {
        for (channel, adapter) in &self.adapters {
            if let Err(e) = adapter.shutdown().await {
                warn!(channel = %channel, error = %e, "channel shutdown error");
            }
        }
    }
}
