// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-app channel.
//!
//! Messages live only in the conversation store, so sending is a no-op that
//! always succeeds. There is no provider acknowledgement: the adapter asks
//! the engine to mark the delivery `delivered` after a short delay instead.

use std::time::Duration;

use async_trait::async_trait;
use concierge_core::types::{ChannelCapabilities, OutboundMessage, SendReceipt};
use concierge_core::{
    AdapterType, Channel, ChannelAdapter, ChannelError, ConciergeError, HealthStatus, PluginAdapter,
};
use tracing::debug;

pub struct InAppChannel {
    delivery_delay: Duration,
}

impl InAppChannel {
    pub fn new(delivery_delay: Duration) -> Self {
        Self { delivery_delay }
    }
}

#[async_trait]
impl PluginAdapter for InAppChannel {
    fn name(&self) -> &str {
        "inapp"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ConciergeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ConciergeError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for InAppChannel {
    fn channel(&self) -> Channel {
        Channel::InApp
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            requires_external_thread: false,
            supports_unsend: true,
            simulated_delivery_after: Some(self.delivery_delay),
        }
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<SendReceipt, ChannelError> {
        debug!(message_id = %msg.message_id, thread_id = %msg.thread_id, "in-app message stored");
        Ok(SendReceipt {
            provider_message_id: None,
        })
    }
}
