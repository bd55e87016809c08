// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter` with a queue of scripted send
//! results and captures every outbound message for assertions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use concierge_core::traits::adapter::PluginAdapter;
use concierge_core::traits::channel::ChannelAdapter;
use concierge_core::types::{
    AdapterType, ChannelCapabilities, HealthStatus, OutboundMessage, SendReceipt,
};
use concierge_core::{Channel, ChannelError, ChannelErrorKind, ConciergeError};

/// A mock channel for testing.
///
/// Each `send()` pops the next scripted result; with an empty script it
/// succeeds without a provider id. Every call is captured, failed ones
/// included.
pub struct MockChannel {
    channel: Channel,
    name: String,
    capabilities: ChannelCapabilities,
    delay: Option<Duration>,
    script: Arc<Mutex<VecDeque<Result<SendReceipt, ChannelError>>>>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl MockChannel {
    /// Create a mock for `channel` with default capabilities and an empty script.
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            name: format!("mock-{channel}"),
            capabilities: ChannelCapabilities::default(),
            delay: None,
            script: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ChannelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Make every send wait before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue the result of a future `send()`.
    pub async fn push_result(&self, result: Result<SendReceipt, ChannelError>) {
        self.script.lock().await.push_back(result);
    }

    /// The next send succeeds with `provider_message_id`.
    pub async fn succeed_next_with(&self, provider_message_id: &str) {
        self.push_result(Ok(SendReceipt {
            provider_message_id: Some(provider_message_id.to_string()),
        }))
        .await;
    }

    /// The next send fails with `kind`.
    pub async fn fail_next(&self, kind: ChannelErrorKind, message: &str) {
        self.push_result(Err(ChannelError::new(kind, self.channel, message)))
            .await;
    }

    /// Get all messages passed to `send()`.
    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        &self.name
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
impl ChannelAdapter for MockChannel {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn capabilities(&self) -> ChannelCapabilities {
        self.capabilities.clone()
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<SendReceipt, ChannelError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().await.push(msg.clone());
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(SendReceipt::default()))
    }
}
