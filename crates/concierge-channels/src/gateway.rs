// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OTA channels (Airbnb, Booking.com, Vrbo, Expedia) routed through the
//! shared upstream messaging gateway.
//!
//! All four channels share one [`OtaGateway`] and therefore one connection
//! pool. A send needs the provider-side conversation id recorded in
//! `thread_channels`; without it the adapter fails with a `system` error
//! before touching the network.

use std::time::Duration;

use async_trait::async_trait;
use concierge_config::model::GatewayConfig;
use concierge_core::types::{ChannelCapabilities, OutboundMessage, SendReceipt};
use concierge_core::{
    AdapterType, Channel, ChannelAdapter, ChannelError, ConciergeError, HealthStatus, PluginAdapter,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::http::{build_client, normalize_base_url, post_json, probe};

/// Connection to the OTA gateway shared by every OTA channel.
#[derive(Debug, Clone)]
pub struct OtaGateway {
    client: reqwest::Client,
    base_url: String,
}

impl OtaGateway {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ConciergeError> {
        Ok(Self {
            client: build_client(api_key, timeout)?,
            base_url: normalize_base_url(base_url),
        })
    }

    /// Build the gateway from configuration; `None` when no base URL is set.
    pub fn from_config(config: &GatewayConfig) -> Result<Option<Self>, ConciergeError> {
        config
            .base_url
            .as_deref()
            .map(|url| {
                Self::new(
                    url,
                    config.api_key.as_deref(),
                    Duration::from_secs(config.timeout_secs),
                )
            })
            .transpose()
    }

    /// Adapter for one OTA channel on this gateway.
    pub fn channel(&self, channel: Channel) -> Result<OtaGatewayChannel, ConciergeError> {
        if !channel.is_ota() {
            return Err(ConciergeError::Config(format!(
                "{channel} is not routed through the OTA gateway"
            )));
        }
        Ok(OtaGatewayChannel {
            channel,
            name: format!("gateway-{channel}"),
            gateway: self.clone(),
        })
    }

    /// Adapters for every OTA channel.
    pub fn all_channels(&self) -> Vec<OtaGatewayChannel> {
        Channel::ALL
            .into_iter()
            .filter(|c| c.is_ota())
            .map(|channel| OtaGatewayChannel {
                channel,
                name: format!("gateway-{channel}"),
                gateway: self.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct GatewaySendRequest<'a> {
    message_id: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reservation_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GatewaySendResponse {
    #[serde(default)]
    message_id: Option<String>,
}

/// One OTA channel on the shared gateway.
pub struct OtaGatewayChannel {
    channel: Channel,
    name: String,
    gateway: OtaGateway,
}

#[async_trait]
impl PluginAdapter for OtaGatewayChannel {
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
        let url = format!("{}/v1/health", self.gateway.base_url);
        Ok(probe(&self.gateway.client, &url).await)
    }

    async fn shutdown(&self) -> Result<(), ConciergeError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for OtaGatewayChannel {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            requires_external_thread: true,
            supports_unsend: false,
            simulated_delivery_after: None,
        }
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<SendReceipt, ChannelError> {
        let Some(external_thread_id) = msg.external_thread_id.as_deref() else {
            return Err(ChannelError::system(
                self.channel,
                format!("thread {} has no {} conversation id", msg.thread_id, self.channel),
            ));
        };

        let url = format!(
            "{}/v1/channels/{}/conversations/{}/messages",
            self.gateway.base_url, self.channel, external_thread_id
        );
        let body = GatewaySendRequest {
            message_id: &msg.message_id,
            content: &msg.content,
            reservation_id: msg.reservation_id.as_deref(),
            reply_to: msg.parent_message_id.as_deref(),
        };

        let response: Option<GatewaySendResponse> =
            post_json(&self.gateway.client, self.channel, &url, &body)
                .await
                .inspect_err(|e| {
                    warn!(
                        channel = %self.channel,
                        message_id = %msg.message_id,
                        kind = %e.kind,
                        error = %e.message,
                        "gateway send failed"
                    );
                })?;

        let provider_message_id = response.and_then(|r| r.message_id);
        debug!(
            channel = %self.channel,
            message_id = %msg.message_id,
            provider_message_id = ?provider_message_id,
            "gateway send accepted"
        );
        Ok(SendReceipt {
            provider_message_id,
        })
    }
}
