// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Email and SMS channels through the HTTP relay.
//!
//! The relay takes a recipient address and a body; the guest participant's
//! `external_address` (email address or phone number) is the recipient.

use std::time::Duration;

use async_trait::async_trait;
use concierge_config::model::RelayConfig;
use concierge_core::types::{ChannelCapabilities, OutboundMessage, ParticipantType, SendReceipt};
use concierge_core::{
    AdapterType, Channel, ChannelAdapter, ChannelError, ConciergeError, HealthStatus, PluginAdapter,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::http::{build_client, normalize_base_url, post_json, probe};

#[derive(Debug, Serialize)]
struct RelaySendRequest<'a> {
    to: &'a str,
    body: &'a str,
    message_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RelaySendResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Email or SMS adapter.
pub struct RelayChannel {
    channel: Channel,
    client: reqwest::Client,
    base_url: String,
}

impl RelayChannel {
    pub fn new(
        channel: Channel,
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ConciergeError> {
        if !matches!(channel, Channel::Email | Channel::Sms) {
            return Err(ConciergeError::Config(format!(
                "{channel} is not served by the relay"
            )));
        }
        Ok(Self {
            channel,
            client: build_client(api_key, timeout)?,
            base_url: normalize_base_url(base_url),
        })
    }

    /// Email and SMS adapters from configuration; empty when no base URL is set.
    pub fn from_config(config: &RelayConfig) -> Result<Vec<Self>, ConciergeError> {
        let Some(url) = config.base_url.as_deref() else {
            return Ok(Vec::new());
        };
        let timeout = Duration::from_secs(config.timeout_secs);
        [Channel::Email, Channel::Sms]
            .into_iter()
            .map(|channel| Self::new(channel, url, config.api_key.as_deref(), timeout))
            .collect()
    }
}

#[async_trait]
impl PluginAdapter for RelayChannel {
    fn name(&self) -> &str {
        match self.channel {
            Channel::Email => "relay-email",
            _ => "relay-sms",
        }
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ConciergeError> {
        let url = format!("{}/v1/health", self.base_url);
        Ok(probe(&self.client, &url).await)
    }

    async fn shutdown(&self) -> Result<(), ConciergeError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for RelayChannel {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities::default()
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<SendReceipt, ChannelError> {
        let recipient = msg
            .recipients
            .iter()
            .filter(|p| p.participant_type == ParticipantType::Guest)
            .find_map(|p| p.external_address.as_deref());
        let Some(to) = recipient else {
            return Err(ChannelError::system(
                self.channel,
                format!("thread {} has no guest {} address", msg.thread_id, self.channel),
            ));
        };

        let url = format!("{}/v1/{}/send", self.base_url, self.channel);
        let body = RelaySendRequest {
            to,
            body: &msg.content,
            message_id: &msg.message_id,
            reference: msg.reservation_id.as_deref(),
        };

        let response: Option<RelaySendResponse> = post_json(&self.client, self.channel, &url, &body)
            .await
            .inspect_err(|e| {
                warn!(
                    channel = %self.channel,
                    message_id = %msg.message_id,
                    kind = %e.kind,
                    error = %e.message,
                    "relay send failed"
                );
            })?;

        debug!(channel = %self.channel, message_id = %msg.message_id, "relay send accepted");
        Ok(SendReceipt {
            provider_message_id: response.and_then(|r| r.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::ChannelErrorKind;
    use concierge_core::types::Participant;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn participant(kind: ParticipantType, address: Option<&str>) -> Participant {
        Participant {
            id: format!("p-{kind}"),
            thread_id: "t1".into(),
            participant_type: kind,
            external_address: address.map(str::to_string),
            display_name: None,
            last_read_at: None,
        }
    }

    fn outbound(channel: Channel, recipients: Vec<Participant>) -> OutboundMessage {
        OutboundMessage {
            message_id: "m1".into(),
            thread_id: "t1".into(),
            channel,
            content: "Your room is ready".into(),
            reservation_id: Some("R1".into()),
            external_thread_id: None,
            parent_message_id: None,
            recipients,
        }
    }

    #[tokio::test]
    async fn sms_goes_to_guest_address() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sms/send"))
            .and(body_partial_json(serde_json::json!({
                "to": "+15550100",
                "body": "Your room is ready"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "sms-1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let channel =
            RelayChannel::new(Channel::Sms, &server.uri(), None, Duration::from_secs(2)).unwrap();
        let recipients = vec![
            participant(ParticipantType::Host, Some("+15550999")),
            participant(ParticipantType::Guest, Some("+15550100")),
        ];
        let receipt = channel.send(&outbound(Channel::Sms, recipients)).await.unwrap();
        assert_eq!(receipt.provider_message_id.as_deref(), Some("sms-1"));
    }

    #[tokio::test]
    async fn missing_guest_address_is_system_error() {
        let channel = RelayChannel::new(
            Channel::Email,
            "http://localhost:1",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        let recipients = vec![participant(ParticipantType::Guest, None)];
        let err = channel.send(&outbound(Channel::Email, recipients)).await.unwrap_err();
        assert_eq!(err.kind, ChannelErrorKind::System);
    }

    #[tokio::test]
    async fn rate_limit_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/email/send"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let channel =
            RelayChannel::new(Channel::Email, &server.uri(), None, Duration::from_secs(2))
                .unwrap();
        let recipients = vec![participant(ParticipantType::Guest, Some("guest@example.com"))];
        let err = channel.send(&outbound(Channel::Email, recipients)).await.unwrap_err();
        assert_eq!(err.kind, ChannelErrorKind::RateLimited);
        assert!(err.kind.is_retryable());
    }

    #[test]
    fn config_without_base_url_builds_nothing() {
        assert!(RelayChannel::from_config(&RelayConfig::default()).unwrap().is_empty());

        let config = RelayConfig {
            base_url: Some("https://relay.example.com/".into()),
            api_key: Some("k".into()),
            timeout_secs: 5,
        };
        let channels = RelayChannel::from_config(&config).unwrap();
        let kinds: Vec<_> = channels.iter().map(|c| c.channel()).collect();
        assert_eq!(kinds, vec![Channel::Email, Channel::Sms]);
    }

    #[test]
    fn ota_channels_are_rejected() {
        assert!(
            RelayChannel::new(Channel::Airbnb, "http://x", None, Duration::from_secs(1)).is_err()
        );
    }
}
