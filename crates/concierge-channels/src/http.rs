// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared HTTP plumbing for the gateway and relay adapters.

use std::time::Duration;

use concierge_core::{Channel, ChannelError, ConciergeError, HealthStatus};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::classify::{classify_status, classify_transport};

/// Build a client with bearer authentication and a request timeout.
pub(crate) fn build_client(
    api_key: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, ConciergeError> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key {
        let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| ConciergeError::Config(format!("invalid API key header value: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| ConciergeError::Config(format!("failed to build HTTP client: {e}")))
}

/// Trim a configured base URL so paths can be appended with `/`.
pub(crate) fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// POST `body` as JSON and decode a successful response.
///
/// A success response whose body does not decode yields `None`; the send
/// itself still succeeded.
pub(crate) async fn post_json<B, R>(
    client: &reqwest::Client,
    channel: Channel,
    url: &str,
    body: &B,
) -> Result<Option<R>, ChannelError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| classify_transport(channel, &e))?;

    let status = response.status();
    debug!(%channel, status = %status, "provider response received");
    let text = response
        .text()
        .await
        .map_err(|e| classify_transport(channel, &e))?;

    if !status.is_success() {
        return Err(classify_status(channel, status, &text));
    }

    match serde_json::from_str::<R>(&text) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            debug!(%channel, error = %e, "provider response body not understood");
            Ok(None)
        }
    }
}

/// GET a health endpoint and map the result to a [`HealthStatus`].
pub(crate) async fn probe(client: &reqwest::Client, url: &str) -> HealthStatus {
    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => HealthStatus::Healthy,
        Ok(response) => {
            HealthStatus::Degraded(format!("health endpoint returned {}", response.status()))
        }
        Err(e) => HealthStatus::Unhealthy(format!("health endpoint unreachable: {e}")),
    }
}
