// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Normalization of HTTP provider failures into [`ChannelErrorKind`].
//!
//! Every HTTP-backed adapter funnels its failures through these two
//! functions so the same provider response is categorized identically on
//! every channel.

use concierge_core::{Channel, ChannelError, ChannelErrorKind};
use reqwest::StatusCode;

/// Longest provider body excerpt kept in an error message.
const MAX_BODY_EXCERPT: usize = 300;

/// Category of a non-success HTTP status.
pub fn kind_for_status(status: StatusCode) -> ChannelErrorKind {
    match status.as_u16() {
        401 | 403 => ChannelErrorKind::Auth,
        404 => ChannelErrorKind::NotFound,
        429 => ChannelErrorKind::RateLimited,
        500..=599 => ChannelErrorKind::ServerError,
        _ => ChannelErrorKind::Unknown,
    }
}

/// Build the error for a provider that answered with a non-success status.
pub fn classify_status(channel: Channel, status: StatusCode, body: &str) -> ChannelError {
    let body = body.trim();
    let message = if body.is_empty() {
        format!("provider returned {status}")
    } else {
        format!("provider returned {status}: {}", excerpt(body))
    };
    ChannelError::new(kind_for_status(status), channel, message)
}

/// Build the error for a request that never produced a response.
///
/// Timeouts are reported as `server_error`: the provider may or may not have
/// accepted the message, and the caller must not treat it as sent.
pub fn classify_transport(channel: Channel, err: &reqwest::Error) -> ChannelError {
    if err.is_timeout() {
        ChannelError::new(
            ChannelErrorKind::ServerError,
            channel,
            format!("request timed out: {err}"),
        )
    } else {
        ChannelError::new(
            ChannelErrorKind::Unknown,
            channel,
            format!("request failed: {err}"),
        )
    }
}

fn excerpt(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_EXCERPT {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX_BODY_EXCERPT).collect();
        format!("{cut}...")
    }
}
