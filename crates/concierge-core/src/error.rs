// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Concierge messaging engine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::types::Channel;

/// The primary error type used across all Concierge components.
///
/// Validation, not-found, conflict and permission errors are deterministic and
/// are surfaced to callers unmodified. Channel errors are recorded on the
/// delivery record *and* returned, so a failed send is never reported as a
/// success.
#[derive(Debug, Error)]
pub enum ConciergeError {
    /// Bad caller input (content length, missing required fields).
    #[error("validation error: {0}")]
    Validation(String),

    /// A thread, message, mapping or other entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The operation conflicts with current state (already unsent, illegal status change).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The acting party is not allowed to perform the operation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// An external channel rejected or failed a send.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The backing store could not be reached or a query failed.
    #[error("store unavailable: {source}")]
    StoreUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors detected at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConciergeError {
    /// Shorthand for [`ConciergeError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// HTTP-style status code surfaced to user-facing callers.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Permission(_) => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict(_) => 409,
            Self::Channel(_) => 502,
            Self::StoreUnavailable { .. } => 503,
            Self::Config(_) | Self::Internal(_) => 500,
        }
    }
}

/// Normalized failure categories reported by every channel adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelErrorKind {
    /// Local precondition failed (missing thread, missing external booking id).
    System,
    /// Provider rejected our credentials.
    Auth,
    /// Remote booking or conversation unknown to the provider.
    NotFound,
    /// Provider throttled the request.
    RateLimited,
    /// Provider returned a 5xx or the request timed out.
    ServerError,
    /// Anything we could not classify.
    Unknown,
}

impl ChannelErrorKind {
    /// Whether an operator may reasonably retry the send later.
    ///
    /// `Auth` is retryable only after a credential refresh; `RateLimited` and
    /// `ServerError` after backoff. The engine itself never retries.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Auth | Self::RateLimited | Self::ServerError)
    }

    /// Human-readable description used as the prefix of delivery error messages.
    pub fn describe(self) -> &'static str {
        match self {
            Self::System => "system error",
            Self::Auth => "authentication error",
            Self::NotFound => "not found",
            Self::RateLimited => "rate limited",
            Self::ServerError => "server error",
            Self::Unknown => "unknown error",
        }
    }
}

/// A categorized failure from a channel adapter.
#[derive(Debug, Clone, Error)]
#[error("{channel} send failed ({}): {message}", kind.describe())]
pub struct ChannelError {
    pub kind: ChannelErrorKind,
    pub channel: Channel,
    pub message: String,
}

impl ChannelError {
    pub fn new(kind: ChannelErrorKind, channel: Channel, message: impl Into<String>) -> Self {
        Self {
            kind,
            channel,
            message: message.into(),
        }
    }

    pub fn system(channel: Channel, message: impl Into<String>) -> Self {
        Self::new(ChannelErrorKind::System, channel, message)
    }

    /// The text stored in `deliveries.error_message`.
    pub fn delivery_message(&self) -> String {
        format!("{}: {}", self.kind.describe(), self.message)
    }
}
