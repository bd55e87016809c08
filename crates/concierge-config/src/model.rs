// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so that typos are reported
//! at startup instead of silently falling back to defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level Concierge configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConciergeConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Content limits and send behaviour.
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Echo suppression heuristics.
    #[serde(default)]
    pub echo: EchoConfig,

    /// Unsend policy.
    #[serde(default)]
    pub unsend: UnsendConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Shared upstream gateway for OTA channels.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// HTTP relay for email and SMS.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Template id -> template text with `{{key}}` placeholders.
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "concierge".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Apply embedded migrations on open. When disabled, the schema is
    /// inspected and missing features are reported as capabilities.
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
            run_migrations: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("concierge").join("concierge.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("concierge.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessagingConfig {
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    /// Limit applied when the content carries an inline image reference.
    #[serde(default = "default_max_content_chars_with_image")]
    pub max_content_chars_with_image: usize,

    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Upper bound on a single channel adapter call.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Delay before an in-app delivery is marked delivered.
    #[serde(default = "default_inapp_delivery_delay_ms")]
    pub inapp_delivery_delay_ms: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            max_content_chars: default_max_content_chars(),
            max_content_chars_with_image: default_max_content_chars_with_image(),
            preview_chars: default_preview_chars(),
            send_timeout_secs: default_send_timeout_secs(),
            inapp_delivery_delay_ms: default_inapp_delivery_delay_ms(),
        }
    }
}

fn default_max_content_chars() -> usize {
    1000
}

fn default_max_content_chars_with_image() -> usize {
    10_000
}

fn default_preview_chars() -> usize {
    160
}

fn default_send_timeout_secs() -> u64 {
    15
}

fn default_inapp_delivery_delay_ms() -> u64 {
    1500
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EchoConfig {
    /// Trailing window in which an inbound event may match an outbound message.
    #[serde(default = "default_echo_window_minutes")]
    pub window_minutes: i64,

    /// Only treat host-attributed webhook events as echo candidates.
    #[serde(default)]
    pub host_role_only: bool,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_echo_window_minutes(),
            host_role_only: false,
        }
    }
}

fn default_echo_window_minutes() -> i64 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UnsendConfig {
    #[serde(default = "default_unsend_window_minutes")]
    pub window_minutes: i64,

    /// Channel names on which messages may be unsent.
    #[serde(default = "default_unsend_channels")]
    pub allowed_channels: Vec<String>,
}

impl Default for UnsendConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_unsend_window_minutes(),
            allowed_channels: default_unsend_channels(),
        }
    }
}

fn default_unsend_window_minutes() -> i64 {
    15
}

fn default_unsend_channels() -> Vec<String> {
    vec!["inapp".to_string()]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum rows claimed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How long a claim stays exclusive before another worker may take it.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    /// Stable worker identity; a random one is generated when unset.
    #[serde(default)]
    pub worker_id: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            lease_secs: default_lease_secs(),
            worker_id: None,
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    25
}

fn default_lease_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the OTA gateway. `None` disables the OTA channels.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Base URL of the email/SMS relay. `None` disables both channels.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_http_timeout_secs() -> u64 {
    10
}
