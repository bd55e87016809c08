// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime settings derived from the validated configuration.

use std::str::FromStr;
use std::time::Duration;

use concierge_config::model::ConciergeConfig;
use concierge_core::{Channel, ConciergeError};

/// Tunables of the message pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub max_content_chars: usize,
    pub max_content_chars_with_image: usize,
    pub preview_chars: usize,
    pub send_timeout: Duration,
    pub echo_window: chrono::Duration,
    pub echo_host_role_only: bool,
    pub unsend_window: chrono::Duration,
    pub unsend_channels: Vec<Channel>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_content_chars: 1000,
            max_content_chars_with_image: 10_000,
            preview_chars: 160,
            send_timeout: Duration::from_secs(15),
            echo_window: chrono::Duration::minutes(10),
            echo_host_role_only: false,
            unsend_window: chrono::Duration::minutes(15),
            unsend_channels: vec![Channel::InApp],
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &ConciergeConfig) -> Result<Self, ConciergeError> {
        let unsend_channels = config
            .unsend
            .allowed_channels
            .iter()
            .map(|name| {
                Channel::from_str(name).map_err(|_| {
                    ConciergeError::Config(format!(
                        "unsend.allowed_channels contains unknown channel `{name}`"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            max_content_chars: config.messaging.max_content_chars,
            max_content_chars_with_image: config.messaging.max_content_chars_with_image,
            preview_chars: config.messaging.preview_chars,
            send_timeout: Duration::from_secs(config.messaging.send_timeout_secs),
            echo_window: chrono::Duration::minutes(config.echo.window_minutes),
            echo_host_role_only: config.echo.host_role_only,
            unsend_window: chrono::Duration::minutes(config.unsend.window_minutes),
            unsend_channels,
        })
    }
}

/// Tunables of the scheduled-message dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub lease: Duration,
    pub worker_id: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            batch_size: 25,
            poll_interval: Duration::from_secs(30),
            lease: Duration::from_secs(600),
            worker_id: random_worker_id(),
        }
    }
}

impl SchedulerSettings {
    pub fn from_config(config: &ConciergeConfig) -> Self {
        let scheduler = &config.scheduler;
        Self {
            batch_size: scheduler.batch_size,
            poll_interval: Duration::from_secs(scheduler.poll_interval_secs),
            lease: Duration::from_secs(scheduler.lease_secs),
            worker_id: scheduler
                .worker_id
                .clone()
                .unwrap_or_else(random_worker_id),
        }
    }
}

fn random_worker_id() -> String {
    format!("dispatcher-{}", uuid::Uuid::new_v4())
}
