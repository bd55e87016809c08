// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapters for the Concierge messaging engine.
//!
//! - [`InAppChannel`]: messages stored in the conversation itself.
//! - [`OtaGatewayChannel`]: Airbnb, Booking.com, Vrbo and Expedia through one
//!   upstream gateway.
//! - [`RelayChannel`]: email and SMS through an HTTP relay.
//!
//! Provider failures are normalized by [`classify`] into the shared
//! [`ChannelErrorKind`](concierge_core::ChannelErrorKind) taxonomy.
//! Adapters never retry.

pub mod classify;
pub mod gateway;
mod http;
pub mod inapp;
pub mod relay;

use std::sync::Arc;
use std::time::Duration;

use concierge_config::ConciergeConfig;
use concierge_core::{ChannelAdapter, ConciergeError};
use tracing::info;

pub use gateway::{OtaGateway, OtaGatewayChannel};
pub use inapp::InAppChannel;
pub use relay::RelayChannel;

/// Every adapter enabled by the configuration.
///
/// In-app is always available; OTA channels need `[gateway] base_url` and
/// email/SMS need `[relay] base_url`.
pub fn channels_from_config(
    config: &ConciergeConfig,
) -> Result<Vec<Arc<dyn ChannelAdapter>>, ConciergeError> {
    let mut channels: Vec<Arc<dyn ChannelAdapter>> = vec![Arc::new(InAppChannel::new(
        Duration::from_millis(config.messaging.inapp_delivery_delay_ms),
    ))];

    if let Some(gateway) = OtaGateway::from_config(&config.gateway)? {
        for channel in gateway.all_channels() {
            channels.push(Arc::new(channel));
        }
    }

    for relay in RelayChannel::from_config(&config.relay)? {
        channels.push(Arc::new(relay));
    }

    info!(
        channels = ?channels.iter().map(|c| c.channel().to_string()).collect::<Vec<_>>(),
        "channel adapters configured"
    );
    Ok(channels)
}
