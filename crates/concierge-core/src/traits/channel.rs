// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for guest messaging providers (in-app, email, SMS, OTAs).

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Channel, ChannelCapabilities, OutboundMessage, SendReceipt};

/// Transmits rendered messages through one external provider.
///
/// Adapters are stateless apart from credentials and never retry: every
/// failure is returned as a categorized [`ChannelError`] and the caller
/// decides what happens next.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// The channel this adapter serves.
    fn channel(&self) -> Channel;

    /// Returns the capabilities supported by this channel.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Sends a message through the channel.
    async fn send(&self, msg: &OutboundMessage) -> Result<SendReceipt, ChannelError>;
}
