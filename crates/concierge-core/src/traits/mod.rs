// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams of the engine.
//!
//! Channel and storage backends extend the [`PluginAdapter`] base trait; the
//! collaborators owned by other systems (group bookings, content sanitizing,
//! template rendering) are plain `#[async_trait]` traits injected into the
//! engine at construction.

pub mod adapter;
pub mod channel;
pub mod collaborators;
pub mod store;

pub use adapter::PluginAdapter;
pub use channel::ChannelAdapter;
pub use collaborators::{ContentSanitizer, GroupBookingResolver, TemplateRenderer};
pub use store::ConversationStore;
