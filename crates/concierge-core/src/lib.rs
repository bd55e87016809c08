// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Concierge guest messaging engine.
//!
//! This crate provides the domain types, the error taxonomy and the trait
//! seams (channel adapters, the conversation store, external collaborators)
//! used throughout the Concierge workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ChannelError, ChannelErrorKind, ConciergeError};
pub use types::{AdapterType, Channel, HealthStatus};

pub use traits::{
    ChannelAdapter, ContentSanitizer, ConversationStore, GroupBookingResolver, PluginAdapter,
    TemplateRenderer,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concierge_error_has_all_variants() {
        let _validation = ConciergeError::Validation("test".into());
        let _not_found = ConciergeError::not_found("thread", "t1");
        let _conflict = ConciergeError::Conflict("test".into());
        let _permission = ConciergeError::Permission("test".into());
        let _channel = ConciergeError::Channel(ChannelError::system(Channel::InApp, "test"));
        let _store = ConciergeError::StoreUnavailable {
            source: Box::new(std::io::Error::other("test")),
        };
        let _config = ConciergeError::Config("test".into());
        let _internal = ConciergeError::Internal("test".into());
    }

    #[test]
    fn channel_error_converts_into_concierge_error() {
        let err: ConciergeError = ChannelError::system(Channel::Sms, "no recipient").into();
        assert!(matches!(
            err,
            ConciergeError::Channel(ref e) if e.kind == ChannelErrorKind::System
        ));
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        let degraded = HealthStatus::Degraded("slow".into());
        let unhealthy = HealthStatus::Unhealthy("down".into());

        assert_eq!(healthy, HealthStatus::Healthy);
        assert_ne!(degraded, healthy);
        assert_ne!(unhealthy, healthy);
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_channel_adapter<T: ChannelAdapter>() {}
        fn _assert_store<T: ConversationStore>() {}
        fn _assert_group<T: GroupBookingResolver>() {}
        fn _assert_sanitizer<T: ContentSanitizer>() {}
        fn _assert_renderer<T: TemplateRenderer>() {}
    }
}
