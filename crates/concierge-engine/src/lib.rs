// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message orchestration engine for Concierge.
//!
//! Composes the per-concern components behind the inbound and outbound
//! message pipelines:
//! - [`ThreadResolver`] finds the canonical thread of a reservation group
//! - [`DeliveryStatusTracker`] advances per-channel delivery records
//! - [`EchoDetector`] attributes provider echoes to the original message
//! - [`MessageOrchestrator`] runs send, receive and webhook ingestion
//! - [`ScheduledDispatcher`] replays due scheduled messages as host sends
//!
//! Every component talks to the shared [`ConversationStore`]; none of them
//! keeps mutable state of its own.

pub mod content;
pub mod delivery;
pub mod echo;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod render;
pub mod resolver;
pub mod scheduler;
pub mod settings;

use std::sync::Arc;

use concierge_config::model::ConciergeConfig;
use concierge_core::{
    ConciergeError, ContentSanitizer, ConversationStore, GroupBookingResolver, TemplateRenderer,
};

pub use delivery::DeliveryStatusTracker;
pub use echo::EchoDetector;
pub use model::{
    Conversation, ConversationEntry, IngestOutcome, ReceiveOutcome, ReceiveRequest, SendRequest,
    ThreadHint, WebhookEvent,
};
pub use orchestrator::MessageOrchestrator;
pub use registry::ChannelRegistry;
pub use render::{PassthroughSanitizer, PlaceholderRenderer};
pub use resolver::ThreadResolver;
pub use scheduler::{DispatchReport, NewScheduledMessage, ScheduledDispatcher};
pub use settings::{EngineSettings, SchedulerSettings};

/// Fully wired engine over one store.
pub struct Engine {
    pub orchestrator: Arc<MessageOrchestrator>,
    pub dispatcher: Arc<ScheduledDispatcher>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        groups: Arc<dyn GroupBookingResolver>,
        channels: ChannelRegistry,
        sanitizer: Arc<dyn ContentSanitizer>,
        renderer: Arc<dyn TemplateRenderer>,
        config: &ConciergeConfig,
    ) -> Result<Self, ConciergeError> {
        Ok(Self::with_settings(
            store,
            groups,
            channels,
            sanitizer,
            renderer,
            EngineSettings::from_config(config)?,
            SchedulerSettings::from_config(config),
        ))
    }

    pub fn with_settings(
        store: Arc<dyn ConversationStore>,
        groups: Arc<dyn GroupBookingResolver>,
        channels: ChannelRegistry,
        sanitizer: Arc<dyn ContentSanitizer>,
        renderer: Arc<dyn TemplateRenderer>,
        settings: EngineSettings,
        scheduler: SchedulerSettings,
    ) -> Self {
        let resolver = ThreadResolver::new(store.clone(), groups);
        let tracker = DeliveryStatusTracker::new(store.clone());
        let echo = EchoDetector::new(
            store.clone(),
            settings.echo_window,
            settings.echo_host_role_only,
        );
        let orchestrator = Arc::new(MessageOrchestrator::new(
            store.clone(),
            resolver,
            tracker,
            echo,
            channels,
            sanitizer,
            settings,
        ));
        let dispatcher = Arc::new(ScheduledDispatcher::new(
            store,
            orchestrator.clone(),
            renderer,
            scheduler,
        ));
        Self {
            orchestrator,
            dispatcher,
        }
    }
}
