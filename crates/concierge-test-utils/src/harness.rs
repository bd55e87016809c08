// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` wires the complete engine over a temp SQLite store with
//! mock channels and in-memory collaborators, and exposes every component
//! for assertions.

use std::collections::HashMap;
use std::sync::Arc;

use concierge_config::model::ConciergeConfig;
use concierge_core::types::{Message, Thread, ThreadInit};
use concierge_core::{Channel, ChannelAdapter, ConciergeError, ContentSanitizer, ConversationStore};
use concierge_engine::{
    ChannelRegistry, Engine, MessageOrchestrator, PassthroughSanitizer, PlaceholderRenderer,
    ScheduledDispatcher,
};
use concierge_storage::SqliteStore;

use crate::collaborators::StaticGroupBookings;
use crate::mock_channel::MockChannel;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: ConciergeConfig,
    channels: Vec<MockChannel>,
    groups: StaticGroupBookings,
    sanitizer: Option<Arc<dyn ContentSanitizer>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: ConciergeConfig::default(),
            channels: Vec::new(),
            groups: StaticGroupBookings::new(),
            sanitizer: None,
        }
    }

    /// Adjust the configuration; the database path is always replaced.
    pub fn configure(mut self, f: impl FnOnce(&mut ConciergeConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Register a mock channel. Without any, an in-app mock is registered.
    pub fn with_channel(mut self, channel: MockChannel) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_group(mut self, master: &str, members: &[&str]) -> Self {
        self.groups = self.groups.with_group(master, members);
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn ContentSanitizer>) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    pub fn with_template(mut self, id: &str, text: &str) -> Self {
        self.config.templates.insert(id.to_string(), text.to_string());
        self
    }

    /// Build the test harness on a fresh temp database.
    pub async fn build(self) -> Result<TestHarness, ConciergeError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| ConciergeError::StoreUnavailable {
            source: Box::new(e),
        })?;
        let mut config = self.config;
        config.storage.database_path = temp_dir
            .path()
            .join("concierge-test.db")
            .to_string_lossy()
            .into_owned();

        let store = Arc::new(SqliteStore::open(config.storage.clone()).await?);

        let mocks = if self.channels.is_empty() {
            vec![MockChannel::new(Channel::InApp)]
        } else {
            self.channels
        };
        let mut channels = HashMap::new();
        let mut registry = ChannelRegistry::new();
        for mock in mocks {
            let mock = Arc::new(mock);
            registry.register(mock.clone() as Arc<dyn ChannelAdapter>);
            channels.insert(mock.channel(), mock);
        }

        let sanitizer = self
            .sanitizer
            .unwrap_or_else(|| Arc::new(PassthroughSanitizer) as Arc<dyn ContentSanitizer>);
        let engine = Engine::new(
            store.clone(),
            Arc::new(self.groups),
            registry,
            sanitizer,
            Arc::new(PlaceholderRenderer::new(config.templates.clone())),
            &config,
        )?;

        Ok(TestHarness {
            store,
            engine,
            channels,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock channels and temp storage.
pub struct TestHarness {
    /// SQLite store (temp DB, cleaned up on drop).
    pub store: Arc<SqliteStore>,
    pub engine: Engine,
    channels: HashMap<Channel, Arc<MockChannel>>,
    pub config: ConciergeConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn orchestrator(&self) -> &MessageOrchestrator {
        &self.engine.orchestrator
    }

    pub fn dispatcher(&self) -> &ScheduledDispatcher {
        &self.engine.dispatcher
    }

    /// The mock registered for `channel`.
    ///
    /// # Panics
    ///
    /// Panics when no mock was registered for `channel`.
    pub fn channel(&self, channel: Channel) -> Arc<MockChannel> {
        match self.channels.get(&channel) {
            Some(mock) => mock.clone(),
            None => panic!("no mock channel registered for {channel}"),
        }
    }

    /// Resolve (or create) the thread of a reservation.
    pub async fn thread_for(&self, reservation_id: &str) -> Result<Thread, ConciergeError> {
        self.orchestrator()
            .resolver()
            .resolve(reservation_id, &ThreadInit::default())
            .await
    }

    pub async fn messages(&self, thread_id: &str) -> Result<Vec<Message>, ConciergeError> {
        self.store.list_messages(thread_id).await
    }

    pub async fn thread(&self, thread_id: &str) -> Result<Thread, ConciergeError> {
        self.store
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| ConciergeError::not_found("thread", thread_id))
    }
}
