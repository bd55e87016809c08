// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`ConversationStore`] and
//! [`GroupBookingResolver`] traits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use concierge_config::model::StorageConfig;
use concierge_core::types::{
    Channel, Delivery, DeliveryTransition, GroupBooking, Message, Participant, ScheduledMessage,
    ScheduledStatus, StoreCapabilities, Thread, ThreadChannel, ThreadInsert, ThreadStatus,
};
use concierge_core::{
    AdapterType, ConciergeError, ConversationStore, GroupBookingResolver, HealthStatus,
    PluginAdapter,
};

use crate::database::{Database, OpenOptions};
use crate::queries;

/// SQLite-backed conversation store.
///
/// Wraps a [`Database`] handle and delegates every operation to the typed
/// query modules. The database is opened by [`SqliteStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a store for the given configuration without opening it.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Create and initialize a store in one step.
    pub async fn open(config: StorageConfig) -> Result<Self, ConciergeError> {
        let store = Self::new(config);
        store.initialize().await?;
        Ok(store)
    }

    /// Open the database, run migrations and detect capabilities.
    pub async fn initialize(&self) -> Result<(), ConciergeError> {
        let options = OpenOptions::from(&self.config);
        let db = Database::open_with(&self.config.database_path, options).await?;
        self.db
            .set(db)
            .map_err(|_| ConciergeError::Internal("storage already initialized".into()))?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    /// Returns the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, ConciergeError> {
        self.db.get().ok_or_else(|| ConciergeError::StoreUnavailable {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    /// Runs SQLite's integrity check over the whole file.
    pub async fn integrity_check(&self) -> Result<Vec<String>, ConciergeError> {
        self.db()?.integrity_check().await
    }

    /// Mirror a group-booking link from the property-management system.
    pub async fn link_reservation_to_group(
        &self,
        reservation_id: &str,
        master_reservation_id: &str,
    ) -> Result<(), ConciergeError> {
        queries::groups::link_reservation_to_group(
            self.db()?,
            reservation_id,
            master_reservation_id,
        )
        .await
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ConciergeError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;

        let caps = db.capabilities();
        if caps == (StoreCapabilities { unsend: true, participants: true, scheduling: true }) {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(format!(
                "schema lacks features: unsend={} participants={} scheduling={}",
                caps.unsend, caps.participants, caps.scheduling
            )))
        }
    }

    async fn shutdown(&self) -> Result<(), ConciergeError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn capabilities(&self) -> StoreCapabilities {
        self.db
            .get()
            .map(Database::capabilities)
            .unwrap_or_default()
    }

    // --- Threads ---

    async fn insert_thread(
        &self,
        thread: &Thread,
        guard_reservation_ids: &[String],
    ) -> Result<ThreadInsert, ConciergeError> {
        queries::threads::insert_thread(self.db()?, thread, guard_reservation_ids).await
    }

    async fn get_thread(&self, id: &str) -> Result<Option<Thread>, ConciergeError> {
        queries::threads::get_thread(self.db()?, id).await
    }

    async fn update_thread_status(
        &self,
        id: &str,
        from: &[ThreadStatus],
        to: ThreadStatus,
    ) -> Result<bool, ConciergeError> {
        queries::threads::update_thread_status(self.db()?, id, from, to).await
    }

    async fn update_thread_summary(
        &self,
        id: &str,
        last_message_at: DateTime<Utc>,
        preview: &str,
    ) -> Result<(), ConciergeError> {
        queries::threads::update_thread_summary(self.db()?, id, last_message_at, preview).await
    }

    async fn update_thread_reservation(
        &self,
        id: &str,
        reservation_id: Option<&str>,
    ) -> Result<(), ConciergeError> {
        queries::threads::update_thread_reservation(self.db()?, id, reservation_id).await
    }

    async fn find_threads_by_reservation_ids(
        &self,
        reservation_ids: &[String],
    ) -> Result<Vec<Thread>, ConciergeError> {
        queries::threads::find_threads_by_reservation_ids(self.db()?, reservation_ids).await
    }

    async fn find_thread_by_channel_mapping(
        &self,
        channel: Channel,
        external_thread_id: &str,
    ) -> Result<Option<Thread>, ConciergeError> {
        queries::threads::find_thread_by_channel_mapping(self.db()?, channel, external_thread_id)
            .await
    }

    async fn add_thread_channel(&self, mapping: &ThreadChannel) -> Result<bool, ConciergeError> {
        queries::threads::add_thread_channel(self.db()?, mapping).await
    }

    async fn list_thread_channels(
        &self,
        thread_id: &str,
    ) -> Result<Vec<ThreadChannel>, ConciergeError> {
        queries::threads::list_thread_channels(self.db()?, thread_id).await
    }

    // --- Participants ---

    async fn add_participant(&self, participant: &Participant) -> Result<(), ConciergeError> {
        queries::participants::add_participant(self.db()?, participant).await
    }

    async fn list_participants(&self, thread_id: &str) -> Result<Vec<Participant>, ConciergeError> {
        queries::participants::list_participants(self.db()?, thread_id).await
    }

    async fn mark_participant_read(
        &self,
        participant_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, ConciergeError> {
        queries::participants::mark_participant_read(self.db()?, participant_id, at).await
    }

    // --- Messages ---

    async fn insert_message(&self, message: &Message) -> Result<(), ConciergeError> {
        queries::messages::insert_message(self.db()?, message).await
    }

    async fn insert_message_with_delivery(
        &self,
        message: &Message,
        delivery: &Delivery,
    ) -> Result<bool, ConciergeError> {
        queries::messages::insert_message_with_delivery(self.db()?, message, delivery).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, ConciergeError> {
        queries::messages::get_message(self.db()?, id).await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, ConciergeError> {
        queries::messages::list_messages(self.db()?, thread_id).await
    }

    async fn mark_unsent(
        &self,
        id: &str,
        unsent_by: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, ConciergeError> {
        queries::messages::mark_unsent(self.db()?, id, unsent_by, at).await
    }

    async fn find_recent_outbound_by_content_and_window(
        &self,
        thread_id: &str,
        content: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Message>, ConciergeError> {
        queries::messages::find_recent_outbound_by_content_and_window(
            self.db()?,
            thread_id,
            content,
            since,
        )
        .await
    }

    // --- Deliveries ---

    async fn upsert_delivery(&self, delivery: &Delivery) -> Result<Delivery, ConciergeError> {
        queries::deliveries::upsert_delivery(self.db()?, delivery).await
    }

    async fn get_delivery(
        &self,
        message_id: &str,
        channel: Channel,
    ) -> Result<Option<Delivery>, ConciergeError> {
        queries::deliveries::get_delivery(self.db()?, message_id, channel).await
    }

    async fn list_deliveries(&self, message_id: &str) -> Result<Vec<Delivery>, ConciergeError> {
        queries::deliveries::list_deliveries(self.db()?, message_id).await
    }

    async fn apply_delivery_transition(
        &self,
        transition: &DeliveryTransition,
    ) -> Result<bool, ConciergeError> {
        queries::deliveries::apply_delivery_transition(self.db()?, transition).await
    }

    async fn conditional_backfill_provider_id(
        &self,
        message_id: &str,
        channel: Channel,
        provider_message_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, ConciergeError> {
        queries::deliveries::conditional_backfill_provider_id(
            self.db()?,
            message_id,
            channel,
            provider_message_id,
            at,
        )
        .await
    }

    async fn find_delivery_by_provider_message_id(
        &self,
        channel: Channel,
        provider_message_id: &str,
    ) -> Result<Option<Delivery>, ConciergeError> {
        queries::deliveries::find_delivery_by_provider_message_id(
            self.db()?,
            channel,
            provider_message_id,
        )
        .await
    }

    // --- Scheduled messages ---

    async fn insert_scheduled_message(
        &self,
        scheduled: &ScheduledMessage,
    ) -> Result<(), ConciergeError> {
        queries::scheduled::insert_scheduled_message(self.db()?, scheduled).await
    }

    async fn get_scheduled_message(
        &self,
        id: &str,
    ) -> Result<Option<ScheduledMessage>, ConciergeError> {
        queries::scheduled::get_scheduled_message(self.db()?, id).await
    }

    async fn claim_due_scheduled_messages(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Vec<ScheduledMessage>, ConciergeError> {
        queries::scheduled::claim_due_scheduled_messages(self.db()?, now, limit, worker_id, lease)
            .await
    }

    async fn renew_scheduled_lease(
        &self,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<bool, ConciergeError> {
        queries::scheduled::renew_scheduled_lease(self.db()?, id, worker_id, now, lease).await
    }

    async fn complete_scheduled_message(
        &self,
        id: &str,
        worker_id: &str,
        status: ScheduledStatus,
        last_error: Option<&str>,
    ) -> Result<bool, ConciergeError> {
        queries::scheduled::complete_scheduled_message(
            self.db()?,
            id,
            worker_id,
            status,
            last_error,
        )
        .await
    }
}

#[async_trait]
impl GroupBookingResolver for SqliteStore {
    async fn group_of(&self, reservation_id: &str) -> Result<Option<GroupBooking>, ConciergeError> {
        queries::groups::group_of(self.db()?, reservation_id).await
    }
}
