// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relational store operations required by the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ConciergeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Channel, Delivery, DeliveryTransition, Message, Participant, ScheduledMessage,
    ScheduledStatus, StoreCapabilities, Thread, ThreadChannel, ThreadInsert, ThreadStatus,
};

/// Durable, transactional store behind the engine.
///
/// Every method is a single atomic operation. Cross-component coordination
/// goes exclusively through these calls, so any number of engine instances
/// can share one store.
#[async_trait]
pub trait ConversationStore: PluginAdapter {
    /// Schema features detected when the store was opened.
    fn capabilities(&self) -> StoreCapabilities;

    // --- Threads ---

    /// Inserts `thread` unless a thread already exists for any of
    /// `guard_reservation_ids`, in which case the most recently created one is
    /// returned untouched.
    async fn insert_thread(
        &self,
        thread: &Thread,
        guard_reservation_ids: &[String],
    ) -> Result<ThreadInsert, ConciergeError>;

    async fn get_thread(&self, id: &str) -> Result<Option<Thread>, ConciergeError>;

    /// Sets `to` only when the current status is one of `from`. Returns
    /// whether a row changed.
    async fn update_thread_status(
        &self,
        id: &str,
        from: &[ThreadStatus],
        to: ThreadStatus,
    ) -> Result<bool, ConciergeError>;

    async fn update_thread_summary(
        &self,
        id: &str,
        last_message_at: DateTime<Utc>,
        preview: &str,
    ) -> Result<(), ConciergeError>;

    /// Re-points a thread at a reservation; `needs_linking` follows
    /// `reservation_id.is_none()`.
    async fn update_thread_reservation(
        &self,
        id: &str,
        reservation_id: Option<&str>,
    ) -> Result<(), ConciergeError>;

    /// Threads whose `reservation_id` is in `reservation_ids`, newest first.
    async fn find_threads_by_reservation_ids(
        &self,
        reservation_ids: &[String],
    ) -> Result<Vec<Thread>, ConciergeError>;

    async fn find_thread_by_channel_mapping(
        &self,
        channel: Channel,
        external_thread_id: &str,
    ) -> Result<Option<Thread>, ConciergeError>;

    /// Adds a mapping; returns `false` when the (channel, external id) pair
    /// was already mapped.
    async fn add_thread_channel(&self, mapping: &ThreadChannel) -> Result<bool, ConciergeError>;

    async fn list_thread_channels(&self, thread_id: &str)
    -> Result<Vec<ThreadChannel>, ConciergeError>;

    // --- Participants ---

    async fn add_participant(&self, participant: &Participant) -> Result<(), ConciergeError>;

    async fn list_participants(&self, thread_id: &str) -> Result<Vec<Participant>, ConciergeError>;

    async fn mark_participant_read(
        &self,
        participant_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, ConciergeError>;

    // --- Messages ---

    async fn insert_message(&self, message: &Message) -> Result<(), ConciergeError>;

    /// Inserts a message together with its first delivery in one transaction.
    /// Nothing is written, and `false` returned, when the delivery carries a
    /// provider id already recorded on the same channel.
    async fn insert_message_with_delivery(
        &self,
        message: &Message,
        delivery: &Delivery,
    ) -> Result<bool, ConciergeError>;

    async fn get_message(&self, id: &str) -> Result<Option<Message>, ConciergeError>;

    /// Messages of a thread in chronological order.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, ConciergeError>;

    /// Tombstones a message. Returns `false` if it was already unsent.
    async fn mark_unsent(
        &self,
        id: &str,
        unsent_by: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, ConciergeError>;

    /// Outgoing host messages in `thread_id` with exactly `content`, created at
    /// or after `since`, that still have a delivery without a provider id.
    /// Newest first.
    async fn find_recent_outbound_by_content_and_window(
        &self,
        thread_id: &str,
        content: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Message>, ConciergeError>;

    // --- Deliveries ---

    /// Inserts the delivery if no row exists for (message, channel) and
    /// returns the stored row.
    async fn upsert_delivery(&self, delivery: &Delivery) -> Result<Delivery, ConciergeError>;

    async fn get_delivery(
        &self,
        message_id: &str,
        channel: Channel,
    ) -> Result<Option<Delivery>, ConciergeError>;

    async fn list_deliveries(&self, message_id: &str) -> Result<Vec<Delivery>, ConciergeError>;

    /// Applies a conditional status change in one atomic update. Returns
    /// whether the precondition held.
    async fn apply_delivery_transition(
        &self,
        transition: &DeliveryTransition,
    ) -> Result<bool, ConciergeError>;

    /// Claims the delivery of (message, channel) for an echoed provider id
    /// with a `provider_message_id IS NULL` compare-and-set. When the message
    /// has no delivery on `channel` at all, one is recorded as delivered.
    /// Returns `false` if another writer already claimed it.
    async fn conditional_backfill_provider_id(
        &self,
        message_id: &str,
        channel: Channel,
        provider_message_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, ConciergeError>;

    async fn find_delivery_by_provider_message_id(
        &self,
        channel: Channel,
        provider_message_id: &str,
    ) -> Result<Option<Delivery>, ConciergeError>;

    // --- Scheduled messages ---

    async fn insert_scheduled_message(
        &self,
        scheduled: &ScheduledMessage,
    ) -> Result<(), ConciergeError>;

    async fn get_scheduled_message(
        &self,
        id: &str,
    ) -> Result<Option<ScheduledMessage>, ConciergeError>;

    /// Exclusively claims up to `limit` queued rows due at `now` for
    /// `worker_id`. Rows claimed by another worker stay invisible until
    /// their lease expires.
    async fn claim_due_scheduled_messages(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        worker_id: &str,
        lease: std::time::Duration,
    ) -> Result<Vec<ScheduledMessage>, ConciergeError>;

    /// Extends `worker_id`'s live claim on `id` to `now + lease`. Returns
    /// false when the claim expired or passed to another worker.
    async fn renew_scheduled_lease(
        &self,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lease: std::time::Duration,
    ) -> Result<bool, ConciergeError>;

    /// Records the outcome and releases the claim. Returns false when
    /// `worker_id` no longer holds it.
    async fn complete_scheduled_message(
        &self,
        id: &str,
        worker_id: &str,
        status: ScheduledStatus,
        last_error: Option<&str>,
    ) -> Result<bool, ConciergeError>;
}
