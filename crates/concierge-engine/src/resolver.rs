// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical thread lookup for reservations and external conversations.
//!
//! Resolution order for a reservation: a thread of any sibling in the same
//! group booking, a thread of the reservation itself, a thread already mapped
//! to one of the supplied external conversations, and finally a new thread.
//! Creation is guarded by the store against every reservation of the group,
//! so concurrent first messages for two siblings converge on one thread.

use std::sync::Arc;

use chrono::Utc;
use concierge_core::types::{
    ChannelMapping, GroupBooking, Participant, Thread, ThreadChannel, ThreadInit, ThreadInsert,
    ThreadPriority, ThreadStatus,
};
use concierge_core::{Channel, ConciergeError, ConversationStore, GroupBookingResolver};
use tracing::{debug, info, warn};

const UNLINKED_SUBJECT: &str = "Unlinked conversation";

/// Finds or creates the single canonical thread of a reservation group.
#[derive(Clone)]
pub struct ThreadResolver {
    store: Arc<dyn ConversationStore>,
    groups: Arc<dyn GroupBookingResolver>,
}

impl ThreadResolver {
    pub fn new(store: Arc<dyn ConversationStore>, groups: Arc<dyn GroupBookingResolver>) -> Self {
        Self { store, groups }
    }

    /// The canonical thread for `reservation_id`, created if none exists.
    pub async fn resolve(
        &self,
        reservation_id: &str,
        init: &ThreadInit,
    ) -> Result<Thread, ConciergeError> {
        let group = self.groups.group_of(reservation_id).await?;

        if let Some(group) = &group {
            let threads = self
                .store
                .find_threads_by_reservation_ids(&group.reservation_ids)
                .await?;
            if let Some(thread) = pick_canonical(reservation_id, threads) {
                debug!(
                    reservation_id,
                    thread_id = thread.id.as_str(),
                    "resolved thread through group booking"
                );
                return self.adopt(thread, init).await;
            }
        }

        let direct = self
            .store
            .find_threads_by_reservation_ids(&[reservation_id.to_string()])
            .await?;
        if let Some(thread) = pick_canonical(reservation_id, direct) {
            return self.adopt(thread, init).await;
        }

        for mapping in &init.channels {
            let Some(thread) = self
                .store
                .find_thread_by_channel_mapping(mapping.channel, &mapping.external_thread_id)
                .await?
            else {
                continue;
            };
            info!(
                thread_id = thread.id.as_str(),
                from = thread.reservation_id.as_deref().unwrap_or("none"),
                to = reservation_id,
                channel = %mapping.channel,
                "re-pointing thread to reservation"
            );
            self.store
                .update_thread_reservation(&thread.id, Some(reservation_id))
                .await?;
            return self.adopt(thread, init).await;
        }

        self.create(reservation_id, group.as_ref(), init).await
    }

    /// The thread mapped to an external conversation, or a new unlinked one.
    pub async fn resolve_external(
        &self,
        channel: Channel,
        external_thread_id: &str,
        init: &ThreadInit,
    ) -> Result<Thread, ConciergeError> {
        if let Some(thread) = self
            .store
            .find_thread_by_channel_mapping(channel, external_thread_id)
            .await?
        {
            return self.adopt(thread, init).await;
        }

        let thread = new_thread(
            None,
            init.subject.clone().unwrap_or_else(|| UNLINKED_SUBJECT.to_string()),
            init.priority,
        );
        let thread = self.store.insert_thread(&thread, &[]).await?.into_thread();
        let mapped = self
            .store
            .add_thread_channel(&ThreadChannel {
                thread_id: thread.id.clone(),
                channel,
                external_thread_id: external_thread_id.to_string(),
                created_at: Utc::now(),
            })
            .await?;
        if !mapped {
            // Lost the race for this conversation; the new thread stays empty.
            warn!(
                orphan_thread_id = thread.id.as_str(),
                channel = %channel,
                external_thread_id,
                "external conversation mapped concurrently"
            );
            let winner = self
                .store
                .find_thread_by_channel_mapping(channel, external_thread_id)
                .await?
                .ok_or_else(|| ConciergeError::not_found("thread mapping", external_thread_id))?;
            return self.adopt(winner, init).await;
        }

        info!(
            thread_id = thread.id.as_str(),
            channel = %channel,
            external_thread_id,
            "created unlinked thread"
        );
        self.attach(&thread, init).await?;
        Ok(thread)
    }

    /// Points a thread at a reservation and clears `needs_linking`.
    ///
    /// Fails with `Conflict` when another thread already serves the
    /// reservation or any sibling in its group booking.
    pub async fn link_reservation(
        &self,
        thread_id: &str,
        reservation_id: &str,
    ) -> Result<Thread, ConciergeError> {
        self.store
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| ConciergeError::not_found("thread", thread_id))?;
        let reservation_ids = match self.groups.group_of(reservation_id).await? {
            Some(group) => group.reservation_ids,
            None => vec![reservation_id.to_string()],
        };
        let existing = self
            .store
            .find_threads_by_reservation_ids(&reservation_ids)
            .await?;
        if let Some(other) = existing.iter().find(|t| t.id != thread_id) {
            warn!(
                thread_id,
                reservation_id,
                existing_thread_id = other.id.as_str(),
                "reservation already has a thread"
            );
            return Err(ConciergeError::Conflict(format!(
                "reservation {reservation_id} is already served by thread {}",
                other.id
            )));
        }
        self.store
            .update_thread_reservation(thread_id, Some(reservation_id))
            .await?;
        info!(thread_id, reservation_id, "thread linked to reservation");
        self.refetch(thread_id).await
    }

    /// Reopens a closed thread. Archived threads stay archived.
    pub async fn reopen_if_closed(&self, thread: &Thread) -> Result<bool, ConciergeError> {
        if thread.status != ThreadStatus::Closed {
            return Ok(false);
        }
        let reopened = self
            .store
            .update_thread_status(&thread.id, &[ThreadStatus::Closed], ThreadStatus::Open)
            .await?;
        if reopened {
            info!(thread_id = thread.id.as_str(), "thread reopened by new activity");
        }
        Ok(reopened)
    }

    async fn create(
        &self,
        reservation_id: &str,
        group: Option<&GroupBooking>,
        init: &ThreadInit,
    ) -> Result<Thread, ConciergeError> {
        let subject = init
            .subject
            .clone()
            .unwrap_or_else(|| default_subject(reservation_id, group));
        let thread = new_thread(Some(reservation_id.to_string()), subject, init.priority);
        let guard = match group {
            Some(g) => g.reservation_ids.clone(),
            None => vec![reservation_id.to_string()],
        };

        match self.store.insert_thread(&thread, &guard).await? {
            ThreadInsert::Created(thread) => {
                info!(
                    thread_id = thread.id.as_str(),
                    reservation_id,
                    "created thread"
                );
                self.attach(&thread, init).await?;
                Ok(thread)
            }
            ThreadInsert::Existing(thread) => {
                debug!(
                    thread_id = thread.id.as_str(),
                    reservation_id,
                    "thread created concurrently, adopting it"
                );
                self.adopt(thread, init).await
            }
        }
    }

    /// Reopens and enriches an existing thread, then returns its current row.
    async fn adopt(&self, thread: Thread, init: &ThreadInit) -> Result<Thread, ConciergeError> {
        self.reopen_if_closed(&thread).await?;
        self.merge_channels(&thread.id, &init.channels).await?;
        self.refetch(&thread.id).await
    }

    async fn attach(&self, thread: &Thread, init: &ThreadInit) -> Result<(), ConciergeError> {
        self.merge_channels(&thread.id, &init.channels).await?;
        if init.participants.is_empty() {
            return Ok(());
        }
        if !self.store.capabilities().participants {
            debug!(
                thread_id = thread.id.as_str(),
                "participants not supported by store, skipping"
            );
            return Ok(());
        }
        for p in &init.participants {
            self.store
                .add_participant(&Participant {
                    id: uuid::Uuid::new_v4().to_string(),
                    thread_id: thread.id.clone(),
                    participant_type: p.participant_type,
                    external_address: p.external_address.clone(),
                    display_name: p.display_name.clone(),
                    last_read_at: None,
                })
                .await?;
        }
        Ok(())
    }

    /// Adds mappings the thread does not have yet, compared by
    /// (channel, external id).
    async fn merge_channels(
        &self,
        thread_id: &str,
        mappings: &[ChannelMapping],
    ) -> Result<(), ConciergeError> {
        if mappings.is_empty() {
            return Ok(());
        }
        let existing = self.store.list_thread_channels(thread_id).await?;
        for mapping in mappings {
            let known = existing.iter().any(|c| {
                c.channel == mapping.channel && c.external_thread_id == mapping.external_thread_id
            });
            if known {
                continue;
            }
            let added = self
                .store
                .add_thread_channel(&ThreadChannel {
                    thread_id: thread_id.to_string(),
                    channel: mapping.channel,
                    external_thread_id: mapping.external_thread_id.clone(),
                    created_at: Utc::now(),
                })
                .await?;
            if !added {
                warn!(
                    thread_id,
                    channel = %mapping.channel,
                    external_thread_id = mapping.external_thread_id.as_str(),
                    "external conversation already mapped to another thread"
                );
            }
        }
        Ok(())
    }

    async fn refetch(&self, thread_id: &str) -> Result<Thread, ConciergeError> {
        self.store
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| ConciergeError::not_found("thread", thread_id))
    }
}

/// Newest thread wins; more than one is a data anomaly left for manual merge.
fn pick_canonical(reservation_id: &str, threads: Vec<Thread>) -> Option<Thread> {
    if threads.len() > 1 {
        let ids: Vec<&str> = threads.iter().map(|t| t.id.as_str()).collect();
        warn!(
            reservation_id,
            thread_ids = ?ids,
            canonical = ids[0],
            "multiple threads for one reservation group, manual merge required"
        );
    }
    threads.into_iter().next()
}

fn default_subject(reservation_id: &str, group: Option<&GroupBooking>) -> String {
    match group {
        Some(g) if g.master_reservation_id == reservation_id && g.room_count() > 1 => {
            format!("Group booking {reservation_id} ({} rooms)", g.room_count())
        }
        _ => format!("Reservation {reservation_id}"),
    }
}

fn new_thread(
    reservation_id: Option<String>,
    subject: String,
    priority: Option<ThreadPriority>,
) -> Thread {
    let now = Utc::now();
    Thread {
        id: uuid::Uuid::new_v4().to_string(),
        needs_linking: reservation_id.is_none(),
        reservation_id,
        subject,
        status: ThreadStatus::Open,
        priority: priority.unwrap_or_default(),
        last_message_at: None,
        last_message_preview: None,
        created_at: now,
        updated_at: now,
    }
}
