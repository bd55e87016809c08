// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Top-level coordinator of the inbound and outbound message pipelines.
//!
//! Outbound: validate, record the message and a `queued` delivery, update the
//! thread summary, then hand the message to the channel adapter. A failed
//! send is recorded on the delivery and returned to the caller; it is never
//! reported as sent.
//!
//! Inbound: resolve the thread from the webhook hint, drop replays of a known
//! provider message id, attribute echoes of the host's own messages to the
//! original, and store everything else as a new message.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use concierge_core::types::{
    ActorContext, ChannelCapabilities, Delivery, DeliveryStatus, Direction, Message,
    NewParticipant, OriginRole, OutboundMessage, Participant, ParticipantType, SendReceipt,
    Thread, ThreadStatus,
};
use concierge_core::{
    Channel, ChannelError, ChannelErrorKind, ConciergeError, ContentSanitizer, ConversationStore,
};
use tracing::{debug, error, info, warn};

use crate::content::{preview, validate_content};
use crate::delivery::DeliveryStatusTracker;
use crate::echo::EchoDetector;
use crate::model::{
    Conversation, ConversationEntry, IngestOutcome, ReceiveOutcome, ReceiveRequest, SendRequest,
    ThreadHint, WebhookEvent,
};
use crate::registry::ChannelRegistry;
use crate::resolver::ThreadResolver;
use crate::settings::EngineSettings;

pub struct MessageOrchestrator {
    store: Arc<dyn ConversationStore>,
    resolver: ThreadResolver,
    tracker: DeliveryStatusTracker,
    echo: EchoDetector,
    channels: ChannelRegistry,
    sanitizer: Arc<dyn ContentSanitizer>,
    settings: EngineSettings,
}

impl MessageOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        resolver: ThreadResolver,
        tracker: DeliveryStatusTracker,
        echo: EchoDetector,
        channels: ChannelRegistry,
        sanitizer: Arc<dyn ContentSanitizer>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            resolver,
            tracker,
            echo,
            channels,
            sanitizer,
            settings,
        }
    }

    /// Thread lookup, also used to link unlinked threads to a reservation.
    pub fn resolver(&self) -> &ThreadResolver {
        &self.resolver
    }

    /// Delivery state machine for provider status callbacks.
    pub fn tracker(&self) -> &DeliveryStatusTracker {
        &self.tracker
    }

    /// Registered channel adapters.
    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Settings the engine was built with.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // --- Outbound ---

    /// Records and transmits an outbound message.
    ///
    /// The message is persisted before the adapter is called, so on a
    /// channel failure the caller gets the error while the message and its
    /// `failed` delivery remain visible.
    pub async fn send_message(&self, req: SendRequest) -> Result<Message, ConciergeError> {
        validate_content(
            &req.content,
            self.settings.max_content_chars,
            self.settings.max_content_chars_with_image,
        )?;
        if req.origin_role == OriginRole::Guest {
            return Err(ConciergeError::Validation(
                "guest messages arrive through webhooks and cannot be sent".into(),
            ));
        }

        let thread = self.load_thread(&req.thread_id).await?;
        if let Some(parent_id) = &req.parent_message_id {
            let parent = self
                .store
                .get_message(parent_id)
                .await?
                .ok_or_else(|| ConciergeError::not_found("message", parent_id.as_str()))?;
            if parent.thread_id != thread.id {
                return Err(ConciergeError::Validation(format!(
                    "parent message {parent_id} belongs to another thread"
                )));
            }
        }
        self.resolver.reopen_if_closed(&thread).await?;

        // Stored timestamps keep microseconds.
        let now = Utc::now().trunc_subsecs(6);
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread.id.clone(),
            parent_message_id: req.parent_message_id,
            origin_role: req.origin_role,
            direction: Direction::for_role(req.origin_role),
            channel: req.channel,
            content: req.content,
            is_unsent: false,
            unsent_at: None,
            unsent_by: None,
            created_at: now,
        };
        self.store.insert_message(&message).await?;
        self.tracker.queue(&message.id, message.channel, now).await?;
        self.store
            .update_thread_summary(
                &thread.id,
                now,
                &preview(&message.content, self.settings.preview_chars),
            )
            .await?;

        self.dispatch(&thread, &message).await?;
        Ok(message)
    }

    async fn dispatch(&self, thread: &Thread, message: &Message) -> Result<(), ConciergeError> {
        let channel = message.channel;
        let outbound = self.outbound(thread, message).await?;

        match self.transmit(&outbound).await {
            Ok((receipt, capabilities)) => {
                self.tracker
                    .mark_sent(
                        &message.id,
                        channel,
                        receipt.provider_message_id.as_deref(),
                        Utc::now(),
                    )
                    .await?;
                metrics::counter!("concierge_messages_sent_total", "channel" => channel.to_string())
                    .increment(1);
                info!(
                    thread_id = thread.id.as_str(),
                    message_id = message.id.as_str(),
                    channel = %channel,
                    "message sent"
                );
                if let Some(delay) = capabilities.simulated_delivery_after {
                    self.spawn_simulated_delivery(message.id.clone(), channel, delay);
                }
                Ok(())
            }
            Err(err) => {
                warn!(
                    thread_id = thread.id.as_str(),
                    message_id = message.id.as_str(),
                    channel = %channel,
                    kind = %err.kind,
                    retryable = err.kind.is_retryable(),
                    error = %err.message,
                    "message send failed"
                );
                metrics::counter!(
                    "concierge_send_failures_total",
                    "channel" => channel.to_string(),
                    "kind" => err.kind.to_string()
                )
                .increment(1);
                if let Err(store_err) = self
                    .tracker
                    .mark_failed(&message.id, channel, &err.delivery_message(), Utc::now())
                    .await
                {
                    error!(
                        message_id = message.id.as_str(),
                        error = %store_err,
                        "failed to record delivery failure"
                    );
                }
                Err(err.into())
            }
        }
    }

    async fn transmit(
        &self,
        outbound: &OutboundMessage,
    ) -> Result<(SendReceipt, ChannelCapabilities), ChannelError> {
        let channel = outbound.channel;
        let adapter = self.channels.get(channel)?;
        let capabilities = adapter.capabilities();
        let timeout = self.settings.send_timeout;
        match tokio::time::timeout(timeout, adapter.send(outbound)).await {
            Ok(result) => Ok((result?, capabilities)),
            Err(_) => Err(ChannelError::new(
                ChannelErrorKind::ServerError,
                channel,
                format!("no response within {}s", timeout.as_secs_f32()),
            )),
        }
    }

    async fn outbound(
        &self,
        thread: &Thread,
        message: &Message,
    ) -> Result<OutboundMessage, ConciergeError> {
        let external_thread_id = self
            .store
            .list_thread_channels(&thread.id)
            .await?
            .into_iter()
            .find(|c| c.channel == message.channel)
            .map(|c| c.external_thread_id);
        let recipients = self.store.list_participants(&thread.id).await?;
        Ok(OutboundMessage {
            message_id: message.id.clone(),
            thread_id: thread.id.clone(),
            channel: message.channel,
            content: message.content.clone(),
            reservation_id: thread.reservation_id.clone(),
            external_thread_id,
            parent_message_id: message.parent_message_id.clone(),
            recipients,
        })
    }

    fn spawn_simulated_delivery(&self, message_id: String, channel: Channel, delay: Duration) {
        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match tracker.mark_delivered(&message_id, channel, Utc::now()).await {
                Ok(true) => debug!(message_id = message_id.as_str(), "simulated delivery recorded"),
                Ok(false) => {}
                Err(e) => warn!(
                    message_id = message_id.as_str(),
                    error = %e,
                    "simulated delivery update failed"
                ),
            }
        });
    }

    // --- Inbound ---

    /// Stores a message arriving on a resolved thread.
    ///
    /// A provider message id seen before on the channel yields
    /// [`ReceiveOutcome::Duplicate`] without any write.
    pub async fn receive_message(
        &self,
        req: ReceiveRequest,
    ) -> Result<ReceiveOutcome, ConciergeError> {
        let thread = self.load_thread(&req.thread_id).await?;
        if let Some(duplicate) = self
            .find_duplicate(req.channel, req.provider_message_id.as_deref())
            .await?
        {
            return Ok(duplicate);
        }
        self.resolver.reopen_if_closed(&thread).await?;

        let now = req.received_at.unwrap_or_else(Utc::now).trunc_subsecs(6);
        let message_id = uuid::Uuid::new_v4().to_string();
        let content = match self.sanitizer.process(&req.content, &message_id).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    message_id = message_id.as_str(),
                    error = %e,
                    "content sanitizer failed, storing original content"
                );
                req.content.clone()
            }
        };

        let message = Message {
            id: message_id,
            thread_id: thread.id.clone(),
            parent_message_id: None,
            origin_role: req.origin_role,
            direction: Direction::for_role(req.origin_role),
            channel: req.channel,
            content,
            is_unsent: false,
            unsent_at: None,
            unsent_by: None,
            created_at: now,
        };
        let delivery = Delivery {
            message_id: message.id.clone(),
            channel: req.channel,
            status: DeliveryStatus::Delivered,
            queued_at: now,
            sent_at: None,
            delivered_at: Some(now),
            read_at: None,
            provider_message_id: req.provider_message_id.clone(),
            error_message: None,
        };
        if !self
            .store
            .insert_message_with_delivery(&message, &delivery)
            .await?
        {
            // A concurrent replay recorded the provider id first.
            if let Some(duplicate) = self
                .find_duplicate(req.channel, req.provider_message_id.as_deref())
                .await?
            {
                return Ok(duplicate);
            }
            return Err(ConciergeError::Internal(format!(
                "message {} was neither stored nor found as a duplicate",
                message.id
            )));
        }

        self.store
            .update_thread_summary(
                &thread.id,
                now,
                &preview(&message.content, self.settings.preview_chars),
            )
            .await?;
        metrics::counter!("concierge_messages_received_total", "channel" => req.channel.to_string())
            .increment(1);
        info!(
            thread_id = thread.id.as_str(),
            message_id = message.id.as_str(),
            channel = %req.channel,
            "message received"
        );
        Ok(ReceiveOutcome::Created(message))
    }

    /// Full inbound pipeline for one webhook event.
    ///
    /// A replayed provider message id is answered before thread resolution,
    /// so a duplicate never reopens, re-points or enriches a thread. Events
    /// without a provider id that match a recent outbound message are
    /// suppressed without a backfill.
    pub async fn ingest_webhook(
        &self,
        event: WebhookEvent,
    ) -> Result<IngestOutcome, ConciergeError> {
        if let Some(ReceiveOutcome::Duplicate { message_id }) = self
            .find_duplicate(event.channel, event.provider_message_id.as_deref())
            .await?
        {
            let original = self
                .store
                .get_message(&message_id)
                .await?
                .ok_or_else(|| ConciergeError::not_found("message", message_id.as_str()))?;
            return Ok(IngestOutcome::Duplicate {
                thread_id: original.thread_id,
                message_id,
            });
        }

        let thread = match &event.thread_hint {
            ThreadHint::Reservation(reservation_id) => {
                self.resolver
                    .resolve(reservation_id, &event.thread_init)
                    .await?
            }
            ThreadHint::ExternalThread(external_thread_id) => {
                self.resolver
                    .resolve_external(event.channel, external_thread_id, &event.thread_init)
                    .await?
            }
        };

        if self.echo.applies_to(event.sender_role) {
            match event.provider_message_id.as_deref() {
                Some(provider_message_id) => {
                    if let Some(message_id) = self
                        .echo
                        .claim_echo(
                            &thread.id,
                            event.channel,
                            &event.content,
                            provider_message_id,
                            event.timestamp,
                        )
                        .await?
                    {
                        count_suppressed_echo(event.channel);
                        return Ok(IngestOutcome::EchoBackfilled {
                            thread_id: thread.id,
                            message_id,
                        });
                    }
                }
                None => {
                    if let Some(original) = self
                        .echo
                        .find_recent_outbound_echo(&thread.id, &event.content, event.timestamp)
                        .await?
                    {
                        info!(
                            thread_id = thread.id.as_str(),
                            message_id = original.id.as_str(),
                            channel = %event.channel,
                            "echo without provider id suppressed"
                        );
                        count_suppressed_echo(event.channel);
                        return Ok(IngestOutcome::EchoSuppressed {
                            thread_id: thread.id,
                            message_id: original.id,
                        });
                    }
                }
            }
        }

        let outcome = self
            .receive_message(ReceiveRequest {
                thread_id: thread.id.clone(),
                channel: event.channel,
                content: event.content,
                origin_role: event.sender_role,
                provider_message_id: event.provider_message_id,
                received_at: Some(event.timestamp),
            })
            .await?;
        Ok(match outcome {
            ReceiveOutcome::Created(message) => IngestOutcome::Created {
                thread_id: thread.id,
                message,
            },
            ReceiveOutcome::Duplicate { message_id } => IngestOutcome::Duplicate {
                thread_id: thread.id,
                message_id,
            },
        })
    }

    async fn find_duplicate(
        &self,
        channel: Channel,
        provider_message_id: Option<&str>,
    ) -> Result<Option<ReceiveOutcome>, ConciergeError> {
        let Some(provider_message_id) = provider_message_id else {
            return Ok(None);
        };
        let Some(existing) = self
            .store
            .find_delivery_by_provider_message_id(channel, provider_message_id)
            .await?
        else {
            return Ok(None);
        };
        metrics::counter!("concierge_webhook_duplicates_total", "channel" => channel.to_string())
            .increment(1);
        debug!(
            channel = %channel,
            provider_message_id,
            message_id = existing.message_id.as_str(),
            "duplicate provider message ignored"
        );
        Ok(Some(ReceiveOutcome::Duplicate {
            message_id: existing.message_id,
        }))
    }

    // --- Threads and participants ---

    /// Explicit status change along open <-> closed <-> archived.
    pub async fn set_thread_status(
        &self,
        thread_id: &str,
        to: ThreadStatus,
    ) -> Result<Thread, ConciergeError> {
        let thread = self.load_thread(thread_id).await?;
        if thread.status == to {
            return Ok(thread);
        }
        if !thread.status.can_transition_to(to) {
            return Err(ConciergeError::Conflict(format!(
                "thread {thread_id} cannot move from {} to {to}",
                thread.status
            )));
        }
        if !self
            .store
            .update_thread_status(thread_id, &[thread.status], to)
            .await?
        {
            return Err(ConciergeError::Conflict(format!(
                "thread {thread_id} changed status concurrently"
            )));
        }
        info!(thread_id, from = %thread.status, to = %to, "thread status changed");
        self.load_thread(thread_id).await
    }

    /// The thread with its channels, participants and every message in
    /// chronological order, each paired with its per-channel deliveries.
    ///
    /// Unsent messages are included; rendering decides how to show them.
    pub async fn conversation(&self, thread_id: &str) -> Result<Conversation, ConciergeError> {
        let thread = self.load_thread(thread_id).await?;
        let channels = self.store.list_thread_channels(thread_id).await?;
        let participants = self.store.list_participants(thread_id).await?;
        let messages = self.store.list_messages(thread_id).await?;

        let mut entries = Vec::with_capacity(messages.len());
        for message in messages {
            let deliveries = self.store.list_deliveries(&message.id).await?;
            entries.push(ConversationEntry {
                message,
                deliveries,
            });
        }
        Ok(Conversation {
            thread,
            channels,
            participants,
            entries,
        })
    }

    /// Adds a participant to an existing thread. Fails with `NotFound` for an
    /// unknown thread.
    pub async fn add_participant(
        &self,
        thread_id: &str,
        participant: NewParticipant,
    ) -> Result<Participant, ConciergeError> {
        let thread = self.load_thread(thread_id).await?;
        let participant = Participant {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread.id,
            participant_type: participant.participant_type,
            external_address: participant.external_address,
            display_name: participant.display_name,
            last_read_at: None,
        };
        self.store.add_participant(&participant).await?;
        Ok(participant)
    }

    /// Moves the participant's read marker forward to `at`.
    pub async fn mark_read(
        &self,
        thread_id: &str,
        participant_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, ConciergeError> {
        self.load_participant(thread_id, participant_id).await?;
        self.store.mark_participant_read(participant_id, at).await
    }

    /// Messages from the other side of the conversation that are not unsent
    /// and newer than the participant's read marker.
    pub async fn unread_count(
        &self,
        thread_id: &str,
        participant_id: &str,
    ) -> Result<usize, ConciergeError> {
        let participant = self.load_participant(thread_id, participant_id).await?;
        let unread_direction = match participant.participant_type {
            ParticipantType::Host => Direction::Incoming,
            ParticipantType::Guest => Direction::Outgoing,
        };
        let messages = self.store.list_messages(thread_id).await?;
        Ok(messages
            .iter()
            .filter(|m| m.direction == unread_direction && !m.is_unsent)
            .filter(|m| participant.last_read_at.is_none_or(|read| m.created_at > read))
            .count())
    }

    // --- Unsend ---

    /// Tombstones a message on behalf of `actor`.
    ///
    /// Fails with 404 for an unknown message, 409 when it is already unsent
    /// and 403 when the actor's role does not own the message, the channel
    /// does not allow unsending or the window has elapsed.
    pub async fn unsend_message(
        &self,
        actor: &ActorContext,
        message_id: &str,
    ) -> Result<Message, ConciergeError> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or_else(|| ConciergeError::not_found("message", message_id))?;
        if message.is_unsent {
            return Err(ConciergeError::Conflict(format!(
                "message {message_id} is already unsent"
            )));
        }
        if !self.store.capabilities().unsend {
            return Err(ConciergeError::Permission(
                "unsending is not available on this store".into(),
            ));
        }
        if !role_owns(actor.role, message.origin_role) {
            return Err(ConciergeError::Permission(format!(
                "a {} cannot unsend a {} message",
                actor.role, message.origin_role
            )));
        }
        if !self.settings.unsend_channels.contains(&message.channel) {
            return Err(ConciergeError::Permission(format!(
                "messages on {} cannot be unsent",
                message.channel
            )));
        }
        if actor.issued_at - message.created_at > self.settings.unsend_window {
            return Err(ConciergeError::Permission(format!(
                "the unsend window of {} minutes has elapsed",
                self.settings.unsend_window.num_minutes()
            )));
        }

        if !self
            .store
            .mark_unsent(message_id, &actor.id, actor.issued_at)
            .await?
        {
            return Err(ConciergeError::Conflict(format!(
                "message {message_id} is already unsent"
            )));
        }
        info!(
            message_id,
            actor_id = actor.id.as_str(),
            role = %actor.role,
            "message unsent"
        );
        self.store
            .get_message(message_id)
            .await?
            .ok_or_else(|| ConciergeError::not_found("message", message_id))
    }

    async fn load_thread(&self, thread_id: &str) -> Result<Thread, ConciergeError> {
        self.store
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| ConciergeError::not_found("thread", thread_id))
    }

    async fn load_participant(
        &self,
        thread_id: &str,
        participant_id: &str,
    ) -> Result<Participant, ConciergeError> {
        self.load_thread(thread_id).await?;
        self.store
            .list_participants(thread_id)
            .await?
            .into_iter()
            .find(|p| p.id == participant_id)
            .ok_or_else(|| ConciergeError::not_found("participant", participant_id))
    }
}

fn count_suppressed_echo(channel: Channel) {
    metrics::counter!(
        "concierge_echoes_suppressed_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// Hosts also answer for assistant drafts; every other role only for itself.
fn role_owns(actor: OriginRole, origin: OriginRole) -> bool {
    match actor {
        OriginRole::Host => matches!(origin, OriginRole::Host | OriginRole::Assistant),
        other => other == origin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsend_ownership() {
        assert!(role_owns(OriginRole::Host, OriginRole::Host));
        assert!(role_owns(OriginRole::Host, OriginRole::Assistant));
        assert!(role_owns(OriginRole::Guest, OriginRole::Guest));
        assert!(!role_owns(OriginRole::Guest, OriginRole::Host));
        assert!(!role_owns(OriginRole::Host, OriginRole::Guest));
        assert!(!role_owns(OriginRole::Host, OriginRole::System));
        assert!(role_owns(OriginRole::System, OriginRole::System));
    }
}
