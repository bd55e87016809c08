// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recognizes webhook events that reflect the host's own outbound message.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use concierge_core::types::{Message, OriginRole};
use concierge_core::{Channel, ConciergeError, ConversationStore};
use tracing::{debug, info};

/// Matches inbound events against recent outbound host messages and claims
/// the original delivery for the echoed provider id.
#[derive(Clone)]
pub struct EchoDetector {
    store: Arc<dyn ConversationStore>,
    window: chrono::Duration,
    host_role_only: bool,
}

impl EchoDetector {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        window: chrono::Duration,
        host_role_only: bool,
    ) -> Self {
        Self {
            store,
            window,
            host_role_only,
        }
    }

    pub fn window(&self) -> chrono::Duration {
        self.window
    }

    /// Whether an event attributed to `sender_role` may be an echo.
    ///
    /// Several providers attribute the echo to the guest, so every role is a
    /// candidate unless restricted to host-attributed events.
    pub fn applies_to(&self, sender_role: OriginRole) -> bool {
        !self.host_role_only || sender_role == OriginRole::Host
    }

    /// Most recent unclaimed outbound host message in the thread with exactly
    /// `content`, created within the window ending at `now`.
    pub async fn find_recent_outbound_echo(
        &self,
        thread_id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Message>, ConciergeError> {
        Ok(self
            .candidates(thread_id, content, now)
            .await?
            .into_iter()
            .next())
    }

    /// Attributes the event to an earlier outbound message if one matches.
    ///
    /// Candidates are claimed newest first with a compare-and-set on the
    /// delivery's provider id; a candidate claimed concurrently by another
    /// event is skipped. Returns the id of the claimed message, or `None` when
    /// the event must be stored as a new message.
    pub async fn claim_echo(
        &self,
        thread_id: &str,
        channel: Channel,
        content: &str,
        provider_message_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, ConciergeError> {
        for candidate in self.candidates(thread_id, content, now).await? {
            let claimed = self
                .store
                .conditional_backfill_provider_id(&candidate.id, channel, provider_message_id, now)
                .await?;
            if claimed {
                info!(
                    thread_id,
                    message_id = candidate.id.as_str(),
                    channel = %channel,
                    provider_message_id,
                    "echo matched outbound message"
                );
                return Ok(Some(candidate.id));
            }
            debug!(
                message_id = candidate.id.as_str(),
                "echo candidate already claimed"
            );
        }
        Ok(None)
    }

    async fn candidates(
        &self,
        thread_id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>, ConciergeError> {
        self.store
            .find_recent_outbound_by_content_and_window(thread_id, content, now - self.window)
            .await
    }
}
