// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-(message, channel) delivery state machine.
//!
//! `queued -> sent -> delivered -> read`, with `failed` reachable from
//! `queued` and `sent` only. Every change is one conditional store update:
//! the store applies it only while the current status is in the allowed
//! set, fills the target timestamp only if it is unset, and never clears a
//! timestamp.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use concierge_core::types::{Delivery, DeliveryStatus, DeliveryTransition};
use concierge_core::{Channel, ConciergeError, ConversationStore};
use tracing::debug;

/// Statuses from which `to` may be entered.
pub fn allowed_from(to: DeliveryStatus) -> &'static [DeliveryStatus] {
    use DeliveryStatus::*;
    match to {
        Queued => &[],
        Sent => &[Queued],
        Delivered => &[Queued, Sent],
        Read => &[Queued, Sent, Delivered],
        Failed => &[Queued, Sent],
    }
}

/// Owns delivery records and their transitions.
#[derive(Clone)]
pub struct DeliveryStatusTracker {
    store: Arc<dyn ConversationStore>,
}

impl DeliveryStatusTracker {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Records the outbound delivery as `queued`. Idempotent per
    /// (message, channel); the stored row is returned.
    pub async fn queue(
        &self,
        message_id: &str,
        channel: Channel,
        at: DateTime<Utc>,
    ) -> Result<Delivery, ConciergeError> {
        self.store
            .upsert_delivery(&Delivery {
                message_id: message_id.to_string(),
                channel,
                status: DeliveryStatus::Queued,
                queued_at: at,
                sent_at: None,
                delivered_at: None,
                read_at: None,
                provider_message_id: None,
                error_message: None,
            })
            .await
    }

    pub async fn mark_sent(
        &self,
        message_id: &str,
        channel: Channel,
        provider_message_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, ConciergeError> {
        self.transition(
            message_id,
            channel,
            DeliveryStatus::Sent,
            at,
            None,
            provider_message_id,
        )
        .await
    }

    pub async fn mark_delivered(
        &self,
        message_id: &str,
        channel: Channel,
        at: DateTime<Utc>,
    ) -> Result<bool, ConciergeError> {
        self.transition(message_id, channel, DeliveryStatus::Delivered, at, None, None)
            .await
    }

    pub async fn mark_read(
        &self,
        message_id: &str,
        channel: Channel,
        at: DateTime<Utc>,
    ) -> Result<bool, ConciergeError> {
        self.transition(message_id, channel, DeliveryStatus::Read, at, None, None)
            .await
    }

    /// Sets `failed` and the error text; timestamps are left untouched.
    pub async fn mark_failed(
        &self,
        message_id: &str,
        channel: Channel,
        error_message: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, ConciergeError> {
        self.transition(
            message_id,
            channel,
            DeliveryStatus::Failed,
            at,
            Some(error_message),
            None,
        )
        .await
    }

    /// Applies a provider acknowledgement addressed by provider message id.
    ///
    /// Only `delivered`, `read` and `failed` can be acknowledged. Returns
    /// whether the delivery moved; a stale acknowledgement is a no-op.
    pub async fn acknowledge(
        &self,
        channel: Channel,
        provider_message_id: &str,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, ConciergeError> {
        if !matches!(
            status,
            DeliveryStatus::Delivered | DeliveryStatus::Read | DeliveryStatus::Failed
        ) {
            return Err(ConciergeError::Validation(format!(
                "cannot acknowledge a delivery as {status}"
            )));
        }
        let delivery = self
            .store
            .find_delivery_by_provider_message_id(channel, provider_message_id)
            .await?
            .ok_or_else(|| ConciergeError::not_found("delivery", provider_message_id))?;

        let error_message = (status == DeliveryStatus::Failed)
            .then(|| format!("provider reported failure for {provider_message_id}"));
        self.transition(
            &delivery.message_id,
            channel,
            status,
            at,
            error_message.as_deref(),
            None,
        )
        .await
    }

    async fn transition(
        &self,
        message_id: &str,
        channel: Channel,
        to: DeliveryStatus,
        at: DateTime<Utc>,
        error_message: Option<&str>,
        provider_message_id: Option<&str>,
    ) -> Result<bool, ConciergeError> {
        let applied = self
            .store
            .apply_delivery_transition(&DeliveryTransition {
                message_id: message_id.to_string(),
                channel,
                to,
                allowed_from: allowed_from(to).to_vec(),
                at,
                error_message: error_message.map(str::to_string),
                provider_message_id: provider_message_id.map(str::to_string),
            })
            .await?;
        if !applied {
            debug!(
                message_id,
                channel = %channel,
                to = %to,
                "delivery transition skipped"
            );
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeliveryStatus::*;

    #[test]
    fn failure_never_follows_delivery() {
        assert!(!allowed_from(Failed).contains(&Delivered));
        assert!(!allowed_from(Failed).contains(&Read));
        assert!(allowed_from(Failed).contains(&Sent));
    }

    #[test]
    fn read_is_reachable_from_every_live_state() {
        assert_eq!(allowed_from(Read), &[Queued, Sent, Delivered]);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in [Queued, Sent, Delivered, Read, Failed] {
            assert!(!allowed_from(to).contains(&Read));
            assert!(!allowed_from(to).contains(&Failed));
        }
    }
}
