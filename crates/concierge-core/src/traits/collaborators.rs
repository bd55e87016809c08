// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces to systems the engine consumes but does not own.

use async_trait::async_trait;

use crate::error::ConciergeError;
use crate::types::GroupBooking;

/// Read-only view of group bookings held by the property-management system.
#[async_trait]
pub trait GroupBookingResolver: Send + Sync {
    /// The group the reservation belongs to, if any.
    async fn group_of(&self, reservation_id: &str) -> Result<Option<GroupBooking>, ConciergeError>;

    /// All reservation ids in the same group, the given one included.
    ///
    /// Returns an empty list for reservations outside any group.
    async fn sibling_reservation_ids(
        &self,
        reservation_id: &str,
    ) -> Result<Vec<String>, ConciergeError> {
        Ok(self
            .group_of(reservation_id)
            .await?
            .map(|g| g.reservation_ids)
            .unwrap_or_default())
    }
}

/// Rewrites inbound content before it is persisted (e.g. externalizing
/// transient image URLs). Failures are non-fatal to the caller.
#[async_trait]
pub trait ContentSanitizer: Send + Sync {
    async fn process(&self, content: &str, message_id: &str) -> Result<String, ConciergeError>;
}

/// Renders a scheduled message template into final content.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(
        &self,
        template_id: &str,
        payload: &serde_json::Value,
    ) -> Result<String, ConciergeError>;
}
