// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory doubles for the external collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use concierge_core::types::GroupBooking;
use concierge_core::{ConciergeError, ContentSanitizer, GroupBookingResolver};

/// Group bookings fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticGroupBookings {
    groups: Vec<GroupBooking>,
}

impl StaticGroupBookings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group; `members` should include the master.
    pub fn with_group(mut self, master: &str, members: &[&str]) -> Self {
        let mut reservation_ids: Vec<String> = members.iter().map(|s| s.to_string()).collect();
        if !reservation_ids.iter().any(|id| id == master) {
            reservation_ids.insert(0, master.to_string());
        }
        self.groups.push(GroupBooking {
            master_reservation_id: master.to_string(),
            reservation_ids,
        });
        self
    }
}

#[async_trait]
impl GroupBookingResolver for StaticGroupBookings {
    async fn group_of(&self, reservation_id: &str) -> Result<Option<GroupBooking>, ConciergeError> {
        Ok(self
            .groups
            .iter()
            .find(|g| g.reservation_ids.iter().any(|id| id == reservation_id))
            .cloned())
    }
}

/// A sanitizer whose every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSanitizer;

#[async_trait]
impl ContentSanitizer for FailingSanitizer {
    async fn process(&self, _content: &str, message_id: &str) -> Result<String, ConciergeError> {
        Err(ConciergeError::Internal(format!(
            "image storage unavailable while processing {message_id}"
        )))
    }
}

/// Records every call and applies an optional substring rewrite.
#[derive(Debug, Clone, Default)]
pub struct RecordingSanitizer {
    rewrite: Option<(String, String)>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every occurrence of `from` with `to`.
    pub fn with_rewrite(mut self, from: &str, to: &str) -> Self {
        self.rewrite = Some((from.to_string(), to.to_string()));
        self
    }

    /// `(message_id, original content)` for every call, in order.
    pub async fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ContentSanitizer for RecordingSanitizer {
    async fn process(&self, content: &str, message_id: &str) -> Result<String, ConciergeError> {
        self.calls
            .lock()
            .await
            .push((message_id.to_string(), content.to_string()));
        Ok(match &self.rewrite {
            Some((from, to)) => content.replace(from.as_str(), to),
            None => content.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn groups_resolve_for_every_member() {
        let groups = StaticGroupBookings::new().with_group("R1", &["R1", "R2"]);
        let g = groups.group_of("R2").await.unwrap().unwrap();
        assert_eq!(g.master_reservation_id, "R1");
        assert_eq!(
            groups.sibling_reservation_ids("R1").await.unwrap(),
            vec!["R1".to_string(), "R2".to_string()]
        );
        assert!(groups.group_of("R3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn master_is_added_when_omitted() {
        let groups = StaticGroupBookings::new().with_group("R1", &["R2"]);
        let g = groups.group_of("R1").await.unwrap().unwrap();
        assert_eq!(g.room_count(), 2);
    }

    #[tokio::test]
    async fn recording_sanitizer_rewrites_and_records() {
        let sanitizer = RecordingSanitizer::new().with_rewrite("tmp://", "https://cdn/");
        let out = sanitizer.process("see tmp://a.jpg", "m1").await.unwrap();
        assert_eq!(out, "see https://cdn/a.jpg");
        assert_eq!(
            sanitizer.calls().await,
            vec![("m1".to_string(), "see tmp://a.jpg".to_string())]
        );
    }

    #[tokio::test]
    async fn failing_sanitizer_fails() {
        assert!(FailingSanitizer.process("x", "m1").await.is_err());
    }
}
