// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the store, the channel adapters and the engine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Storage,
}

/// An external messaging channel.
///
/// The OTA channels (`airbnb`, `booking`, `vrbo`, `expedia`) all reach their
/// provider through the same upstream gateway.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[strum(to_string = "inapp")]
    #[serde(rename = "inapp")]
    InApp,
    Email,
    Sms,
    Airbnb,
    Booking,
    Vrbo,
    Expedia,
}

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::InApp,
        Channel::Email,
        Channel::Sms,
        Channel::Airbnb,
        Channel::Booking,
        Channel::Vrbo,
        Channel::Expedia,
    ];

    /// True for channels routed through the shared OTA gateway.
    pub fn is_ota(self) -> bool {
        matches!(
            self,
            Channel::Airbnb | Channel::Booking | Channel::Vrbo | Channel::Expedia
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Open,
    Closed,
    Archived,
}

impl ThreadStatus {
    /// Whether an explicit status change from `self` to `to` is allowed.
    ///
    /// Threads move open ↔ closed ↔ archived; open and archived are never
    /// adjacent.
    pub fn can_transition_to(self, to: ThreadStatus) -> bool {
        matches!(
            (self, to),
            (ThreadStatus::Open, ThreadStatus::Closed)
                | (ThreadStatus::Closed, ThreadStatus::Open)
                | (ThreadStatus::Closed, ThreadStatus::Archived)
                | (ThreadStatus::Archived, ThreadStatus::Closed)
        )
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ThreadPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Who authored a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OriginRole {
    Guest,
    Host,
    System,
    Assistant,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    /// Guests write in; everyone else writes out.
    pub fn for_role(role: OriginRole) -> Self {
        match role {
            OriginRole::Guest => Direction::Incoming,
            OriginRole::Host | OriginRole::System | OriginRole::Assistant => Direction::Outgoing,
        }
    }
}

/// Per-channel transmission state of a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Read | DeliveryStatus::Failed)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScheduledStatus {
    Queued,
    Sent,
    Failed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ParticipantType {
    Guest,
    Host,
}

/// Canonical conversation container for one reservation or reservation group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub reservation_id: Option<String>,
    pub subject: String,
    pub status: ThreadStatus,
    pub priority: ThreadPriority,
    pub last_message_at: Option<DateTime<Utc>>,
    /// At most `messaging.preview_chars` characters.
    pub last_message_preview: Option<String>,
    /// Set when no reservation could be matched for the conversation.
    pub needs_linking: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable message content record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub parent_message_id: Option<String>,
    pub origin_role: OriginRole,
    pub direction: Direction,
    pub channel: Channel,
    pub content: String,
    pub is_unsent: bool,
    pub unsent_at: Option<DateTime<Utc>>,
    pub unsent_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One row per (message, channel).
///
/// Each timestamp is written at most once and never cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub message_id: String,
    pub channel: Channel,
    pub status: DeliveryStatus,
    pub queued_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
}

/// A conditional status change applied atomically by the store.
///
/// The store only applies the change when the current status is one of
/// `allowed_from`; it fills the timestamp belonging to `to` only when it is
/// still unset and never touches the others.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryTransition {
    pub message_id: String,
    pub channel: Channel,
    pub to: DeliveryStatus,
    pub allowed_from: Vec<DeliveryStatus>,
    pub at: DateTime<Utc>,
    pub error_message: Option<String>,
    /// Recorded only if the delivery has no provider id yet.
    pub provider_message_id: Option<String>,
}

/// Maps a thread to a provider-side conversation id on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelMapping {
    pub channel: Channel,
    pub external_thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadChannel {
    pub thread_id: String,
    pub channel: Channel,
    pub external_thread_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub thread_id: String,
    pub participant_type: ParticipantType,
    /// Email address, phone number or provider user id, depending on channel.
    pub external_address: Option<String>,
    pub display_name: Option<String>,
    pub last_read_at: Option<DateTime<Utc>>,
}

/// Participant data supplied when a thread is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewParticipant {
    pub participant_type: ParticipantType,
    pub external_address: Option<String>,
    pub display_name: Option<String>,
}

/// Optional data used when the resolver has to create or enrich a thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadInit {
    pub subject: Option<String>,
    pub priority: Option<ThreadPriority>,
    #[serde(default)]
    pub participants: Vec<NewParticipant>,
    #[serde(default)]
    pub channels: Vec<ChannelMapping>,
}

/// Outcome of a guarded thread insert.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadInsert {
    Created(Thread),
    /// A thread already existed for one of the guarded reservation ids.
    Existing(Thread),
}

impl ThreadInsert {
    pub fn into_thread(self) -> Thread {
        match self {
            ThreadInsert::Created(t) | ThreadInsert::Existing(t) => t,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: String,
    pub thread_id: String,
    pub template_id: String,
    pub channel: Channel,
    pub run_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub status: ScheduledStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A group booking as reported by the property-management system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBooking {
    pub master_reservation_id: String,
    /// Every reservation in the group, master included.
    pub reservation_ids: Vec<String>,
}

impl GroupBooking {
    pub fn room_count(&self) -> usize {
        self.reservation_ids.len()
    }
}

/// Schema features detected once when the store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCapabilities {
    pub unsend: bool,
    pub participants: bool,
    pub scheduling: bool,
}

/// The party performing a user-initiated operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub role: OriginRole,
    pub id: String,
    pub issued_at: DateTime<Utc>,
}

/// Capabilities reported by a channel adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelCapabilities {
    /// Sends require a provider conversation id from `thread_channels`.
    pub requires_external_thread: bool,
    pub supports_unsend: bool,
    /// When set, the engine marks the delivery `delivered` after this delay.
    pub simulated_delivery_after: Option<Duration>,
}

/// A rendered message handed to a channel adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub message_id: String,
    pub thread_id: String,
    pub channel: Channel,
    pub content: String,
    pub reservation_id: Option<String>,
    pub external_thread_id: Option<String>,
    pub parent_message_id: Option<String>,
    pub recipients: Vec<Participant>,
}

/// Successful send acknowledgement from a channel adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub provider_message_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn channel_names() {
        assert_eq!(Channel::InApp.to_string(), "inapp");
        assert_eq!(Channel::from_str("booking").unwrap(), Channel::Booking);
        assert_eq!(
            serde_json::to_string(&Channel::InApp).unwrap(),
            "\"inapp\""
        );
        for channel in Channel::ALL {
            assert_eq!(Channel::from_str(&channel.to_string()).unwrap(), channel);
        }
    }

    #[test]
    fn ota_channels() {
        assert!(Channel::Airbnb.is_ota());
        assert!(Channel::Expedia.is_ota());
        assert!(!Channel::InApp.is_ota());
        assert!(!Channel::Sms.is_ota());
    }

    #[test]
    fn direction_follows_role() {
        assert_eq!(Direction::for_role(OriginRole::Guest), Direction::Incoming);
        assert_eq!(Direction::for_role(OriginRole::Host), Direction::Outgoing);
        assert_eq!(Direction::for_role(OriginRole::System), Direction::Outgoing);
        assert_eq!(
            Direction::for_role(OriginRole::Assistant),
            Direction::Outgoing
        );
    }

    #[test]
    fn thread_status_graph() {
        use ThreadStatus::*;
        assert!(Open.can_transition_to(Closed));
        assert!(Closed.can_transition_to(Open));
        assert!(Closed.can_transition_to(Archived));
        assert!(Archived.can_transition_to(Closed));
        assert!(!Open.can_transition_to(Archived));
        assert!(!Archived.can_transition_to(Open));
        assert!(!Open.can_transition_to(Open));
    }

    #[test]
    fn terminal_delivery_states() {
        assert!(DeliveryStatus::Read.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(!DeliveryStatus::Sent.is_terminal());
    }
}
