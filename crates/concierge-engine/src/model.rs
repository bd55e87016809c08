// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and result types of the engine operations.

use chrono::{DateTime, Utc};
use concierge_core::Channel;
use concierge_core::types::{
    Delivery, Message, OriginRole, Participant, Thread, ThreadChannel, ThreadInit,
};
use serde::{Deserialize, Serialize};

/// An outbound message submitted by the UI, the API or the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    pub thread_id: String,
    pub channel: Channel,
    pub content: String,
    pub origin_role: OriginRole,
    #[serde(default)]
    pub parent_message_id: Option<String>,
}

/// A message arriving on an already resolved thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveRequest {
    pub thread_id: String,
    pub channel: Channel,
    pub content: String,
    pub origin_role: OriginRole,
    #[serde(default)]
    pub provider_message_id: Option<String>,
    /// Provider timestamp; the current time when absent.
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveOutcome {
    Created(Message),
    /// The provider message id was already recorded; nothing was written.
    Duplicate { message_id: String },
}

impl ReceiveOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ReceiveOutcome::Duplicate { .. })
    }
}

/// How a webhook event identifies its conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum ThreadHint {
    Reservation(String),
    ExternalThread(String),
}

/// Channel-agnostic inbound webhook payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub thread_hint: ThreadHint,
    pub channel: Channel,
    pub content: String,
    pub sender_role: OriginRole,
    #[serde(default)]
    pub provider_message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Used when the event creates or enriches a thread.
    #[serde(default)]
    pub thread_init: ThreadInit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Created { thread_id: String, message: Message },
    Duplicate { thread_id: String, message_id: String },
    /// The event reflected an outbound message, whose delivery now carries
    /// the provider id.
    EchoBackfilled { thread_id: String, message_id: String },
    /// The event reflected an outbound message but carried no provider id,
    /// so nothing was recorded.
    EchoSuppressed { thread_id: String, message_id: String },
}

impl IngestOutcome {
    pub fn thread_id(&self) -> &str {
        match self {
            IngestOutcome::Created { thread_id, .. }
            | IngestOutcome::Duplicate { thread_id, .. }
            | IngestOutcome::EchoBackfilled { thread_id, .. }
            | IngestOutcome::EchoSuppressed { thread_id, .. } => thread_id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::Duplicate { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationEntry {
    pub message: Message,
    pub deliveries: Vec<Delivery>,
}

/// A thread with its mappings, participants and full message history.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub thread: Thread,
    pub channels: Vec<ThreadChannel>,
    pub participants: Vec<Participant>,
    pub entries: Vec<ConversationEntry>,
}
