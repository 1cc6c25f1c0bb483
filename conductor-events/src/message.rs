//! ABOUTME: Wire types carried over the message bus
//! ABOUTME: Ported field-for-field from agent_communication.py's pydantic message models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    DataShare,
    TaskAssignment,
    StatusUpdate,
    Coordination,
    Alert,
    Handoff,
}

impl MessageType {
    /// Matches the original's wire-level type string, kept distinct from
    /// the `snake_case` serde rendition so dead letters and logs read the
    /// same name the original bus used.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::DataShare => "DataShareMessage",
            Self::TaskAssignment => "TaskAssignmentMessage",
            Self::StatusUpdate => "StatusUpdateMessage",
            Self::Coordination => "CoordinationMessage",
            Self::Alert => "AlertMessage",
            Self::Handoff => "HandoffMessage",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Read,
    Acknowledged,
    Failed,
}

/// One entry appended to a recipient's `agent:{to}:messages` stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub message_id: String,
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    pub priority: MessagePriority,
    pub department_id: Option<String>,
    pub broadcast_id: Option<String>,
    pub payload: Value,
    pub status: MessageStatus,
}

/// A message as returned by [`crate::bus::MessageBus::pending`]: the stored
/// envelope plus the stream cursor needed to later acknowledge it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingMessage {
    pub message: Message,
    pub stream_cursor: String,
}

/// A record in the sender's `agent:{from}:outbox` audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxEntry {
    pub message_id: String,
    pub to_agent_id: String,
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

/// A failed publish, recorded verbatim in `failed:messages`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetter {
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub message_type: String,
    pub payload: Value,
    pub error_message: String,
    pub failed_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
}

/// Aggregate counters returned by [`crate::bus::MessageBus::stats`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MessageStats {
    pub pending_messages: u64,
    pub read_messages: u64,
    pub sent_messages: u64,
    pub subscriptions: u64,
}
