//! The queue message carried from ingress to the consumer pipeline, and the
//! dead-letter envelope for persistence failures.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::frame::ChatFrame;
use crate::types::{ChatKind, MessageId, NodeId, RoomId};

/// A message accepted by ingress, as it travels through the external queue
/// and out to broadcasts and the store.
///
/// This is both the internal representation and the broadcast envelope: the
/// exact JSON form of this struct is what other sessions in the room
/// receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Globally unique id, generated at ingress.
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
    /// Room the message belongs to.
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    /// Sender user id (validated numeric string).
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Sender display name.
    pub username: String,
    /// Message text.
    pub message: String,
    /// Server-side ISO-8601 timestamp, stamped at ingress.
    pub timestamp: String,
    /// Message kind.
    #[serde(rename = "messageType")]
    pub message_type: ChatKind,
    /// Node that accepted the message.
    #[serde(rename = "serverId")]
    pub server_id: NodeId,
    /// Peer address of the originating socket.
    #[serde(rename = "clientIp")]
    pub client_ip: String,
}

impl QueueMessage {
    /// Build a queue message from a validated frame.
    ///
    /// Stamps a fresh message id and the current server timestamp. The
    /// frame must have passed [`ChatFrame::validate`]; an unknown message
    /// type falls back to `TEXT` rather than panicking.
    #[must_use]
    pub fn from_frame(
        frame: &ChatFrame,
        room_id: RoomId,
        server_id: NodeId,
        client_ip: impl Into<String>,
    ) -> Self {
        Self {
            message_id: MessageId::new(),
            room_id,
            user_id: frame.user_id.clone(),
            username: frame.username.clone(),
            message: frame.message.clone(),
            timestamp: now_iso8601(),
            message_type: frame.kind().unwrap_or(ChatKind::Text),
            server_id,
            client_ip: client_ip.into(),
        }
    }
}

/// Envelope shipped to the dead-letter queue when a persistence batch fails.
///
/// Repeat failures of the same message produce distinct envelopes: the
/// queue-side dedup id is `{messageId}-{failureTimestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The message that could not be persisted.
    #[serde(rename = "originalMessage")]
    pub original_message: QueueMessage,
    /// Why the batch insert failed.
    #[serde(rename = "failureReason")]
    pub failure_reason: String,
    /// When the failure happened, ISO-8601.
    #[serde(rename = "failureTimestamp")]
    pub failure_timestamp: String,
    /// How many times this message has failed so far.
    #[serde(rename = "attemptCount")]
    pub attempt_count: u32,
}

impl DeadLetter {
    /// Wrap a failed message.
    #[must_use]
    pub fn new(message: QueueMessage, reason: impl Into<String>, attempt_count: u32) -> Self {
        Self {
            original_message: message,
            failure_reason: reason.into(),
            failure_timestamp: now_iso8601(),
            attempt_count,
        }
    }

    /// Deduplication id for the DLQ publish.
    #[must_use]
    pub fn dedup_id(&self) -> String {
        format!(
            "{}-{}",
            self.original_message.message_id, self.failure_timestamp
        )
    }
}

/// The current instant as an ISO-8601 UTC string, as used on the wire.
#[must_use]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
