//! Server-to-client protocol frames.
//!
//! A session receives three frame shapes: acks for its own submissions,
//! error frames, and broadcast envelopes (the JSON form of
//! [`QueueMessage`](crate::QueueMessage)). The ack is the only frame that
//! carries `status: "SUCCESS"`; broadcast envelopes are distinct and must
//! not be mistaken for replies.

use serde::{Deserialize, Serialize};

use crate::frame::ChatFrame;
use crate::message::now_iso8601;
use crate::types::MessageId;

/// Status value of a successful ack.
pub const STATUS_SUCCESS: &str = "SUCCESS";
/// Status value of an error frame.
pub const STATUS_ERROR: &str = "ERROR";

/// Synchronous acknowledgement of an accepted frame.
///
/// "Accepted" means accepted by this node for ordered delivery; the ack is
/// sent regardless of whether downstream fanout has happened yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Always `"SUCCESS"`.
    pub status: String,
    /// Id assigned to the message at ingress.
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
    /// Server-side ISO-8601 timestamp.
    pub timestamp: String,
    /// The frame being acknowledged, echoed back verbatim.
    #[serde(rename = "originalMessage")]
    pub original_message: ChatFrame,
}

impl Ack {
    /// Acknowledge a frame that was assigned `message_id`.
    #[must_use]
    pub fn new(message_id: MessageId, timestamp: impl Into<String>, original: ChatFrame) -> Self {
        Self {
            status: STATUS_SUCCESS.to_owned(),
            message_id,
            timestamp: timestamp.into(),
            original_message: original,
        }
    }
}

/// Error reported back to the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Always `"ERROR"`.
    pub status: String,
    /// Server-side ISO-8601 timestamp, omitted for bare validation errors.
    #[serde(rename = "serverTimestamp", skip_serializing_if = "Option::is_none")]
    pub server_timestamp: Option<String>,
    /// Human-readable reason.
    #[serde(rename = "errorMessage")]
    pub error_message: String,
}

impl ErrorFrame {
    /// A bare error frame, `{status, errorMessage}`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_owned(),
            server_timestamp: None,
            error_message: message.into(),
        }
    }

    /// An error frame stamped with the current server time.
    #[must_use]
    pub fn stamped(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_owned(),
            server_timestamp: Some(now_iso8601()),
            error_message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> ChatFrame {
        ChatFrame {
            user_id: "42".to_owned(),
            username: "alice".to_owned(),
            message: "hi".to_owned(),
            timestamp: "2025-01-01T00:00:00Z".to_owned(),
            message_type: "TEXT".to_owned(),
        }
    }

    #[test]
    fn test_ack_shape() {
        let ack = Ack::new(MessageId::new(), "2025-01-01T00:00:01Z", frame());
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["status"], "SUCCESS");
        assert!(json.get("messageId").is_some());
        assert_eq!(json["originalMessage"]["username"], "alice");
    }

    #[test]
    fn test_bare_error_omits_timestamp() {
        let err = ErrorFrame::new("username must be 3-20 characters");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "ERROR");
        assert_eq!(json["errorMessage"], "username must be 3-20 characters");
        assert!(json.get("serverTimestamp").is_none());
    }

    #[test]
    fn test_stamped_error_carries_timestamp() {
        let err = ErrorFrame::stamped("queue unavailable");
        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("serverTimestamp").is_some());
    }
}
