//! The inbound chat frame and its validation rules.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};
use crate::types::{ChatKind, RoomId};

/// Largest accepted user id.
pub const MAX_USER_ID: u64 = 100_000;
/// Shortest accepted username.
pub const MIN_USERNAME_LEN: usize = 3;
/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 20;
/// Longest accepted message text.
pub const MAX_MESSAGE_LEN: usize = 500;

/// A single client-to-server chat frame, exactly as it appears on the wire.
///
/// Field values are kept as strings until they cross the persistence
/// boundary; [`ChatFrame::validate`] is the only gate between the socket
/// and the rest of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFrame {
    /// Numeric user id as a string, `1..=100000`.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Display name, 3-20 alphanumeric characters.
    pub username: String,
    /// Message text, 1-500 characters.
    pub message: String,
    /// Client-side ISO-8601 timestamp.
    pub timestamp: String,
    /// One of `TEXT`, `JOIN`, `LEAVE`.
    #[serde(rename = "messageType")]
    pub message_type: String,
}

impl ChatFrame {
    /// Validate the frame against the ingress rules.
    ///
    /// Rules are checked in a fixed order and the first failure wins, so a
    /// frame that is wrong in several ways gets a deterministic reason.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] whose reason is suitable for echoing
    /// back to the client.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.user_id.is_empty() {
            return Err(ValidationError::new("userId is required"));
        }
        match self.user_id.parse::<u64>() {
            Ok(id) if (1..=MAX_USER_ID).contains(&id) => {},
            Ok(_) => {
                return Err(ValidationError::new(format!(
                    "userId must be between 1 and {MAX_USER_ID}"
                )));
            },
            Err(_) => return Err(ValidationError::new("userId must be a number")),
        }

        let name_len = self.username.chars().count();
        if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&name_len) {
            return Err(ValidationError::new(format!(
                "username must be {MIN_USERNAME_LEN}-{MAX_USERNAME_LEN} characters"
            )));
        }
        if !self.username.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::new("username must be alphanumeric"));
        }

        let msg_len = self.message.chars().count();
        if !(1..=MAX_MESSAGE_LEN).contains(&msg_len) {
            return Err(ValidationError::new(format!(
                "message must be 1-{MAX_MESSAGE_LEN} characters"
            )));
        }

        if DateTime::parse_from_rfc3339(&self.timestamp).is_err() {
            return Err(ValidationError::new("timestamp must be ISO-8601"));
        }

        if ChatKind::parse(&self.message_type).is_none() {
            return Err(ValidationError::new(
                "messageType must be one of TEXT, JOIN, LEAVE",
            ));
        }

        Ok(())
    }

    /// The validated message kind.
    ///
    /// Returns `None` if the frame has not passed [`validate`](Self::validate).
    #[must_use]
    pub fn kind(&self) -> Option<ChatKind> {
        ChatKind::parse(&self.message_type)
    }
}

/// Validate a room id extracted from the connection path.
///
/// Rooms are `1..=room_count`; anything else is rejected at upgrade time
/// with a transport-level close.
///
/// # Errors
///
/// Returns a [`ValidationError`] naming the accepted range.
pub fn validate_room(room: u32, room_count: u32) -> ValidationResult<RoomId> {
    if (1..=room_count).contains(&room) {
        Ok(RoomId(room))
    } else {
        Err(ValidationError::new(format!(
            "roomId must be between 1 and {room_count}"
        )))
    }
}
