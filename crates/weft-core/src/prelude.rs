//! Prelude module - commonly used types for convenient import.
//!
//! Use `use weft_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{ValidationError, ValidationResult};

// Frames and messages
pub use crate::{Ack, ChatFrame, DeadLetter, ErrorFrame, QueueMessage};

// Identifiers
pub use crate::{ChatKind, MessageId, NodeId, RoomId, SessionId};
