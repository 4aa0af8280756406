//! Weft Core - Foundation types for the weft chat message fabric.
//!
//! This crate provides:
//! - Identifier newtypes used throughout the fabric
//! - The inbound [`ChatFrame`] and its validation rules
//! - The internal [`QueueMessage`] carried through the queue pipeline
//! - Server-to-client protocol frames (acks, errors, broadcast envelopes)
//! - The dead-letter envelope for failed persistence batches

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod frame;
mod message;
mod protocol;
mod types;

pub use error::{ValidationError, ValidationResult};
pub use frame::{
    ChatFrame, MAX_MESSAGE_LEN, MAX_USERNAME_LEN, MAX_USER_ID, MIN_USERNAME_LEN, validate_room,
};
pub use message::{DeadLetter, QueueMessage, now_iso8601};
pub use protocol::{Ack, ErrorFrame, STATUS_ERROR, STATUS_SUCCESS};
pub use types::{ChatKind, MessageId, NodeId, RoomId, SessionId};
