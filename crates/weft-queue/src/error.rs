//! Queue error types.

use thiserror::Error;

/// Errors from queue operations.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The named queue does not exist (yet). Non-fatal: URL resolution is
    /// lazy and retried.
    #[error("queue not found: {0}")]
    NotFound(String),

    /// A publish was rejected or failed in transit.
    #[error("send failed: {0}")]
    Send(String),

    /// A receive call failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// A room's producer batch is at capacity.
    #[error("producer batch full for room {0}")]
    BatchFull(weft_core::RoomId),

    /// The producer is shutting down and no longer accepts messages.
    #[error("producer closed")]
    Closed,
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
