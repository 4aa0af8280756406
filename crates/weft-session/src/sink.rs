//! The socket write half behind a session.

use async_trait::async_trait;
use thiserror::Error;

/// A socket write failed; the session is done.
#[derive(Debug, Clone, Error)]
#[error("sink write failed: {0}")]
pub struct SinkError(pub String);

/// The outbound half of a session's transport.
///
/// Implementations are not required to be reentrant: the write serializer
/// guarantees at most one in-flight `send_text` per session.
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Write one text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] when the transport is gone; the caller
    /// closes the session.
    async fn send_text(&self, frame: String) -> Result<(), SinkError>;
}
