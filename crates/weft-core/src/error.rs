//! Validation error type shared by the ingress path.

use thiserror::Error;

/// A frame failed ingress validation.
///
/// The reason is human-readable and is sent back to the client verbatim in
/// an [`ErrorFrame`](crate::ErrorFrame).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ValidationError {
    /// Why the frame was rejected. The first failing rule wins.
    pub reason: String,
}

impl ValidationError {
    /// Create a validation error with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Result type for validation.
pub type ValidationResult<T> = Result<T, ValidationError>;
