//! Gateway error types.

use thiserror::Error;

/// Errors from the gateway listener.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The listener could not bind or serve.
    #[error("gateway io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
