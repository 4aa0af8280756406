//! Runtime error types.

use thiserror::Error;

/// Errors from node lifecycle operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The configured bind address does not parse.
    #[error("invalid bind address: {0}")]
    BadBindAddress(String),

    /// The gateway failed to serve.
    #[error(transparent)]
    Gateway(#[from] weft_gateway::GatewayError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
