//! Core error types.

use thiserror::Error;

/// Errors raised while decoding data shared across crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A push-channel frame was not a JSON envelope.
    #[error("invalid push envelope: {0}")]
    InvalidEnvelope(#[from] serde_json::Error),
    /// A timestamp could not be parsed in any accepted format.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Result type for core decoding operations.
pub type Result<T> = std::result::Result<T, CoreError>;
