//! Protocol error types

use thiserror::Error;

/// Errors that can occur while framing or parsing envelopes
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A single line exceeded the configured frame limit
    #[error("Frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Envelope JSON could not be encoded or decoded
    #[error("Envelope JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
