//! Embedding error types.

use std::time::Duration;

/// Errors that can occur during embedding generation.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Model or client initialization failed.
    #[error("Embedding provider initialization failed: {0}")]
    InitFailed(String),

    /// Embedding generation failed (inference error, invalid input, HTTP error).
    #[error("Embedding generation failed: {0}")]
    EmbedFailed(String),

    /// The provider returned no vector for a non-empty input.
    #[error("Empty result from embedding provider")]
    EmptyResult,

    /// The provider returned a vector of the wrong length.
    #[error("Embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding timed out after {0:?}")]
    Timeout(Duration),
}

impl EmbeddingError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::EmbedFailed(_))
    }
}
