//! # strata-embeddings
//!
//! Entity embeddings with a zero-vector fallback.
//!
//! Embedding is never allowed to block or fail persistence. The memory
//! service calls [`ResilientEmbedder::embed`], which bounds the provider call
//! with a timeout and substitutes an all-zero vector of the configured
//! dimension on any failure.
//!
//! ## Providers
//!
//! - [`HttpEmbedder`]: an OpenAI-compatible embeddings server over `reqwest`
//! - `LocalEmbedder` (feature `local`): the fastembed `AllMiniLML6V2` model,
//!   run on the blocking pool

pub mod error;
mod http;
#[cfg(feature = "local")]
mod local;
mod text;

pub use error::EmbeddingError;
pub use http::HttpEmbedder;
#[cfg(feature = "local")]
pub use local::LocalEmbedder;
pub use text::{ObservationText, entity_text};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Something that turns text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;
}

/// Wraps an optional provider with a timeout and zero-vector fallback.
#[derive(Clone)]
pub struct ResilientEmbedder {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    dimension: usize,
    timeout: Duration,
}

impl ResilientEmbedder {
    #[must_use]
    pub fn new(provider: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        let dimension = provider.dimension();
        Self {
            provider: Some(provider),
            dimension,
            timeout,
        }
    }

    /// An embedder that stores no embeddings at all.
    #[must_use]
    pub const fn disabled(dimension: usize) -> Self {
        Self {
            provider: None,
            dimension,
            timeout: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// All-zero vector of the configured dimension.
    #[must_use]
    pub fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.dimension]
    }

    /// Embed `text`, falling back to a zero vector on failure.
    ///
    /// Returns `None` only when embeddings are disabled.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let provider = self.provider.as_ref()?;
        let result = match tokio::time::timeout(self.timeout, provider.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout(self.timeout)),
        }
        .and_then(|vector| {
            if vector.len() == self.dimension {
                Ok(vector)
            } else {
                Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                })
            }
        });

        match result {
            Ok(vector) => Some(vector),
            Err(error) => {
                tracing::warn!(%error, dimension = self.dimension, "embedding failed, using zero vector");
                Some(self.zero_vector())
            }
        }
    }
}
