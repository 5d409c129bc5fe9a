//! In-process embeddings via fastembed (ONNX runtime).
//!
//! Uses `AllMiniLML6V2`: 384-dimensional output, mean pooling, model files
//! cached at `~/.strata/cache/fastembed/`.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};

use crate::{EmbeddingError, EmbeddingProvider};

const DIMENSION: usize = 384;

/// [`TextEmbedding::embed`] needs `&mut self` and blocks, so the model sits
/// behind a mutex and every call runs on the blocking pool.
pub struct LocalEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl LocalEmbedder {
    /// Load the model, downloading it on first run (~80MB).
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::InitFailed`] if model download or ONNX
    /// initialization fails.
    pub fn new() -> Result<Self, EmbeddingError> {
        let cache_dir = dirs::home_dir().map_or_else(
            || std::path::PathBuf::from(".fastembed_cache"),
            |h| h.join(".strata").join("cache").join("fastembed"),
        );

        let model = TextEmbedding::try_new(
            TextInitOptions::new(EmbeddingModel::AllMiniLML6V2).with_cache_dir(cache_dir),
        )
        .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let input = vec![text.to_string()];
        let mut vectors = tokio::task::spawn_blocking(move || {
            model
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .embed(input, None)
                .map_err(|e| EmbeddingError::EmbedFailed(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::EmbedFailed(format!("embedding task: {e}")))??;
        vectors.pop().ok_or(EmbeddingError::EmptyResult)
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }
}
