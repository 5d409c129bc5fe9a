//! Client for an OpenAI-compatible embeddings server.
//!
//! `POST {base}/embeddings` with `{"model", "input"}`. Both the
//! `{"data": [{"embedding": [...]}]}` and `{"embedding": [...]}` response
//! shapes are accepted.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{EmbeddingError, EmbeddingProvider};

pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_vector(self) -> Option<Vec<f32>> {
        self.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .or(self.embedding)
    }
}

impl HttpEmbedder {
    /// # Errors
    ///
    /// Returns `EmbeddingError::InitFailed` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({"model": self.model, "input": text}))
            .send()
            .await
            .map_err(|e| EmbeddingError::EmbedFailed(format!("request: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::EmbedFailed(format!("HTTP {status}: {body}")));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::EmbedFailed(format!("parse response: {e}")))?;
        parsed.into_vector().ok_or(EmbeddingError::EmptyResult)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
