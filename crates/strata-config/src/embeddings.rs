//! Embedding configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const fn default_dimension() -> usize {
    384
}

const fn default_timeout_ms() -> u64 {
    5000
}

const fn default_enabled() -> bool {
    true
}

fn default_provider() -> String {
    "http".to_string()
}

fn default_model() -> String {
    "Alibaba-NLP/gte-multilingual-base".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingsConfig {
    /// Vector length. Fallback vectors use this length too.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Per-call timeout before the zero-vector fallback kicks in.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// When false, entities are stored without embeddings.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// `http` for a remote embeddings server, `local` for the in-process
    /// fastembed model.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL of the embeddings server (`{api_url}/embeddings`).
    #[serde(default)]
    pub api_url: String,

    /// Model name sent to the embeddings server.
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            timeout_ms: default_timeout_ms(),
            enabled: default_enabled(),
            provider: default_provider(),
            api_url: String::new(),
            model: default_model(),
        }
    }
}

impl EmbeddingsConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether an HTTP provider has somewhere to send requests.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "http" => !self.api_url.is_empty(),
            _ => true,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.dimension == 0 {
            return Err(ConfigError::invalid(
                "embeddings.dimension",
                "must be greater than zero",
            ));
        }
        if !matches!(self.provider.as_str(), "http" | "local") {
            return Err(ConfigError::invalid(
                "embeddings.provider",
                format!("unknown provider '{}', expected 'http' or 'local'", self.provider),
            ));
        }
        Ok(())
    }
}
