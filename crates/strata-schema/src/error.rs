//! Schema validation error types.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strata_core::retry::{RetryError, Retryable};
use thiserror::Error;

/// One failed constraint, located by JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldError {
    /// JSON pointer into the metadata (empty for the root).
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Errors from the schema gate.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// No schema is registered under this name.
    #[error("Schema not found: {0}")]
    NotFound(String),

    /// The stored schema document does not compile.
    #[error("Schema '{name}' is invalid: {message}")]
    InvalidSchema { name: String, message: String },

    /// Metadata did not pass schema validation.
    #[error("Validation against '{schema}' failed: {}", format_errors(.errors))]
    ValidationFailed {
        schema: String,
        errors: Vec<FieldError>,
    },

    /// The schema source could not be reached.
    #[error("Schema source unavailable: {0}")]
    Unavailable(String),

    #[error("Schema lookup timed out after {0:?}")]
    Timeout(Duration),

    /// Transient failures persisted through every retry.
    #[error("Schema source unavailable after {attempts} attempts: {last}")]
    ServiceUnavailable { attempts: u32, last: String },
}

fn format_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Retryable for SchemaError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Timeout(_) | Self::ServiceUnavailable { .. }
        )
    }
}

impl SchemaError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        Retryable::is_retryable(self)
    }
}

impl From<RetryError<Self>> for SchemaError {
    fn from(e: RetryError<Self>) -> Self {
        match e {
            RetryError::Permanent(e) => e,
            RetryError::Exhausted { attempts, last } => Self::ServiceUnavailable {
                attempts,
                last: last.to_string(),
            },
        }
    }
}
