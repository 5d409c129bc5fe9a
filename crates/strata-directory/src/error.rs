//! Directory error types.

use std::time::Duration;

use strata_core::RealmRef;
use strata_core::retry::{RetryError, Retryable};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The directory answered and the actor does not exist.
    #[error("Actor not found: {realm}")]
    ActorNotFound { realm: RealmRef },

    /// The directory could not be reached or answered with a server error.
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish within its deadline.
    #[error("Directory call timed out after {0:?}")]
    Timeout(Duration),

    /// The directory refused the request (4xx other than 404).
    #[error("Directory rejected request with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The directory answered with something we could not parse.
    #[error("Malformed directory response: {0}")]
    Malformed(String),

    /// Transient failures persisted through every retry.
    #[error("Directory unavailable after {attempts} attempts: {last}")]
    ServiceUnavailable { attempts: u32, last: String },
}

impl Retryable for DirectoryError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Timeout(_) | Self::ServiceUnavailable { .. }
        )
    }
}

impl DirectoryError {
    /// Whether a caller may retry the operation later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        Retryable::is_retryable(self)
    }
}

impl From<RetryError<Self>> for DirectoryError {
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

impl From<reqwest::Error> for DirectoryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(Duration::ZERO)
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}
