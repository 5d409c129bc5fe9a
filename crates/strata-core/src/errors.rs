//! Cross-cutting error types for Strata.
//!
//! This module defines errors that can originate from any crate in the system.
//! Domain-specific errors (e.g., `DatabaseError`, `SchemaError`) are defined in
//! their respective crates. The service-level `MemoryError` lives in `strata-db`
//! where all crate errors converge.

use thiserror::Error;

/// Errors that can be raised by any Strata crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A realm kind string outside the closed realm union.
    #[error("Invalid realm kind: {0}")]
    InvalidRealmKind(String),

    /// An entity name that breaks the naming rules.
    #[error("Invalid entity name '{name}': {reason}")]
    InvalidEntityName { name: String, reason: String },

    /// A relation type that breaks the vocabulary rules.
    #[error("Invalid relation type '{0}'")]
    InvalidRelationType(String),

    /// Data failed validation (format, constraints).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
