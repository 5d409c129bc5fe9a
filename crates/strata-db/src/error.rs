//! Error types for strata-db.
//!
//! `DatabaseError` covers storage. `MemoryError` is the service surface:
//! every collaborator error converges here, classified so that callers can
//! tell permanent rejections from transient outages.

use strata_core::RealmRef;
use strata_core::entities::RelationType;
use strata_core::errors::CoreError;
use strata_core::retry::{RetryError, Retryable};
use strata_directory::DirectoryError;
use strata_schema::{FieldError, SchemaError};
use thiserror::Error;

/// Errors from database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A SQL query failed.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Invalid state encountered (e.g., bad data in DB).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors surfaced by `MemoryService`.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The realm's owning actor does not exist.
    #[error("Actor not found for realm {realm}")]
    ActorNotFound { realm: RealmRef },

    /// Metadata failed the schema gate. Nothing was persisted.
    #[error("Schema validation failed against '{schema}': {} error(s)", errors.len())]
    SchemaValidationFailed {
        schema: String,
        errors: Vec<FieldError>,
    },

    /// No schema is registered for the entity kind.
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Relationship {from} -[{relation_type}]-> {to} already exists")]
    DuplicateRelationship {
        from: String,
        to: String,
        relation_type: RelationType,
    },

    #[error("Entity {entity_id} cannot relate to itself")]
    SelfRelationship { entity_id: String },

    /// The entity is missing or soft-deleted.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(String),

    /// A complete entity needs at least one relationship and two observations.
    #[error(
        "Incomplete entity: {relationships} relationship(s) and {observations} observation(s), \
         need at least 1 and 2"
    )]
    IncompleteEntity {
        relationships: usize,
        observations: usize,
    },

    /// Bad caller input: entity name, realm, relation type.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    /// An observation changed between read and optimistic update.
    #[error("Consolidation conflict on entity {entity_id}, observation {observation_id}")]
    ConsolidationConflict {
        entity_id: String,
        observation_id: String,
    },

    /// An entity changed between read and optimistic update.
    #[error("Entity '{name}' in {realm} was modified concurrently")]
    WriteConflict { realm: RealmRef, name: String },

    /// A collaborator stayed unreachable through every retry.
    #[error("{service} unavailable: {detail}")]
    ServiceUnavailable {
        service: &'static str,
        detail: String,
    },

    /// Directory errors with no more specific mapping.
    #[error(transparent)]
    Directory(DirectoryError),

    /// Schema errors with no more specific mapping.
    #[error(transparent)]
    Schema(SchemaError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl MemoryError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable { .. }
                | Self::ConsolidationConflict { .. }
                | Self::WriteConflict { .. }
        )
    }
}

impl Retryable for MemoryError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

impl From<libsql::Error> for MemoryError {
    fn from(e: libsql::Error) -> Self {
        Self::Database(DatabaseError::LibSql(e))
    }
}

impl From<DirectoryError> for MemoryError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::ActorNotFound { realm } => Self::ActorNotFound { realm },
            DirectoryError::Unavailable(_)
            | DirectoryError::Timeout(_)
            | DirectoryError::ServiceUnavailable { .. } => Self::ServiceUnavailable {
                service: "actor directory",
                detail: e.to_string(),
            },
            other => Self::Directory(other),
        }
    }
}

impl From<SchemaError> for MemoryError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::ValidationFailed { schema, errors } => {
                Self::SchemaValidationFailed { schema, errors }
            }
            SchemaError::NotFound(name) => Self::SchemaNotFound(name),
            SchemaError::Unavailable(_)
            | SchemaError::Timeout(_)
            | SchemaError::ServiceUnavailable { .. } => Self::ServiceUnavailable {
                service: "schema registry",
                detail: e.to_string(),
            },
            other => Self::Schema(other),
        }
    }
}

impl From<RetryError<Self>> for MemoryError {
    fn from(e: RetryError<Self>) -> Self {
        e.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn directory_errors_are_classified() {
        let not_found: MemoryError = DirectoryError::ActorNotFound {
            realm: RealmRef::client("ghost"),
        }
        .into();
        assert!(matches!(not_found, MemoryError::ActorNotFound { .. }));
        assert!(!not_found.is_retryable());

        let outage: MemoryError = DirectoryError::Timeout(Duration::from_secs(2)).into();
        assert!(matches!(outage, MemoryError::ServiceUnavailable { .. }));
        assert!(outage.is_retryable());
    }

    #[test]
    fn schema_errors_are_classified() {
        let missing: MemoryError = SchemaError::NotFound("sop_metadata".into()).into();
        assert!(matches!(missing, MemoryError::SchemaNotFound(ref n) if n == "sop_metadata"));
        assert!(!missing.is_retryable());

        let failed: MemoryError = SchemaError::ValidationFailed {
            schema: "sop_metadata".into(),
            errors: vec![FieldError {
                path: "/owner".into(),
                message: "required".into(),
            }],
        }
        .into();
        assert!(matches!(failed, MemoryError::SchemaValidationFailed { ref errors, .. } if errors.len() == 1));
    }

    #[test]
    fn conflicts_are_retryable() {
        let conflict = MemoryError::ConsolidationConflict {
            entity_id: "ent-1".into(),
            observation_id: "obs-1".into(),
        };
        assert!(conflict.is_retryable());
        assert!(!MemoryError::EntityNotFound("ent-1".into()).is_retryable());
    }
}
