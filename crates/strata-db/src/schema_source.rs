//! A `SchemaSource` backed by the store's `schema_definitions` table.
//!
//! For tests and single-node deployments that have no external schema
//! registry. The latest version of a name wins.

use async_trait::async_trait;
use chrono::Utc;
use strata_core::entities::SchemaDefinition;
use strata_schema::{CachedSchema, SchemaError, SchemaSource};

use crate::ConnHandle;
use crate::error::{DatabaseError, MemoryError};
use crate::helpers::{parse_json, timestamp, to_json};
use crate::service::MemoryService;

/// Reads schemas from `schema_definitions`.
#[derive(Clone)]
pub struct DbSchemaSource {
    handle: ConnHandle,
}

impl DbSchemaSource {
    #[must_use]
    pub const fn new(handle: ConnHandle) -> Self {
        Self { handle }
    }

    async fn latest(&self, name: &str) -> Result<Option<SchemaDefinition>, DatabaseError> {
        let conn = self.handle.read().await;
        let mut rows = conn
            .query(
                "SELECT name, document, version FROM schema_definitions
                 WHERE name = ?1 ORDER BY version DESC LIMIT 1",
                [name],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(SchemaDefinition {
            name: row.get::<String>(0)?,
            document: parse_json(&row.get::<String>(1)?)?,
            version: row.get::<i64>(2)?,
        }))
    }
}

#[async_trait]
impl SchemaSource for DbSchemaSource {
    async fn get_schema(&self, name: &str) -> Result<Option<SchemaDefinition>, SchemaError> {
        self.latest(name)
            .await
            .map_err(|e| SchemaError::Unavailable(e.to_string()))
    }
}

impl MemoryService {
    /// Store a new version of the metadata schema for `entity_kind`.
    ///
    /// The document must compile. The cached copy of the schema is
    /// invalidated so the next validation sees the new version.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::Schema` if the document is not a valid JSON
    /// Schema, or `MemoryError::Database` on storage failure.
    pub async fn register_schema(
        &self,
        entity_kind: &str,
        document: serde_json::Value,
    ) -> Result<SchemaDefinition, MemoryError> {
        let name = SchemaDefinition::name_for_kind(entity_kind);
        let writer = self.write_gate().await;

        let mut rows = writer
            .query(
                "SELECT COALESCE(MAX(version), 0) FROM schema_definitions WHERE name = ?1",
                [name.as_str()],
            )
            .await?;
        let current = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };

        let definition = SchemaDefinition {
            name,
            document,
            version: current + 1,
        };
        CachedSchema::compile(definition.clone())?;

        writer
            .execute(
                "INSERT INTO schema_definitions (name, version, document, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                libsql::params![
                    definition.name.as_str(),
                    definition.version,
                    to_json(&definition.document)?,
                    timestamp(&Utc::now())
                ],
            )
            .await?;

        self.validator().cache().invalidate(&definition.name);
        tracing::info!(schema = %definition.name, version = definition.version, "schema registered");
        Ok(definition)
    }
}
