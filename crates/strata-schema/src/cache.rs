//! Schema cache handle.
//!
//! Holds fetched schema documents together with their compiled validators,
//! so each schema is compiled once per TTL window. The cache is an explicit
//! value passed around by `Arc`; there is no process-wide instance.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use strata_core::entities::SchemaDefinition;

use crate::SchemaError;

/// A schema document plus its compiled validator.
#[derive(Clone)]
pub struct CachedSchema {
    pub definition: SchemaDefinition,
    pub validator: Arc<jsonschema::Validator>,
}

impl CachedSchema {
    /// Compile a schema definition.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::InvalidSchema` if the document does not compile.
    pub fn compile(definition: SchemaDefinition) -> Result<Self, SchemaError> {
        let validator = jsonschema::validator_for(&definition.document).map_err(|e| {
            SchemaError::InvalidSchema {
                name: definition.name.clone(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            definition,
            validator: Arc::new(validator),
        })
    }
}

impl std::fmt::Debug for CachedSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSchema")
            .field("name", &self.definition.name)
            .field("version", &self.definition.version)
            .finish_non_exhaustive()
    }
}

/// Upper bound on cached schemas.
pub const MAX_CACHED_SCHEMAS: u64 = 1_000;

pub struct SchemaCache {
    entries: Cache<String, CachedSchema>,
}

impl SchemaCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(MAX_CACHED_SCHEMAS)
                .build(),
        }
    }

    /// A live cached schema, or `None` when missing or expired.
    pub fn get(&self, name: &str) -> Option<CachedSchema> {
        self.entries.get(name)
    }

    pub fn insert(&self, schema: CachedSchema) {
        self.entries
            .insert(schema.definition.name.clone(), schema);
    }

    /// Forget one schema so the next lookup refetches it.
    pub fn invalidate(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Number of live entries.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
