//! JSON Schemas for Strata's own types.
//!
//! The `TypeRegistry` builds JSON Schemas from strata-core types at
//! construction time using [`schemars::schema_for!`]. It backs the
//! `strata schema` export and lets callers check JSON produced by other tools
//! against the shapes this workspace emits.

use std::collections::HashMap;

use schemars::schema_for;
use strata_core::entities::SchemaDefinition;

use crate::{CachedSchema, FieldError, SchemaError};

pub struct TypeRegistry {
    schemas: HashMap<&'static str, serde_json::Value>,
}

/// Insert a schema into the map, converting the `schemars` output to a
/// `serde_json::Value`. Types whose schema fails to serialize are skipped.
macro_rules! register {
    ($map:expr, $name:expr, $ty:ty) => {
        if let Ok(value) = serde_json::to_value(schema_for!($ty)) {
            $map.insert($name, value);
        }
    };
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        use strata_core::{entities, realm, responses};

        let mut schemas = HashMap::new();

        // --- Stored types ---
        register!(schemas, "entity", entities::Entity);
        register!(schemas, "relationship", entities::Relationship);
        register!(schemas, "observation", entities::Observation);
        register!(schemas, "new_observation", entities::NewObservation);
        register!(schemas, "schema_definition", entities::SchemaDefinition);
        register!(schemas, "validation_stamp", entities::ValidationStamp);
        register!(schemas, "realm_membership", realm::RealmMembership);

        // --- Service results ---
        register!(schemas, "resolved_set", responses::ResolvedSet);
        register!(schemas, "traversal_result", responses::TraversalResult);
        register!(schemas, "connection_report", responses::ConnectionReport);
        register!(
            schemas,
            "complete_entity_receipt",
            responses::CompleteEntityReceipt
        );
        register!(
            schemas,
            "add_observations_result",
            responses::AddObservationsResult
        );
        register!(schemas, "graph_snapshot", responses::GraphSnapshot);
        register!(
            schemas,
            "consolidation_outcome",
            responses::ConsolidationOutcome
        );
        register!(schemas, "consolidation_sweep", responses::ConsolidationSweep);
        register!(schemas, "store_stats", responses::StoreStats);

        // --- Validation ---
        register!(schemas, "validation_report", crate::ValidationReport);

        Self { schemas }
    }

    /// Get a schema by name. Returns `None` if not found.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.schemas.get(name)
    }

    /// Validate a JSON value against a named type schema.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::NotFound` if the schema name is unknown, or
    /// `SchemaError::ValidationFailed` if validation produces errors.
    pub fn validate(&self, name: &str, instance: &serde_json::Value) -> Result<(), SchemaError> {
        let document = self
            .get(name)
            .ok_or_else(|| SchemaError::NotFound(name.to_string()))?;

        let compiled = CachedSchema::compile(SchemaDefinition {
            name: name.to_string(),
            document: document.clone(),
            version: 1,
        })?;

        let errors: Vec<FieldError> = compiled
            .validator
            .iter_errors(instance)
            .map(|e| FieldError {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::ValidationFailed {
                schema: name.to_string(),
                errors,
            })
        }
    }

    /// List all registered schema names, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.schemas.keys().copied().collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn schema_count(&self) -> usize {
        self.schemas.len()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
