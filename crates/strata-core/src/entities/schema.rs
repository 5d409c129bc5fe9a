use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A JSON Schema document for one entity kind's metadata.
///
/// Schemas are named `{entity_kind}_metadata`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SchemaDefinition {
    pub name: String,
    pub document: serde_json::Value,
    pub version: i64,
}

impl SchemaDefinition {
    /// Schema name for an entity kind.
    #[must_use]
    pub fn name_for_kind(entity_kind: &str) -> String {
        format!("{entity_kind}_metadata")
    }
}
