use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::Metadata;

/// Reserved metadata key holding the validation stamp.
pub const VALIDATION_KEY: &str = "_validation";

/// Proof that metadata passed the schema gate.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ValidationStamp {
    pub schema: String,
    pub schema_version: i64,
    pub validated_at: DateTime<Utc>,
    pub passed: bool,
}

impl ValidationStamp {
    #[must_use]
    pub fn passed(schema: impl Into<String>, schema_version: i64) -> Self {
        Self {
            schema: schema.into(),
            schema_version,
            validated_at: Utc::now(),
            passed: true,
        }
    }

    /// Read the stamp carried by `metadata`, if any.
    #[must_use]
    pub fn read(metadata: &Metadata) -> Option<Self> {
        metadata
            .get(VALIDATION_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Write this stamp into `metadata`, replacing any previous stamp.
    pub fn apply(&self, metadata: &mut Metadata) {
        if let Ok(value) = serde_json::to_value(self) {
            metadata.insert(VALIDATION_KEY.to_string(), value);
        }
    }

    /// Return `metadata` without its stamp.
    #[must_use]
    pub fn strip(metadata: &Metadata) -> Metadata {
        let mut stripped = metadata.clone();
        stripped.remove(VALIDATION_KEY);
        stripped
    }
}
