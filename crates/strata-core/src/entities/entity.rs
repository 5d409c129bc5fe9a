use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::realm::RealmRef;

/// Entity metadata: always a JSON object.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A named node of memory, owned by exactly one realm.
///
/// `(realm, entity_name)` is unique among live entities. `version` is bumped
/// on every write and guards optimistic updates.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Entity {
    pub id: String,
    pub realm: RealmRef,
    pub entity_name: String,
    pub entity_kind: String,
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity {
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
