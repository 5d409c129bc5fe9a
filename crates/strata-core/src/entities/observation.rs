use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::Metadata;
use crate::errors::CoreError;

/// Default observation source when the caller does not name one.
pub const DEFAULT_SOURCE: &str = "api";

/// Lifecycle state of an observation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ObservationState {
    #[default]
    Active,
    /// Superseded by a consolidated row. Kept for history.
    Archived,
}

impl ObservationState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ObservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObservationState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            other => Err(CoreError::Validation(format!(
                "unknown observation state '{other}'"
            ))),
        }
    }
}

/// A timestamped fact attached to an entity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Observation {
    pub id: String,
    pub entity_id: String,
    pub observation_kind: String,
    pub value: serde_json::Value,
    pub source: String,
    pub tags: Vec<String>,
    pub context: Metadata,
    pub consolidation_key: Option<String>,
    pub state: ObservationState,
    /// Row this one was merged into, once archived.
    pub superseded_by: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Observation {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == ObservationState::Active
    }
}

/// Input for a new observation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct NewObservation {
    pub observation_kind: String,
    pub value: serde_json::Value,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: Metadata,
    #[serde(default)]
    pub consolidation_key: Option<String>,
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

impl NewObservation {
    #[must_use]
    pub fn new(observation_kind: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            observation_kind: observation_kind.into(),
            value: value.into(),
            source: default_source(),
            tags: Vec::new(),
            context: Metadata::new(),
            consolidation_key: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Metadata) -> Self {
        self.context = context;
        self
    }

    /// Mark the observation as mergeable with others sharing `key`.
    #[must_use]
    pub fn consolidate_on(mut self, key: impl Into<String>) -> Self {
        self.consolidation_key = Some(key.into());
        self
    }

    /// Whether this input duplicates an existing observation.
    ///
    /// Duplicates share both kind and value; source, tags and context are
    /// ignored.
    #[must_use]
    pub fn duplicates(&self, existing: &Observation) -> bool {
        self.observation_kind == existing.observation_kind && self.value == existing.value
    }
}
