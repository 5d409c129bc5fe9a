use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::Metadata;
use crate::errors::CoreError;

/// Open-vocabulary relation type.
///
/// Any lowercase `snake_case` word of at most 64 characters is accepted. The
/// well-known types are exposed as constants; `OVERRIDES` is the one the
/// resolver gives meaning to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelationType(Cow<'static, str>);

impl RelationType {
    pub const REQUIRES: Self = Self(Cow::Borrowed("requires"));
    pub const VALIDATES: Self = Self(Cow::Borrowed("validates"));
    pub const OVERRIDES: Self = Self(Cow::Borrowed("overrides"));
    pub const SUPERSEDES: Self = Self(Cow::Borrowed("supersedes"));
    pub const DEPENDS_ON: Self = Self(Cow::Borrowed("depends_on"));
    pub const RELATES_TO: Self = Self(Cow::Borrowed("relates_to"));

    const MAX_LEN: usize = 64;

    /// Build a relation type from an arbitrary string.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRelationType` when the string is empty, too
    /// long, or not lowercase `snake_case`.
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        let well_formed = !value.is_empty()
            && value.len() <= Self::MAX_LEN
            && value
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            && !value.starts_with('_');
        if !well_formed {
            return Err(CoreError::InvalidRelationType(value));
        }
        Ok(Self(Cow::Owned(value)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_override(&self) -> bool {
        *self == Self::OVERRIDES
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RelationType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RelationType> for String {
    fn from(value: RelationType) -> Self {
        value.0.into_owned()
    }
}

impl std::str::FromStr for RelationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A directed edge between two entities. Edges may cross realms.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub from_entity_id: String,
    pub to_entity_id: String,
    #[schemars(with = "String")]
    pub relation_type: RelationType,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("requires")]
    #[case("derived_from")]
    #[case("step2")]
    fn accepts_snake_case(#[case] value: &str) {
        assert_eq!(RelationType::new(value).unwrap().as_str(), value);
    }

    #[rstest]
    #[case("")]
    #[case("Overrides")]
    #[case("depends on")]
    #[case("_private")]
    fn rejects_malformed(#[case] value: &str) {
        assert!(RelationType::new(value).is_err());
    }

    #[test]
    fn constants_compare_with_parsed_values() {
        let parsed: RelationType = "overrides".parse().unwrap();
        assert_eq!(parsed, RelationType::OVERRIDES);
        assert!(parsed.is_override());
        assert!(!RelationType::REQUIRES.is_override());
    }

    #[test]
    fn serde_goes_through_validation() {
        let ok: RelationType = serde_json::from_str("\"validates\"").unwrap();
        assert_eq!(ok, RelationType::VALIDATES);
        assert!(serde_json::from_str::<RelationType>("\"NOT VALID\"").is_err());
    }
}
