//! Consolidation engine and scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const fn default_min_entity_age_secs() -> u64 {
    3600
}

const fn default_min_observations() -> u32 {
    2
}

const fn default_max_relationships() -> u32 {
    10
}

const fn default_interval_secs() -> u64 {
    900
}

const fn default_batch_size() -> u32 {
    100
}

const fn default_max_conflict_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsolidationConfig {
    /// Entities younger than this are left alone.
    #[serde(default = "default_min_entity_age_secs")]
    pub min_entity_age_secs: u64,

    /// Minimum active observations before an entity is considered.
    #[serde(default = "default_min_observations")]
    pub min_observations: u32,

    /// Highly connected entities are skipped above this many live relationships.
    #[serde(default = "default_max_relationships")]
    pub max_relationships: u32,

    /// Seconds between scheduler passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Entities examined per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Attempts per entity before a version conflict is reported as skipped.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            min_entity_age_secs: default_min_entity_age_secs(),
            min_observations: default_min_observations(),
            max_relationships: default_max_relationships(),
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

impl ConsolidationConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::invalid(
                "consolidation.interval_secs",
                "must be greater than zero",
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid(
                "consolidation.batch_size",
                "must be greater than zero",
            ));
        }
        if self.max_conflict_retries == 0 {
            return Err(ConfigError::invalid(
                "consolidation.max_conflict_retries",
                "must allow at least one attempt",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = ConsolidationConfig::default();
        assert_eq!(config.min_entity_age_secs, 3600);
        assert_eq!(config.min_observations, 2);
        assert_eq!(config.max_relationships, 10);
        assert_eq!(config.interval(), Duration::from_secs(900));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_batch_is_invalid() {
        let config = ConsolidationConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "consolidation.batch_size"
        ));
    }
}
