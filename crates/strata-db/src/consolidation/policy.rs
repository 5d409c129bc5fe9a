//! Entity eligibility for consolidation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use strata_config::ConsolidationConfig;
use strata_core::entities::Entity;
use strata_core::responses::Ineligible;

use super::NEVER_CONSOLIDATE;

/// Thresholds an entity must meet before its observations are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationPolicy {
    pub min_entity_age: Duration,
    pub min_observations: u32,
    pub max_relationships: u32,
    /// Attempts per entity before a conflict is reported as skipped.
    pub max_conflict_retries: u32,
    /// Entities examined per scheduler pass.
    pub batch_size: u32,
}

impl Default for ConsolidationPolicy {
    fn default() -> Self {
        Self::from_config(&ConsolidationConfig::default())
    }
}

impl ConsolidationPolicy {
    #[must_use]
    pub const fn from_config(config: &ConsolidationConfig) -> Self {
        Self {
            min_entity_age: Duration::from_secs(config.min_entity_age_secs),
            min_observations: config.min_observations,
            max_relationships: config.max_relationships,
            max_conflict_retries: config.max_conflict_retries,
            batch_size: config.batch_size,
        }
    }

    /// A policy with no age requirement. Used by tests.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            min_entity_age: Duration::ZERO,
            ..Self::default()
        }
    }

    /// The first threshold the entity misses, or `None` when eligible.
    #[must_use]
    pub fn check(
        &self,
        entity: &Entity,
        active_observations: u32,
        relationships: u32,
        now: DateTime<Utc>,
    ) -> Option<Ineligible> {
        if entity.is_deleted() {
            return Some(Ineligible::Deleted);
        }
        if NEVER_CONSOLIDATE.contains(&entity.entity_kind.as_str()) {
            return Some(Ineligible::ProtectedKind {
                entity_kind: entity.entity_kind.clone(),
            });
        }
        let age_secs = (now - entity.created_at).num_seconds();
        let min_age_secs = i64::try_from(self.min_entity_age.as_secs()).unwrap_or(i64::MAX);
        if age_secs < min_age_secs {
            return Some(Ineligible::TooYoung {
                age_secs,
                min_age_secs,
            });
        }
        if active_observations < self.min_observations {
            return Some(Ineligible::TooFewObservations {
                count: active_observations,
                min: self.min_observations,
            });
        }
        if relationships > self.max_relationships {
            return Some(Ineligible::TooManyRelationships {
                count: relationships,
                max: self.max_relationships,
            });
        }
        None
    }
}
