//! Result types returned by the memory service.
//!
//! These structs define the shape of resolution, traversal, creation,
//! consolidation, and statistics results. They serialize to JSON for the
//! `strata` binary's output.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::{Entity, Observation, RelationType, Relationship};
use crate::realm::{RealmKind, RealmRef};

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// How a resolved entity reached the caller.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct AccessPath {
    /// Realm the winning entity lives in.
    pub realm: RealmRef,
    /// Precedence tier of that realm.
    pub tier: u8,
    /// Realms whose same-named entities lost to this one.
    pub overrode: Vec<RealmRef>,
    /// True when the entity won a group through an explicit `overrides` edge
    /// rather than by sharing its name.
    pub via_override: bool,
}

impl AccessPath {
    #[must_use]
    pub const fn kind(&self) -> RealmKind {
        self.realm.kind
    }
}

/// One winning entity after precedence resolution.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ResolvedEntity {
    pub entity: Entity,
    pub access_path: AccessPath,
    /// Names of lower-precedence entities this entity replaced through
    /// `overrides` edges.
    pub overrides: Vec<String>,
}

/// All entities visible to one caller, one per logical name.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ResolvedSet {
    pub caller: RealmRef,
    pub visible_realms: Vec<RealmRef>,
    pub entities: Vec<ResolvedEntity>,
}

impl ResolvedSet {
    /// Find the winner for a logical name, following overrides.
    #[must_use]
    pub fn winner_for(&self, name: &str) -> Option<&ResolvedEntity> {
        self.entities.iter().find(|r| r.entity.entity_name == name).or_else(|| {
            self.entities
                .iter()
                .find(|r| r.overrides.iter().any(|o| o == name))
        })
    }
}

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

/// A node reached during traversal.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TraversalNode {
    pub resolved: ResolvedEntity,
    pub depth: u32,
}

/// Result of a bounded breadth-first traversal.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TraversalResult {
    pub nodes: Vec<TraversalNode>,
    pub edges: Vec<Relationship>,
    /// Deepest hop that produced at least one node.
    pub depth_reached: u32,
    /// True when the node budget stopped the walk early.
    pub truncated: bool,
}

/// One path between two entities.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ConnectionPath {
    /// Entity names along the path, endpoints included.
    pub entities: Vec<String>,
    /// Relation types of the edges along the path.
    #[schemars(with = "Vec<String>")]
    pub relations: Vec<RelationType>,
}

impl ConnectionPath {
    #[must_use]
    pub const fn hops(&self) -> usize {
        self.relations.len()
    }
}

/// Paths found between two entities, shortest first.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ConnectionReport {
    pub from: String,
    pub to: Option<String>,
    pub max_hops: u32,
    pub paths: Vec<ConnectionPath>,
    /// True when the search budget ran out before every path was explored.
    pub truncated: bool,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Everything written by an atomic complete-entity creation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CompleteEntityReceipt {
    pub entity: Entity,
    pub observations: Vec<Observation>,
    pub relationships: Vec<Relationship>,
    /// False when an existing live entity was merged instead of created.
    pub created: bool,
}

/// Result of appending observations to a named entity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AddObservationsResult {
    pub entity_id: String,
    pub added: Vec<Observation>,
    pub skipped_duplicates: u32,
    pub total_active: u32,
}

/// Every live entity and relationship of one realm.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GraphSnapshot {
    pub realm: RealmRef,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

// ---------------------------------------------------------------------------
// Consolidation
// ---------------------------------------------------------------------------

/// Why an entity was not eligible for consolidation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Ineligible {
    TooYoung { age_secs: i64, min_age_secs: i64 },
    TooFewObservations { count: u32, min: u32 },
    TooManyRelationships { count: u32, max: u32 },
    Deleted,
    /// The entity's kind is one whose observations are only ever appended.
    ProtectedKind { entity_kind: String },
}

/// One consolidation key merged into a single active row.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct KeyMerge {
    pub consolidation_key: String,
    pub kept_id: String,
    pub archived_ids: Vec<String>,
    pub merge_count: u32,
}

/// Summary of a consolidation pass over one entity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ConsolidationReport {
    pub entity_id: String,
    pub table_version: u32,
    pub merges: Vec<KeyMerge>,
    pub at: DateTime<Utc>,
}

impl ConsolidationReport {
    #[must_use]
    pub fn archived_count(&self) -> usize {
        self.merges.iter().map(|m| m.archived_ids.len()).sum()
    }
}

/// Outcome of consolidating one entity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ConsolidationOutcome {
    Consolidated(ConsolidationReport),
    /// Eligible, but nothing new to merge.
    NoOp,
    Ineligible(Ineligible),
    /// Gave up after repeated optimistic-concurrency conflicts.
    Skipped { attempts: u32 },
}

/// Totals over a batch pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ConsolidationSweep {
    pub scanned: u32,
    pub consolidated: u32,
    pub archived: u32,
    pub noop: u32,
    pub ineligible: u32,
    pub skipped: u32,
}

impl ConsolidationSweep {
    pub fn record(&mut self, outcome: &ConsolidationOutcome) {
        self.scanned += 1;
        match outcome {
            ConsolidationOutcome::Consolidated(report) => {
                self.consolidated += 1;
                self.archived += u32::try_from(report.archived_count()).unwrap_or(u32::MAX);
            }
            ConsolidationOutcome::NoOp => self.noop += 1,
            ConsolidationOutcome::Ineligible(_) => self.ineligible += 1,
            ConsolidationOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Store-wide counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct StoreStats {
    pub entities: u64,
    pub deleted_entities: u64,
    pub relationships: u64,
    pub active_observations: u64,
    pub archived_observations: u64,
    /// Live entities with fewer than one relationship or two observations.
    pub incomplete_entities: u64,
    /// Live entity counts keyed by realm kind.
    pub entities_by_realm: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sweep_tallies_outcomes() {
        let mut sweep = ConsolidationSweep::default();
        sweep.record(&ConsolidationOutcome::NoOp);
        sweep.record(&ConsolidationOutcome::Skipped { attempts: 3 });
        sweep.record(&ConsolidationOutcome::Consolidated(ConsolidationReport {
            entity_id: "ent-1".into(),
            table_version: 1,
            merges: vec![KeyMerge {
                consolidation_key: "engagement_rate".into(),
                kept_id: "obs-2".into(),
                archived_ids: vec!["obs-1".into()],
                merge_count: 2,
            }],
            at: Utc::now(),
        }));

        assert_eq!(sweep.scanned, 3);
        assert_eq!(sweep.consolidated, 1);
        assert_eq!(sweep.archived, 1);
        assert_eq!(sweep.noop, 1);
        assert_eq!(sweep.skipped, 1);
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_value(ConsolidationOutcome::Ineligible(
            Ineligible::TooFewObservations { count: 1, min: 2 },
        ))
        .unwrap();
        assert_eq!(json["outcome"], "ineligible");
        assert_eq!(json["detail"]["reason"], "too_few_observations");
    }
}
