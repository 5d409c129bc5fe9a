//! Consolidation engine.
//!
//! Statistical observations sharing a consolidation key are folded into
//! their newest row; older rows are archived with `superseded_by` pointing
//! at it. Writes are version-checked, so a concurrent change to any row in
//! a plan aborts the whole entity pass with `ConsolidationConflict`.

pub mod classify;
pub mod merge;
pub mod policy;
pub mod scheduler;

use chrono::{DateTime, Utc};
use strata_core::responses::{
    ConsolidationOutcome, ConsolidationReport, ConsolidationSweep, KeyMerge,
};
use strata_core::retry::{RetryConfig, RetryError, retry};

pub use classify::{ClassificationTable, NEVER_CONSOLIDATE, ObservationClass};
pub use merge::{CONSOLIDATED_KEY, KeyPlan, is_consolidated, percent_delta, plan_merges};
pub use policy::ConsolidationPolicy;
pub use scheduler::ConsolidationScheduler;

use crate::error::MemoryError;
use crate::helpers::{now, timestamp, to_json};
use crate::repos::entity::fetch_entity;
use crate::repos::observation::load_observations;
use crate::repos::relationship::count_live_edges;
use crate::service::{MemoryService, finish};

/// Write every plan for one entity, or none of them.
///
/// Must run inside a transaction. A row whose version moved since it was
/// read fails the whole set.
pub(crate) async fn apply_plans(
    conn: &libsql::Connection,
    entity_id: &str,
    plans: &[KeyPlan],
    at: DateTime<Utc>,
) -> Result<Vec<KeyMerge>, MemoryError> {
    let written_at = timestamp(&at);
    let conflict = |observation_id: &str| MemoryError::ConsolidationConflict {
        entity_id: entity_id.to_string(),
        observation_id: observation_id.to_string(),
    };

    let mut merges = Vec::with_capacity(plans.len());
    for plan in plans {
        let changed = conn
            .execute(
                "UPDATE observations SET value = ?1, version = version + 1, updated_at = ?2
                 WHERE id = ?3 AND version = ?4 AND state = 'active'",
                libsql::params![
                    to_json(&plan.value)?,
                    written_at.as_str(),
                    plan.keep.id.as_str(),
                    plan.keep.version
                ],
            )
            .await?;
        if changed == 0 {
            return Err(conflict(&plan.keep.id));
        }

        for old in &plan.archive {
            let changed = conn
                .execute(
                    "UPDATE observations
                     SET state = 'archived', superseded_by = ?1, version = version + 1,
                         updated_at = ?2
                     WHERE id = ?3 AND version = ?4 AND state = 'active'",
                    libsql::params![
                        plan.keep.id.as_str(),
                        written_at.as_str(),
                        old.id.as_str(),
                        old.version
                    ],
                )
                .await?;
            if changed == 0 {
                return Err(conflict(&old.id));
            }
        }

        merges.push(KeyMerge {
            consolidation_key: plan.consolidation_key.clone(),
            kept_id: plan.keep.id.clone(),
            archived_ids: plan.archive.iter().map(|o| o.id.clone()).collect(),
            merge_count: plan.merge_count,
        });
    }
    Ok(merges)
}

/// Append `values` to `params` and return their `?N` placeholders, comma
/// separated.
fn placeholders<'a>(
    params: &mut Vec<libsql::Value>,
    values: impl Iterator<Item = &'a str>,
) -> String {
    let mut slots = Vec::new();
    for value in values {
        params.push(value.into());
        slots.push(format!("?{}", params.len()));
    }
    slots.join(", ")
}

impl MemoryService {
    /// One optimistic pass over an entity.
    async fn consolidate_once(&self, entity_id: &str) -> Result<ConsolidationOutcome, MemoryError> {
        let conn = self.db().read().await;
        let entity = fetch_entity(&conn, entity_id)
            .await?
            .ok_or_else(|| MemoryError::EntityNotFound(entity_id.to_string()))?;
        let observations = load_observations(&conn, entity_id, false).await?;
        let edges = count_live_edges(&conn, entity_id).await?;
        drop(conn);
        let active = u32::try_from(observations.len()).unwrap_or(u32::MAX);

        let at = now();
        let settings = self.settings();
        if let Some(reason) = settings.consolidation.check(&entity, active, edges, at) {
            return Ok(ConsolidationOutcome::Ineligible(reason));
        }

        let plans = plan_merges(&observations, &settings.classification, at);
        if plans.is_empty() {
            return Ok(ConsolidationOutcome::NoOp);
        }

        let _gate = self.write_gate().await;
        let tx = self.begin().await?;
        let applied = apply_plans(&tx, entity_id, &plans, at).await;
        let merges = finish(tx, applied).await?;

        Ok(ConsolidationOutcome::Consolidated(ConsolidationReport {
            entity_id: entity_id.to_string(),
            table_version: settings.classification.version,
            merges,
            at,
        }))
    }

    /// Merge an entity's statistical observations.
    ///
    /// Conflicts are retried with backoff up to the policy's
    /// `max_conflict_retries`, after which the entity is reported as
    /// `Skipped` rather than failing.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::EntityNotFound` for an unknown id, and
    /// `MemoryError::Database` on storage failure.
    pub async fn consolidate_entity(
        &self,
        entity_id: &str,
    ) -> Result<ConsolidationOutcome, MemoryError> {
        let base = &self.settings().retry;
        let config = RetryConfig {
            max_attempts: self.settings().consolidation.max_conflict_retries.max(1),
            base_delay: base.base_delay,
            max_delay: base.max_delay,
        };

        let outcome = match retry(&config, "consolidate_entity", || {
            self.consolidate_once(entity_id)
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(RetryError::Exhausted {
                attempts,
                last: MemoryError::ConsolidationConflict { observation_id, .. },
            }) => {
                tracing::warn!(
                    entity_id,
                    observation_id = %observation_id,
                    attempts,
                    "consolidation skipped after conflicts"
                );
                ConsolidationOutcome::Skipped { attempts }
            }
            Err(e) => return Err(e.into_inner()),
        };

        if let ConsolidationOutcome::Consolidated(report) = &outcome {
            tracing::debug!(
                entity_id,
                keys = report.merges.len(),
                archived = report.archived_count(),
                "entity consolidated"
            );
        }
        Ok(outcome)
    }

    /// Ids of entities the policy would accept that hold at least two
    /// active rows of a statistical kind under one consolidation key.
    ///
    /// The filters mirror [`ConsolidationPolicy::check`] and
    /// [`plan_merges`], so an entity that would come back ineligible or
    /// as a no-op never takes a batch slot.
    async fn consolidation_candidates(&self) -> Result<Vec<String>, MemoryError> {
        let settings = self.settings();
        let policy = &settings.consolidation;
        let min_age = chrono::Duration::from_std(policy.min_entity_age)
            .unwrap_or(chrono::Duration::MAX);
        let cutoff = now()
            .checked_sub_signed(min_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut params: Vec<libsql::Value> = vec![
            timestamp(&cutoff).into(),
            i64::from(policy.min_observations).into(),
            i64::from(policy.max_relationships).into(),
            i64::from(policy.batch_size).into(),
        ];
        let protected = placeholders(&mut params, NEVER_CONSOLIDATE.iter().copied());
        let statistical =
            placeholders(&mut params, settings.classification.statistical_kinds());
        if statistical.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT e.id FROM entities e
             WHERE e.deleted_at IS NULL AND e.created_at <= ?1
               AND e.entity_kind NOT IN ({protected})
               AND (SELECT COUNT(*) FROM observations a
                    WHERE a.entity_id = e.id AND a.state = 'active') >= ?2
               AND (SELECT COUNT(*) FROM relationships r
                    WHERE (r.from_entity_id = e.id OR r.to_entity_id = e.id)
                      AND r.deleted_at IS NULL) <= ?3
               AND EXISTS (
                    SELECT 1 FROM observations o
                    WHERE o.entity_id = e.id AND o.state = 'active'
                      AND o.consolidation_key IS NOT NULL
                      AND o.observation_kind IN ({statistical})
                    GROUP BY o.consolidation_key
                    HAVING COUNT(*) >= 2)
             ORDER BY e.id LIMIT ?4"
        );
        let conn = self.db().read().await;
        let mut rows = conn.query(&sql, libsql::params_from_iter(params)).await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    /// One batch pass over the entities most likely to need merging.
    ///
    /// A failure on one entity is logged and counted as skipped; the pass
    /// continues with the rest.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::Database` if the candidate scan fails.
    pub async fn consolidate_batch(&self) -> Result<ConsolidationSweep, MemoryError> {
        let mut sweep = ConsolidationSweep::default();
        for entity_id in self.consolidation_candidates().await? {
            match self.consolidate_entity(&entity_id).await {
                Ok(outcome) => sweep.record(&outcome),
                Err(error) => {
                    tracing::warn!(entity_id = %entity_id, %error, "consolidation failed");
                    sweep.record(&ConsolidationOutcome::Skipped { attempts: 1 });
                }
            }
        }
        tracing::info!(
            scanned = sweep.scanned,
            consolidated = sweep.consolidated,
            archived = sweep.archived,
            ineligible = sweep.ineligible,
            skipped = sweep.skipped,
            "consolidation pass complete"
        );
        Ok(sweep)
    }
}
