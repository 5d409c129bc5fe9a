//! Observation repository: append with dedup, and reads.
//!
//! Observations are append-only. The only in-place rewrite is done by the
//! consolidation engine.

use chrono::{DateTime, Duration, Utc};
use strata_core::RealmRef;
use strata_core::entities::{Entity, NewObservation, Observation, ObservationState};
use strata_core::ids::PREFIX_OBSERVATION;
use strata_core::responses::AddObservationsResult;
use strata_embeddings::entity_text;

use crate::error::{DatabaseError, MemoryError};
use crate::helpers::{
    embedding_to_blob, get_opt_string, now, parse_datetime, parse_enum, parse_json, parse_object,
    parse_string_list, timestamp, to_json,
};
use crate::repos::entity::fetch_live_entity;
use crate::service::{MemoryService, finish};

pub(crate) const OBSERVATION_COLUMNS: &str = "id, entity_id, observation_kind, value, source, \
     tags, context, consolidation_key, state, superseded_by, version, created_at, updated_at";

pub(crate) fn row_to_observation(row: &libsql::Row) -> Result<Observation, DatabaseError> {
    Ok(Observation {
        id: row.get::<String>(0)?,
        entity_id: row.get::<String>(1)?,
        observation_kind: row.get::<String>(2)?,
        value: parse_json(&row.get::<String>(3)?)?,
        source: row.get::<String>(4)?,
        tags: parse_string_list(&row.get::<String>(5)?)?,
        context: parse_object(&row.get::<String>(6)?)?,
        consolidation_key: get_opt_string(row, 7)?,
        state: parse_enum(&row.get::<String>(8)?)?,
        superseded_by: get_opt_string(row, 9)?,
        version: row.get::<i64>(10)?,
        created_at: parse_datetime(&row.get::<String>(11)?)?,
        updated_at: parse_datetime(&row.get::<String>(12)?)?,
    })
}

/// Split `incoming` into rows to write and a count of duplicates.
///
/// A duplicate matches an existing active observation, or an earlier
/// incoming one, on `(kind, value)`.
pub(crate) fn dedup_observations(
    existing: &[Observation],
    incoming: Vec<NewObservation>,
) -> (Vec<NewObservation>, u32) {
    let mut fresh: Vec<NewObservation> = Vec::with_capacity(incoming.len());
    let mut skipped = 0;
    for candidate in incoming {
        let seen = existing
            .iter()
            .any(|o| o.is_active() && candidate.duplicates(o))
            || fresh.iter().any(|f| {
                f.observation_kind == candidate.observation_kind && f.value == candidate.value
            });
        if seen {
            skipped += 1;
        } else {
            fresh.push(candidate);
        }
    }
    (fresh, skipped)
}

pub(crate) fn to_new_observation(observation: &Observation) -> NewObservation {
    NewObservation {
        observation_kind: observation.observation_kind.clone(),
        value: observation.value.clone(),
        source: observation.source.clone(),
        tags: observation.tags.clone(),
        context: observation.context.clone(),
        consolidation_key: observation.consolidation_key.clone(),
    }
}

/// Insert one observation.
///
/// Rows written in one batch get `now + offset` microseconds, so their
/// creation order survives a sort on `created_at`.
pub(crate) async fn insert_observation(
    conn: &libsql::Connection,
    entity_id: &str,
    observation: &NewObservation,
    now: DateTime<Utc>,
    offset: usize,
) -> Result<Observation, DatabaseError> {
    let at = now + Duration::microseconds(i64::try_from(offset).unwrap_or(i64::MAX));
    let id = crate::generate_id(conn, PREFIX_OBSERVATION).await?;
    conn.execute(
        "INSERT INTO observations (id, entity_id, observation_kind, value, source, tags, context,
             consolidation_key, state, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'active', 1, ?9, ?9)",
        libsql::params![
            id.as_str(),
            entity_id,
            observation.observation_kind.as_str(),
            to_json(&observation.value)?,
            observation.source.as_str(),
            to_json(&observation.tags)?,
            to_json(&observation.context)?,
            observation.consolidation_key.as_deref(),
            timestamp(&at)
        ],
    )
    .await?;

    Ok(Observation {
        id,
        entity_id: entity_id.to_string(),
        observation_kind: observation.observation_kind.clone(),
        value: observation.value.clone(),
        source: observation.source.clone(),
        tags: observation.tags.clone(),
        context: observation.context.clone(),
        consolidation_key: observation.consolidation_key.clone(),
        state: ObservationState::Active,
        superseded_by: None,
        version: 1,
        created_at: at,
        updated_at: at,
    })
}

/// Active (or all) observations of an entity, oldest first.
pub(crate) async fn load_observations(
    conn: &libsql::Connection,
    entity_id: &str,
    include_archived: bool,
) -> Result<Vec<Observation>, DatabaseError> {
    let state_filter = if include_archived {
        ""
    } else {
        " AND state = 'active'"
    };
    let mut rows = conn
        .query(
            &format!(
                "SELECT {OBSERVATION_COLUMNS} FROM observations
                 WHERE entity_id = ?1{state_filter} ORDER BY created_at, id"
            ),
            [entity_id],
        )
        .await?;
    let mut observations = Vec::new();
    while let Some(row) = rows.next().await? {
        observations.push(row_to_observation(&row)?);
    }
    Ok(observations)
}

impl MemoryService {
    /// Append one observation to a live entity and re-embed it.
    ///
    /// No dedup is applied: the caller asked for this exact row.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::EntityNotFound` if the entity is missing or deleted.
    pub async fn add_observation(
        &self,
        entity_id: &str,
        observation: NewObservation,
    ) -> Result<Observation, MemoryError> {
        let entity = fetch_live_entity(&*self.db().read().await, entity_id)
            .await?
            .ok_or_else(|| MemoryError::EntityNotFound(entity_id.to_string()))?;
        let current = self.observations_for(entity_id, false).await?;
        let mut added = self.append_observations(&entity, &current, vec![observation]).await?;
        added
            .pop()
            .ok_or_else(|| MemoryError::Database(DatabaseError::NoResult))
    }

    /// Append observations to the live entity `name` in `realm`, skipping
    /// any already present by `(kind, value)`.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::EntityNotFound` if no live entity has this name.
    pub async fn add_observations(
        &self,
        realm: &RealmRef,
        name: &str,
        observations: Vec<NewObservation>,
    ) -> Result<AddObservationsResult, MemoryError> {
        let entity = self
            .get_entity_by_name(realm, name)
            .await?
            .ok_or_else(|| MemoryError::EntityNotFound(format!("{realm}/{name}")))?;
        let current = self.observations_for(&entity.id, false).await?;
        let (fresh, skipped_duplicates) = dedup_observations(&current, observations);

        let added = if fresh.is_empty() {
            Vec::new()
        } else {
            self.append_observations(&entity, &current, fresh).await?
        };

        let total_active = u32::try_from(current.len() + added.len()).unwrap_or(u32::MAX);
        tracing::debug!(
            entity_id = %entity.id,
            added = added.len(),
            skipped_duplicates,
            total_active,
            "observations appended"
        );
        Ok(AddObservationsResult {
            entity_id: entity.id,
            added,
            skipped_duplicates,
            total_active,
        })
    }

    /// An entity's observations, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::Database` on storage failure.
    pub async fn observations_for(
        &self,
        entity_id: &str,
        include_archived: bool,
    ) -> Result<Vec<Observation>, MemoryError> {
        Ok(load_observations(&*self.db().read().await, entity_id, include_archived).await?)
    }

    /// Embed outside the gate, then insert and refresh the embedding in one
    /// transaction.
    async fn append_observations(
        &self,
        entity: &Entity,
        current: &[Observation],
        fresh: Vec<NewObservation>,
    ) -> Result<Vec<Observation>, MemoryError> {
        let mut text_source: Vec<NewObservation> =
            current.iter().map(to_new_observation).collect();
        text_source.extend(fresh.iter().cloned());
        let embedding = self
            .embedder()
            .embed(&entity_text(&entity.entity_name, &entity.entity_kind, &text_source))
            .await
            .map(|e| embedding_to_blob(&e));

        let _gate = self.write_gate().await;
        let tx = self.begin().await?;
        let result = async {
            let written_at = now();
            let changed = tx
                .execute(
                    "UPDATE entities SET embedding = COALESCE(?1, embedding),
                         version = version + 1, updated_at = ?2
                     WHERE id = ?3 AND deleted_at IS NULL",
                    libsql::params![embedding, timestamp(&written_at), entity.id.as_str()],
                )
                .await?;
            if changed == 0 {
                return Err(MemoryError::EntityNotFound(entity.id.clone()));
            }
            let mut added = Vec::with_capacity(fresh.len());
            for (offset, observation) in fresh.iter().enumerate() {
                added.push(insert_observation(&tx, &entity.id, observation, written_at, offset).await?);
            }
            Ok(added)
        }
        .await;
        finish(tx, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::test_support::helpers::{metadata, seeded_service, sop_realm};

    #[test]
    fn dedup_skips_existing_and_repeated() {
        let existing = vec![Observation {
            id: "obs-1".into(),
            entity_id: "ent-1".into(),
            observation_kind: "note".into(),
            value: json!("a"),
            source: "api".into(),
            tags: Vec::new(),
            context: serde_json::Map::new(),
            consolidation_key: None,
            state: ObservationState::Active,
            superseded_by: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }];
        let (fresh, skipped) = dedup_observations(
            &existing,
            vec![
                NewObservation::new("note", "a"),
                NewObservation::new("note", "b"),
                NewObservation::new("note", "b"),
                NewObservation::new("other", "a"),
            ],
        );
        assert_eq!(skipped, 2);
        assert_eq!(fresh.len(), 2);
    }

    #[tokio::test]
    async fn add_observations_reports_counts() {
        let (svc, _dir) = seeded_service().await;
        let realm = sop_realm();
        let entity = svc
            .upsert_entity(
                &realm,
                "post_metrics",
                "sop",
                metadata(json!({"owner": "growth"})),
                vec![NewObservation::new("note", "baseline")],
            )
            .await
            .unwrap();

        let result = svc
            .add_observations(
                &realm,
                "post_metrics",
                vec![
                    NewObservation::new("note", "baseline"),
                    NewObservation::new("metric", 0.5).consolidate_on("ctr"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(result.entity_id, entity.id);
        assert_eq!(result.added.len(), 1);
        assert_eq!(result.skipped_duplicates, 1);
        assert_eq!(result.total_active, 2);
        assert_eq!(result.added[0].consolidation_key.as_deref(), Some("ctr"));
    }

    #[tokio::test]
    async fn add_observation_rejects_deleted_entities() {
        let (svc, _dir) = seeded_service().await;
        let entity = svc
            .upsert_entity(&sop_realm(), "gone", "sop", metadata(json!({"owner": "x"})), vec![])
            .await
            .unwrap();
        svc.soft_delete_entity(&entity.id).await.unwrap();

        let err = svc
            .add_observation(&entity.id, NewObservation::new("note", "late"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::EntityNotFound(_)));
    }

    #[tokio::test]
    async fn stored_rows_read_back_identically() {
        let (svc, _dir) = seeded_service().await;
        let entity = svc
            .upsert_entity(&sop_realm(), "roundtrip", "sop", metadata(json!({"owner": "x"})), vec![])
            .await
            .unwrap();
        let written = svc
            .add_observation(
                &entity.id,
                NewObservation::new("note", json!({"k": [1, 2]}))
                    .with_source("crawler")
                    .with_tags(["seo", "q3"]),
            )
            .await
            .unwrap();

        let read = svc.observations_for(&entity.id, false).await.unwrap();
        assert_eq!(read, vec![written]);
    }
}
