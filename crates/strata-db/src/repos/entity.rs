//! Entity repository: upsert through the actor and schema gates, reads, and
//! soft and hard deletion.

use chrono::{DateTime, Utc};
use strata_core::RealmRef;
use strata_core::entities::{Entity, Metadata, NewObservation, Observation, ValidationStamp};
use strata_core::ids::PREFIX_ENTITY;
use strata_core::names::validate_entity_name;
use strata_embeddings::entity_text;
use strata_schema::ValidationReport;

use crate::error::{DatabaseError, MemoryError};
use crate::helpers::{
    embedding_to_blob, get_opt_embedding, get_opt_string, now, parse_datetime, parse_enum,
    parse_object, parse_optional_datetime, timestamp, to_json,
};
use crate::repos::observation::{dedup_observations, insert_observation, to_new_observation};
use crate::service::{MemoryService, finish};

pub(crate) const ENTITY_COLUMNS: &str = "id, realm_kind, realm_id, entity_name, entity_kind, \
     metadata, embedding, version, created_at, updated_at, deleted_at";

pub(crate) fn row_to_entity(row: &libsql::Row) -> Result<Entity, DatabaseError> {
    Ok(Entity {
        id: row.get::<String>(0)?,
        realm: RealmRef::new(parse_enum(&row.get::<String>(1)?)?, row.get::<String>(2)?),
        entity_name: row.get::<String>(3)?,
        entity_kind: row.get::<String>(4)?,
        metadata: parse_object(&row.get::<String>(5)?)?,
        embedding: get_opt_embedding(row, 6)?,
        version: row.get::<i64>(7)?,
        created_at: parse_datetime(&row.get::<String>(8)?)?,
        updated_at: parse_datetime(&row.get::<String>(9)?)?,
        deleted_at: parse_optional_datetime(get_opt_string(row, 10)?.as_deref())?,
    })
}

/// Narrows an entity listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFilter {
    /// Exact entity name.
    pub name: Option<String>,
    /// Exact entity kind.
    pub kind: Option<String>,
    pub include_deleted: bool,
    pub limit: Option<u32>,
}

impl EntityFilter {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn of_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an entity passes the name and kind conditions.
    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        self.name.as_deref().is_none_or(|n| n == entity.entity_name)
            && self.kind.as_deref().is_none_or(|k| k == entity.entity_kind)
            && (self.include_deleted || !entity.is_deleted())
    }
}

/// Fetch any entity row by id, deleted or not.
pub(crate) async fn fetch_entity(
    conn: &libsql::Connection,
    id: &str,
) -> Result<Option<Entity>, DatabaseError> {
    let mut rows = conn
        .query(
            &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"),
            [id],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row_to_entity(&row)?)),
        None => Ok(None),
    }
}

/// Fetch a live entity by id.
pub(crate) async fn fetch_live_entity(
    conn: &libsql::Connection,
    id: &str,
) -> Result<Option<Entity>, DatabaseError> {
    Ok(fetch_entity(conn, id).await?.filter(|e| !e.is_deleted()))
}

/// Fetch the live entity named `name` in `realm`.
pub(crate) async fn find_live_by_name(
    conn: &libsql::Connection,
    realm: &RealmRef,
    name: &str,
) -> Result<Option<Entity>, DatabaseError> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT {ENTITY_COLUMNS} FROM entities
                 WHERE realm_kind = ?1 AND realm_id = ?2 AND entity_name = ?3 AND deleted_at IS NULL"
            ),
            libsql::params![realm.kind.as_str(), realm.id.as_str(), name],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row_to_entity(&row)?)),
        None => Ok(None),
    }
}

/// A realm's entities matching `filter`, ordered by name.
pub(crate) async fn query_entities(
    conn: &libsql::Connection,
    realm: &RealmRef,
    filter: &EntityFilter,
) -> Result<Vec<Entity>, DatabaseError> {
    let mut conditions = vec!["realm_kind = ?1".to_string(), "realm_id = ?2".to_string()];
    let mut params: Vec<libsql::Value> =
        vec![realm.kind.as_str().into(), realm.id.as_str().into()];
    let mut idx = 3;

    if let Some(ref name) = filter.name {
        conditions.push(format!("entity_name = ?{idx}"));
        params.push(name.as_str().into());
        idx += 1;
    }
    if let Some(ref kind) = filter.kind {
        conditions.push(format!("entity_kind = ?{idx}"));
        params.push(kind.as_str().into());
        idx += 1;
    }
    if !filter.include_deleted {
        conditions.push("deleted_at IS NULL".to_string());
    }
    let limit = match filter.limit {
        Some(n) => {
            params.push(i64::from(n).into());
            format!(" LIMIT ?{idx}")
        }
        None => String::new(),
    };

    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM entities WHERE {} ORDER BY entity_name, created_at{limit}",
        conditions.join(" AND ")
    );
    let mut rows = conn.query(&sql, libsql::params_from_iter(params)).await?;

    let mut entities = Vec::new();
    while let Some(row) = rows.next().await? {
        entities.push(row_to_entity(&row)?);
    }
    Ok(entities)
}

/// Shallow merge: keys from `incoming` win. Any stamp is dropped from both.
fn merge_metadata(current: &Metadata, incoming: &Metadata) -> Metadata {
    let mut merged = ValidationStamp::strip(current);
    for (key, value) in ValidationStamp::strip(incoming) {
        merged.insert(key, value);
    }
    merged
}

/// Everything an entity write needs, gathered before the write gate is
/// taken: gate checks, schema stamp, dedup, and embedding.
pub(crate) struct EntityPlan {
    pub realm: RealmRef,
    pub name: String,
    pub kind: String,
    pub metadata: Metadata,
    pub embedding: Option<Vec<f32>>,
    /// Live row as read during planning. Its version guards the update.
    pub existing: Option<Entity>,
    pub observations: Vec<NewObservation>,
    pub skipped_duplicates: u32,
    pub existing_active: usize,
}

/// Written rows from an applied plan.
pub(crate) struct AppliedEntity {
    pub entity: Entity,
    pub added: Vec<Observation>,
    pub created: bool,
}

impl MemoryService {
    /// Run every external gate for an entity write.
    ///
    /// Calls the actor directory, the schema source, and the embedder. Must
    /// not be called with the write gate held.
    pub(crate) async fn plan_entity(
        &self,
        realm: &RealmRef,
        name: &str,
        kind: &str,
        metadata: &Metadata,
        observations: Vec<NewObservation>,
    ) -> Result<EntityPlan, MemoryError> {
        validate_entity_name(name)?;
        self.actors().validate(realm).await?;

        let existing = self.get_entity_by_name(realm, name).await?;
        let current_observations = match &existing {
            Some(entity) => self.observations_for(&entity.id, false).await?,
            None => Vec::new(),
        };
        let merged = existing.as_ref().map_or_else(
            || ValidationStamp::strip(metadata),
            |entity| merge_metadata(&entity.metadata, metadata),
        );

        let (stamped, report) = self.validator().validate_and_stamp(kind, &merged).await?;
        for warning in &report.warnings {
            tracing::debug!(realm = %realm, entity = name, %warning, "metadata warning");
        }

        let (fresh, skipped_duplicates) = dedup_observations(&current_observations, observations);

        let mut text_source: Vec<NewObservation> =
            current_observations.iter().map(to_new_observation).collect();
        text_source.extend(fresh.iter().cloned());
        let embedding = self.embedder().embed(&entity_text(name, kind, &text_source)).await;

        Ok(EntityPlan {
            realm: realm.clone(),
            name: name.to_string(),
            kind: kind.to_string(),
            metadata: stamped,
            embedding,
            existing,
            observations: fresh,
            skipped_duplicates,
            existing_active: current_observations.len(),
        })
    }

    /// Upsert an entity keyed on `(realm, name)`.
    ///
    /// A live entity with the same name gets its metadata shallow-merged (new
    /// keys win) and receives the observations not already present by
    /// `(kind, value)`. Otherwise a new entity is created. Either way the
    /// merged metadata passes the schema gate and is stamped, and the entity
    /// is re-embedded.
    ///
    /// # Errors
    ///
    /// - `Invalid` for a name that breaks the naming rules
    /// - `ActorNotFound` when the realm's actor does not exist
    /// - `SchemaNotFound` / `SchemaValidationFailed` from the schema gate
    /// - `ServiceUnavailable` when a collaborator stays down through retries
    pub async fn upsert_entity(
        &self,
        realm: &RealmRef,
        name: &str,
        kind: &str,
        metadata: Metadata,
        observations: Vec<NewObservation>,
    ) -> Result<Entity, MemoryError> {
        let max_attempts = self.settings().retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let plan = self
                .plan_entity(realm, name, kind, &metadata, observations.clone())
                .await?;
            let result = {
                let _gate = self.write_gate().await;
                let tx = self.begin().await?;
                let applied = apply_entity_plan(&tx, &plan, now()).await;
                finish(tx, applied).await
            };
            match result {
                Ok(applied) => {
                    tracing::debug!(
                        realm = %realm,
                        entity_id = %applied.entity.id,
                        created = applied.created,
                        added = applied.added.len(),
                        skipped = plan.skipped_duplicates,
                        "entity upserted"
                    );
                    if applied.created {
                        // A fresh row has no edges yet.
                        tracing::info!(
                            realm = %realm,
                            entity_id = %applied.entity.id,
                            "entity created incomplete; link it or use create_complete_entity"
                        );
                    }
                    return Ok(applied.entity);
                }
                Err(MemoryError::WriteConflict { .. }) if attempt < max_attempts => {
                    tracing::debug!(realm = %realm, entity = name, attempt, "entity changed during upsert, replanning");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Get an entity by id, including soft-deleted rows.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::EntityNotFound` when no row has this id.
    pub async fn get_entity(&self, id: &str) -> Result<Entity, MemoryError> {
        fetch_entity(&*self.db().read().await, id)
            .await?
            .ok_or_else(|| MemoryError::EntityNotFound(id.to_string()))
    }

    /// Get the live entity named `name` in `realm`.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::Database` on storage failure.
    pub async fn get_entity_by_name(
        &self,
        realm: &RealmRef,
        name: &str,
    ) -> Result<Option<Entity>, MemoryError> {
        Ok(find_live_by_name(&*self.db().read().await, realm, name).await?)
    }

    /// List a realm's entities, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::Database` on storage failure.
    pub async fn list_entities(
        &self,
        realm: &RealmRef,
        filter: &EntityFilter,
    ) -> Result<Vec<Entity>, MemoryError> {
        Ok(query_entities(&*self.db().read().await, realm, filter).await?)
    }

    /// Flag an entity as deleted, along with its live relationships.
    ///
    /// Observations and history rows stay in place.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::EntityNotFound` if the entity is missing or
    /// already deleted.
    pub async fn soft_delete_entity(&self, id: &str) -> Result<Entity, MemoryError> {
        let at = timestamp(&now());
        let _gate = self.write_gate().await;
        let tx = self.begin().await?;
        let result = async {
            let changed = tx
                .execute(
                    "UPDATE entities SET deleted_at = ?1, updated_at = ?1, version = version + 1
                     WHERE id = ?2 AND deleted_at IS NULL",
                    libsql::params![at.as_str(), id],
                )
                .await?;
            if changed == 0 {
                return Err(MemoryError::EntityNotFound(id.to_string()));
            }
            let relationships = tx
                .execute(
                    "UPDATE relationships SET deleted_at = ?1, updated_at = ?1
                     WHERE (from_entity_id = ?2 OR to_entity_id = ?2) AND deleted_at IS NULL",
                    libsql::params![at.as_str(), id],
                )
                .await?;
            tracing::info!(entity_id = id, relationships, "entity soft-deleted");
            fetch_entity(&tx, id)
                .await?
                .ok_or_else(|| MemoryError::EntityNotFound(id.to_string()))
        }
        .await;
        finish(tx, result).await
    }

    /// Physically remove an entity. Observations and relationships cascade.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::EntityNotFound` if no row has this id.
    pub async fn hard_delete_entity(&self, id: &str) -> Result<(), MemoryError> {
        let changed = self
            .write_gate()
            .await
            .execute("DELETE FROM entities WHERE id = ?1", [id])
            .await?;
        if changed == 0 {
            return Err(MemoryError::EntityNotFound(id.to_string()));
        }
        tracing::info!(entity_id = id, "entity hard-deleted");
        Ok(())
    }

    /// Run the schema gate without writing anything.
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound` or `ServiceUnavailable` when the schema
    /// cannot be loaded. A failing report is `Ok`.
    pub async fn validate_entity_metadata(
        &self,
        entity_kind: &str,
        metadata: &Metadata,
    ) -> Result<ValidationReport, MemoryError> {
        Ok(self.validator().validate(entity_kind, metadata).await?)
    }
}

/// Apply a plan inside the caller's transaction.
///
/// Fails with `WriteConflict` when the live row changed since planning, or
/// when a same-named entity appeared that planning did not see.
pub(crate) async fn apply_entity_plan(
    conn: &libsql::Connection,
    plan: &EntityPlan,
    now: DateTime<Utc>,
) -> Result<AppliedEntity, MemoryError> {
    let at = timestamp(&now);
    let metadata = to_json(&plan.metadata)?;
    let embedding = plan.embedding.as_deref().map(embedding_to_blob);
    let conflict = || MemoryError::WriteConflict {
        realm: plan.realm.clone(),
        name: plan.name.clone(),
    };

    let (entity, created) = if let Some(current) = &plan.existing {
        let changed = conn
            .execute(
                "UPDATE entities SET entity_kind = ?1, metadata = ?2, embedding = COALESCE(?3, embedding),
                     version = version + 1, updated_at = ?4
                 WHERE id = ?5 AND version = ?6 AND deleted_at IS NULL",
                libsql::params![
                    plan.kind.as_str(),
                    metadata,
                    embedding,
                    at.as_str(),
                    current.id.as_str(),
                    current.version
                ],
            )
            .await?;
        if changed == 0 {
            return Err(conflict());
        }
        let entity = fetch_entity(conn, &current.id).await?.ok_or_else(conflict)?;
        (entity, false)
    } else {
        if find_live_by_name(conn, &plan.realm, &plan.name).await?.is_some() {
            return Err(conflict());
        }
        let id = crate::generate_id(conn, PREFIX_ENTITY).await?;
        conn.execute(
            "INSERT INTO entities (id, realm_kind, realm_id, entity_name, entity_kind, metadata,
                 embedding, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)",
            libsql::params![
                id.as_str(),
                plan.realm.kind.as_str(),
                plan.realm.id.as_str(),
                plan.name.as_str(),
                plan.kind.as_str(),
                metadata,
                embedding,
                at.as_str()
            ],
        )
        .await?;
        let entity = Entity {
            id,
            realm: plan.realm.clone(),
            entity_name: plan.name.clone(),
            entity_kind: plan.kind.clone(),
            metadata: plan.metadata.clone(),
            embedding: plan.embedding.clone(),
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        (entity, true)
    };

    let mut added = Vec::with_capacity(plan.observations.len());
    for (offset, observation) in plan.observations.iter().enumerate() {
        added.push(insert_observation(conn, &entity.id, observation, now, offset).await?);
    }

    Ok(AppliedEntity {
        entity,
        added,
        created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::test_support::helpers::{metadata, seeded_service, sop_realm};

    #[tokio::test]
    async fn upsert_creates_then_merges() {
        let (svc, _dir) = seeded_service().await;
        let realm = sop_realm();

        let created = svc
            .upsert_entity(
                &realm,
                "blog_writing_sop_v4",
                "sop",
                metadata(json!({"owner": "content", "tier": 1})),
                vec![NewObservation::new("note", "use short intros")],
            )
            .await
            .unwrap();
        assert_eq!(created.version, 1);

        let merged = svc
            .upsert_entity(
                &realm,
                "blog_writing_sop_v4",
                "sop",
                metadata(json!({"tier": 2})),
                vec![
                    NewObservation::new("note", "use short intros"),
                    NewObservation::new("note", "link the checklist"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(merged.id, created.id);
        assert_eq!(merged.version, 2);
        assert_eq!(merged.metadata["owner"], json!("content"));
        assert_eq!(merged.metadata["tier"], json!(2));
        assert_eq!(svc.observations_for(&merged.id, false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn upsert_then_get_carries_a_passing_stamp() {
        let (svc, _dir) = seeded_service().await;
        let realm = sop_realm();
        let written = svc
            .upsert_entity(&realm, "qa_flow", "sop", metadata(json!({"owner": "qa"})), vec![])
            .await
            .unwrap();

        let read = svc.get_entity_by_name(&realm, "qa_flow").await.unwrap().unwrap();
        assert_eq!(read, written);
        let stamp = ValidationStamp::read(&read.metadata).unwrap();
        assert!(stamp.passed);
        assert_eq!(stamp.schema, "sop_metadata");
    }

    #[tokio::test]
    async fn bad_names_never_reach_the_directory() {
        let (svc, dir) = seeded_service().await;
        let before = dir.exists_calls();
        let err = svc
            .upsert_entity(&sop_realm(), "How We Write", "sop", Metadata::new(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Invalid(_)));
        assert_eq!(dir.exists_calls(), before);
    }

    #[tokio::test]
    async fn unknown_actor_aborts_creation() {
        let (svc, _dir) = seeded_service().await;
        let ghost = RealmRef::synth_class("999");
        let err = svc
            .upsert_entity(&ghost, "orphan", "sop", metadata(json!({"owner": "x"})), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::ActorNotFound { ref realm } if *realm == ghost));
        assert!(svc.get_entity_by_name(&ghost, "orphan").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn schema_failure_persists_nothing() {
        let (svc, _dir) = seeded_service().await;
        let err = svc
            .upsert_entity(&sop_realm(), "no_owner", "sop", metadata(json!({"tier": 1})), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::SchemaValidationFailed { .. }));
        assert!(svc.get_entity_by_name(&sop_realm(), "no_owner").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_schema_is_not_a_pass() {
        let (svc, _dir) = seeded_service().await;
        let err = svc
            .upsert_entity(&sop_realm(), "mystery", "unregistered", Metadata::new(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::SchemaNotFound(ref n) if n == "unregistered_metadata"));
    }

    #[tokio::test]
    async fn soft_delete_hides_by_name_and_frees_the_name() {
        let (svc, _dir) = seeded_service().await;
        let realm = sop_realm();
        let first = svc
            .upsert_entity(&realm, "draft", "sop", metadata(json!({"owner": "a"})), vec![])
            .await
            .unwrap();

        let deleted = svc.soft_delete_entity(&first.id).await.unwrap();
        assert!(deleted.is_deleted());
        assert!(svc.get_entity_by_name(&realm, "draft").await.unwrap().is_none());
        assert!(svc.get_entity(&first.id).await.unwrap().is_deleted());
        assert!(matches!(
            svc.soft_delete_entity(&first.id).await,
            Err(MemoryError::EntityNotFound(_))
        ));

        let second = svc
            .upsert_entity(&realm, "draft", "sop", metadata(json!({"owner": "b"})), vec![])
            .await
            .unwrap();
        assert_ne!(second.id, first.id);
    }

    #[tokio::test]
    async fn list_entities_filters_and_limits() {
        let (svc, _dir) = seeded_service().await;
        let realm = sop_realm();
        for name in ["c_item", "a_item", "b_item"] {
            svc.upsert_entity(&realm, name, "sop", metadata(json!({"owner": "x"})), vec![])
                .await
                .unwrap();
        }
        let all = svc.list_entities(&realm, &EntityFilter::default()).await.unwrap();
        let names: Vec<_> = all.iter().map(|e| e.entity_name.as_str()).collect();
        assert_eq!(names, vec!["a_item", "b_item", "c_item"]);

        let one = svc
            .list_entities(&realm, &EntityFilter::default().limit(1))
            .await
            .unwrap();
        assert_eq!(one.len(), 1);

        let named = svc
            .list_entities(&realm, &EntityFilter::named("b_item"))
            .await
            .unwrap();
        assert_eq!(named[0].entity_name, "b_item");

        let other_kind = svc
            .list_entities(&realm, &EntityFilter::default().of_kind("policy"))
            .await
            .unwrap();
        assert!(other_kind.is_empty());
    }
}
