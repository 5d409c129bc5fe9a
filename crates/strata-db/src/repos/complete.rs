//! Atomic creation of a complete entity.
//!
//! A complete entity carries at least two observations and one relationship.
//! The entity row, its observations, and its edges are written in a single
//! transaction; any failure leaves the store untouched.

use serde::{Deserialize, Serialize};
use strata_core::RealmRef;
use strata_core::entities::{Metadata, NewObservation, RelationType, Relationship};
use strata_core::responses::CompleteEntityReceipt;

use crate::error::MemoryError;
use crate::helpers::now;
use crate::repos::entity::{AppliedEntity, EntityPlan, apply_entity_plan, find_live_by_name};
use crate::repos::observation::dedup_observations;
use crate::repos::relationship::insert_relationship;
use crate::service::{MemoryService, finish};

const MIN_OBSERVATIONS: usize = 2;
const MIN_RELATIONSHIPS: usize = 1;

/// Where a new relationship points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationTarget {
    Id(String),
    /// A live entity looked up by name inside the transaction.
    Named { realm: RealmRef, name: String },
}

impl RelationTarget {
    #[must_use]
    pub fn named(realm: RealmRef, name: impl Into<String>) -> Self {
        Self::Named {
            realm,
            name: name.into(),
        }
    }
}

/// An outgoing edge of a complete entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRelation {
    pub target: RelationTarget,
    pub relation_type: RelationType,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewRelation {
    #[must_use]
    pub fn new(target: RelationTarget, relation_type: RelationType) -> Self {
        Self {
            target,
            relation_type,
            metadata: Metadata::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteEntity {
    pub realm: RealmRef,
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub observations: Vec<NewObservation>,
    pub relationships: Vec<NewRelation>,
}

impl CompleteEntity {
    /// Reject requests that could never produce a complete entity, before any
    /// collaborator is called.
    fn check_shape(&self) -> Result<(), MemoryError> {
        let (distinct, _) = dedup_observations(&[], self.observations.clone());
        if distinct.len() < MIN_OBSERVATIONS || self.relationships.len() < MIN_RELATIONSHIPS {
            return Err(MemoryError::IncompleteEntity {
                relationships: self.relationships.len(),
                observations: distinct.len(),
            });
        }
        Ok(())
    }
}

async fn resolve_target(
    conn: &libsql::Connection,
    target: &RelationTarget,
) -> Result<String, MemoryError> {
    match target {
        RelationTarget::Id(id) => Ok(id.clone()),
        RelationTarget::Named { realm, name } => find_live_by_name(conn, realm, name)
            .await?
            .map(|entity| entity.id)
            .ok_or_else(|| MemoryError::EntityNotFound(format!("{realm}/{name}"))),
    }
}

async fn apply_complete(
    conn: &libsql::Connection,
    plan: &EntityPlan,
    relations: &[NewRelation],
) -> Result<(AppliedEntity, Vec<Relationship>), MemoryError> {
    let applied = apply_entity_plan(conn, plan, now()).await?;
    let mut relationships = Vec::with_capacity(relations.len());
    for relation in relations {
        let to = resolve_target(conn, &relation.target).await?;
        relationships.push(
            insert_relationship(
                conn,
                &applied.entity.id,
                &to,
                &relation.relation_type,
                &relation.metadata,
            )
            .await?,
        );
    }
    Ok((applied, relationships))
}

impl MemoryService {
    /// Create (or merge into) an entity together with its observations and
    /// relationships, all or nothing.
    ///
    /// # Errors
    ///
    /// - `IncompleteEntity` with fewer than two distinct observations or no
    ///   relationship
    /// - everything [`MemoryService::upsert_entity`] returns
    /// - `EntityNotFound`, `SelfRelationship`, or `DuplicateRelationship` for
    ///   a bad edge, in which case nothing is written
    pub async fn create_complete_entity(
        &self,
        request: CompleteEntity,
    ) -> Result<CompleteEntityReceipt, MemoryError> {
        request.check_shape()?;

        let max_attempts = self.settings().retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let plan = self
                .plan_entity(
                    &request.realm,
                    &request.name,
                    &request.kind,
                    &request.metadata,
                    request.observations.clone(),
                )
                .await?;
            if plan.existing_active + plan.observations.len() < MIN_OBSERVATIONS {
                return Err(MemoryError::IncompleteEntity {
                    relationships: request.relationships.len(),
                    observations: plan.existing_active + plan.observations.len(),
                });
            }

            let result = {
                let _gate = self.write_gate().await;
                let tx = self.begin().await?;
                let applied = apply_complete(&tx, &plan, &request.relationships).await;
                finish(tx, applied).await
            };
            match result {
                Ok((applied, relationships)) => {
                    tracing::info!(
                        realm = %request.realm,
                        entity_id = %applied.entity.id,
                        created = applied.created,
                        observations = applied.added.len(),
                        relationships = relationships.len(),
                        "complete entity written"
                    );
                    return Ok(CompleteEntityReceipt {
                        entity: applied.entity,
                        observations: applied.added,
                        relationships,
                        created: applied.created,
                    });
                }
                Err(MemoryError::WriteConflict { .. }) if attempt < max_attempts => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
