//! Relationship repository.
//!
//! Edges are directed and may cross realms. A live `(from, to, type)` tuple
//! is unique; self-edges are refused before any lookup.

use strata_core::entities::{Metadata, RelationType, Relationship};
use strata_core::ids::PREFIX_RELATIONSHIP;

use crate::error::{DatabaseError, MemoryError};
use crate::helpers::{
    get_opt_string, now, parse_datetime, parse_object, parse_optional_datetime, timestamp, to_json,
};
use crate::repos::entity::fetch_live_entity;
use crate::service::MemoryService;

pub(crate) const RELATIONSHIP_COLUMNS: &str = "id, from_entity_id, to_entity_id, relation_type, \
     metadata, created_at, updated_at, deleted_at";

pub(crate) fn row_to_relationship(row: &libsql::Row) -> Result<Relationship, DatabaseError> {
    let relation_type = row.get::<String>(3)?;
    Ok(Relationship {
        id: row.get::<String>(0)?,
        from_entity_id: row.get::<String>(1)?,
        to_entity_id: row.get::<String>(2)?,
        relation_type: RelationType::new(relation_type.clone()).map_err(|e| {
            DatabaseError::Query(format!("stored relation type '{relation_type}': {e}"))
        })?,
        metadata: parse_object(&row.get::<String>(4)?)?,
        created_at: parse_datetime(&row.get::<String>(5)?)?,
        updated_at: parse_datetime(&row.get::<String>(6)?)?,
        deleted_at: parse_optional_datetime(get_opt_string(row, 7)?.as_deref())?,
    })
}

async fn collect(mut rows: libsql::Rows) -> Result<Vec<Relationship>, DatabaseError> {
    let mut relationships = Vec::new();
    while let Some(row) = rows.next().await? {
        relationships.push(row_to_relationship(&row)?);
    }
    Ok(relationships)
}

/// Live edges leaving `entity_id`, oldest first.
pub(crate) async fn load_outgoing(
    conn: &libsql::Connection,
    entity_id: &str,
) -> Result<Vec<Relationship>, DatabaseError> {
    let rows = conn
        .query(
            &format!(
                "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
                 WHERE from_entity_id = ?1 AND deleted_at IS NULL ORDER BY created_at, id"
            ),
            [entity_id],
        )
        .await?;
    collect(rows).await
}

/// Live edges arriving at `entity_id`, oldest first.
pub(crate) async fn load_incoming(
    conn: &libsql::Connection,
    entity_id: &str,
) -> Result<Vec<Relationship>, DatabaseError> {
    let rows = conn
        .query(
            &format!(
                "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
                 WHERE to_entity_id = ?1 AND deleted_at IS NULL ORDER BY created_at, id"
            ),
            [entity_id],
        )
        .await?;
    collect(rows).await
}

/// Which endpoint of an edge a batch lookup matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Outgoing,
    Incoming,
}

impl Direction {
    const fn column(self) -> &'static str {
        match self {
            Self::Outgoing => "from_entity_id",
            Self::Incoming => "to_entity_id",
        }
    }
}

/// Ids per `IN (...)` list, well under `SQLite`'s bound-parameter limit.
const ID_CHUNK: usize = 400;

/// Live edges leaving (or arriving at) any of `ids`, optionally limited to
/// some relation types. An empty `relation_types` means every type.
pub(crate) async fn load_edges(
    conn: &libsql::Connection,
    ids: &[String],
    direction: Direction,
    relation_types: &[RelationType],
) -> Result<Vec<Relationship>, DatabaseError> {
    let mut edges = Vec::new();
    for chunk in ids.chunks(ID_CHUNK) {
        let mut params: Vec<libsql::Value> = Vec::with_capacity(chunk.len() + relation_types.len());
        params.extend(chunk.iter().map(|id| libsql::Value::Text(id.clone())));
        let id_slots: Vec<String> = (1..=chunk.len()).map(|i| format!("?{i}")).collect();

        let mut sql = format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
             WHERE deleted_at IS NULL AND {} IN ({})",
            direction.column(),
            id_slots.join(", ")
        );
        if !relation_types.is_empty() {
            let type_slots: Vec<String> = (chunk.len() + 1..=chunk.len() + relation_types.len())
                .map(|i| format!("?{i}"))
                .collect();
            sql.push_str(&format!(" AND relation_type IN ({})", type_slots.join(", ")));
            params.extend(
                relation_types
                    .iter()
                    .map(|t| libsql::Value::Text(t.as_str().to_string())),
            );
        }
        sql.push_str(" ORDER BY created_at, id");

        let rows = conn.query(&sql, libsql::params_from_iter(params)).await?;
        edges.extend(collect(rows).await?);
    }
    Ok(edges)
}

/// Count live edges touching `entity_id` in either direction.
pub(crate) async fn count_live_edges(
    conn: &libsql::Connection,
    entity_id: &str,
) -> Result<u32, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM relationships
             WHERE (from_entity_id = ?1 OR to_entity_id = ?1) AND deleted_at IS NULL",
            [entity_id],
        )
        .await?;
    let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
    let n = row.get::<i64>(0)?;
    u32::try_from(n).map_err(|_| DatabaseError::InvalidState(format!("edge count {n}")))
}

/// Check endpoints and uniqueness, then insert.
///
/// Runs on the caller's connection or transaction so that complete-entity
/// creation can roll every edge back together.
pub(crate) async fn insert_relationship(
    conn: &libsql::Connection,
    from_entity_id: &str,
    to_entity_id: &str,
    relation_type: &RelationType,
    metadata: &Metadata,
) -> Result<Relationship, MemoryError> {
    if from_entity_id == to_entity_id {
        return Err(MemoryError::SelfRelationship {
            entity_id: from_entity_id.to_string(),
        });
    }
    for id in [from_entity_id, to_entity_id] {
        if fetch_live_entity(conn, id).await?.is_none() {
            return Err(MemoryError::EntityNotFound(id.to_string()));
        }
    }

    let duplicate = || MemoryError::DuplicateRelationship {
        from: from_entity_id.to_string(),
        to: to_entity_id.to_string(),
        relation_type: relation_type.clone(),
    };
    let mut rows = conn
        .query(
            "SELECT id FROM relationships
             WHERE from_entity_id = ?1 AND to_entity_id = ?2 AND relation_type = ?3
               AND deleted_at IS NULL",
            libsql::params![from_entity_id, to_entity_id, relation_type.as_str()],
        )
        .await?;
    if rows.next().await?.is_some() {
        return Err(duplicate());
    }

    let at = now();
    let id = crate::generate_id(conn, PREFIX_RELATIONSHIP).await?;
    conn.execute(
        "INSERT INTO relationships (id, from_entity_id, to_entity_id, relation_type, metadata,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        libsql::params![
            id.as_str(),
            from_entity_id,
            to_entity_id,
            relation_type.as_str(),
            to_json(metadata)?,
            timestamp(&at)
        ],
    )
    .await?;

    Ok(Relationship {
        id,
        from_entity_id: from_entity_id.to_string(),
        to_entity_id: to_entity_id.to_string(),
        relation_type: relation_type.clone(),
        metadata: metadata.clone(),
        created_at: at,
        updated_at: at,
        deleted_at: None,
    })
}

impl MemoryService {
    /// Create a directed relationship between two live entities.
    ///
    /// # Errors
    ///
    /// - `SelfRelationship` when `from == to`
    /// - `EntityNotFound` when either endpoint is missing or deleted
    /// - `DuplicateRelationship` when the same live edge exists
    pub async fn create_relationship(
        &self,
        from_entity_id: &str,
        to_entity_id: &str,
        relation_type: RelationType,
        metadata: Metadata,
    ) -> Result<Relationship, MemoryError> {
        let writer = self.write_gate().await;
        let relationship = insert_relationship(
            &writer,
            from_entity_id,
            to_entity_id,
            &relation_type,
            &metadata,
        )
        .await?;
        tracing::debug!(
            relationship_id = %relationship.id,
            from = from_entity_id,
            to = to_entity_id,
            relation_type = %relation_type,
            "relationship created"
        );
        Ok(relationship)
    }

    /// Get a relationship by id, including soft-deleted rows.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::RelationshipNotFound` when no row has this id.
    pub async fn get_relationship(&self, id: &str) -> Result<Relationship, MemoryError> {
        let conn = self.db().read().await;
        let mut rows = conn
            .query(
                &format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE id = ?1"),
                [id],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| MemoryError::RelationshipNotFound(id.to_string()))?;
        Ok(row_to_relationship(&row)?)
    }

    /// Soft-delete a relationship.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::RelationshipNotFound` if it is missing or
    /// already deleted.
    pub async fn delete_relationship(&self, id: &str) -> Result<(), MemoryError> {
        let at = timestamp(&now());
        let changed = self
            .write_gate()
            .await
            .execute(
                "UPDATE relationships SET deleted_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND deleted_at IS NULL",
                libsql::params![at.as_str(), id],
            )
            .await?;
        if changed == 0 {
            return Err(MemoryError::RelationshipNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Live edges leaving an entity.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::Database` on storage failure.
    pub async fn relationships_from(&self, entity_id: &str) -> Result<Vec<Relationship>, MemoryError> {
        Ok(load_outgoing(&*self.db().read().await, entity_id).await?)
    }

    /// Live edges arriving at an entity.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::Database` on storage failure.
    pub async fn relationships_to(&self, entity_id: &str) -> Result<Vec<Relationship>, MemoryError> {
        Ok(load_incoming(&*self.db().read().await, entity_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    use crate::test_support::helpers::{metadata, seeded_service, sop_realm};

    async fn two_entities(svc: &MemoryService) -> (String, String) {
        let a = svc
            .upsert_entity(&sop_realm(), "alpha", "sop", metadata(json!({"owner": "x"})), vec![])
            .await
            .unwrap();
        let b = svc
            .upsert_entity(&sop_realm(), "beta", "sop", metadata(json!({"owner": "x"})), vec![])
            .await
            .unwrap();
        (a.id, b.id)
    }

    #[rstest]
    #[case(RelationType::REQUIRES)]
    #[case(RelationType::VALIDATES)]
    #[case(RelationType::OVERRIDES)]
    #[tokio::test]
    async fn self_relationship_always_fails(#[case] relation_type: RelationType) {
        let (svc, _dir) = seeded_service().await;
        let (a, _) = two_entities(&svc).await;
        let err = svc
            .create_relationship(&a, &a, relation_type, Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::SelfRelationship { ref entity_id } if *entity_id == a));
    }

    #[tokio::test]
    async fn self_relationship_fails_even_for_unknown_ids() {
        let (svc, _dir) = seeded_service().await;
        let err = svc
            .create_relationship("ent-missing", "ent-missing", RelationType::REQUIRES, Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::SelfRelationship { .. }));
    }

    #[tokio::test]
    async fn duplicate_live_edge_is_rejected_until_deleted() {
        let (svc, _dir) = seeded_service().await;
        let (a, b) = two_entities(&svc).await;
        let first = svc
            .create_relationship(&a, &b, RelationType::REQUIRES, Metadata::new())
            .await
            .unwrap();

        let err = svc
            .create_relationship(&a, &b, RelationType::REQUIRES, Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::DuplicateRelationship { .. }));

        // Same endpoints, different type, and the reverse edge are distinct.
        svc.create_relationship(&a, &b, RelationType::VALIDATES, Metadata::new())
            .await
            .unwrap();
        svc.create_relationship(&b, &a, RelationType::REQUIRES, Metadata::new())
            .await
            .unwrap();

        svc.delete_relationship(&first.id).await.unwrap();
        assert!(svc.get_relationship(&first.id).await.unwrap().deleted_at.is_some());
        svc.create_relationship(&a, &b, RelationType::REQUIRES, Metadata::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_endpoint_is_entity_not_found() {
        let (svc, _dir) = seeded_service().await;
        let (a, b) = two_entities(&svc).await;
        svc.soft_delete_entity(&b).await.unwrap();

        let err = svc
            .create_relationship(&a, &b, RelationType::REQUIRES, Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::EntityNotFound(ref id) if *id == b));
    }

    #[tokio::test]
    async fn soft_deleting_an_entity_hides_its_edges() {
        let (svc, _dir) = seeded_service().await;
        let (a, b) = two_entities(&svc).await;
        svc.create_relationship(&a, &b, RelationType::REQUIRES, Metadata::new())
            .await
            .unwrap();
        assert_eq!(svc.relationships_to(&b).await.unwrap().len(), 1);

        svc.soft_delete_entity(&a).await.unwrap();
        assert!(svc.relationships_from(&a).await.unwrap().is_empty());
        assert!(svc.relationships_to(&b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hard_delete_cascades() {
        let (svc, _dir) = seeded_service().await;
        let (a, b) = two_entities(&svc).await;
        let edge = svc
            .create_relationship(&a, &b, RelationType::REQUIRES, Metadata::new())
            .await
            .unwrap();
        svc.add_observation(&a, strata_core::entities::NewObservation::new("note", "x"))
            .await
            .unwrap();

        svc.hard_delete_entity(&a).await.unwrap();
        assert!(matches!(
            svc.get_relationship(&edge.id).await,
            Err(MemoryError::RelationshipNotFound(_))
        ));
        assert!(svc.observations_for(&a, true).await.unwrap().is_empty());
        assert!(matches!(svc.get_entity(&a).await, Err(MemoryError::EntityNotFound(_))));
    }
}
