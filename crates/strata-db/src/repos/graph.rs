//! Whole-realm reads and store statistics.

use std::collections::BTreeMap;

use strata_core::RealmRef;
use strata_core::responses::{GraphSnapshot, StoreStats};

use crate::error::MemoryError;
use crate::helpers::get_count;
use crate::repos::entity::{ENTITY_COLUMNS, fetch_live_entity, row_to_entity};
use crate::repos::relationship::{RELATIONSHIP_COLUMNS, count_live_edges, row_to_relationship};
use crate::service::MemoryService;

/// Live entities without at least one live edge and two active observations.
const INCOMPLETE_SQL: &str = "SELECT COUNT(*) FROM entities e
     WHERE e.deleted_at IS NULL
       AND ((SELECT COUNT(*) FROM relationships r
             WHERE (r.from_entity_id = e.id OR r.to_entity_id = e.id)
               AND r.deleted_at IS NULL) < 1
         OR (SELECT COUNT(*) FROM observations o
             WHERE o.entity_id = e.id AND o.state = 'active') < 2)";

impl MemoryService {
    /// Every live entity of a realm and every live edge leaving it.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::Database` on storage failure.
    pub async fn read_graph(&self, realm: &RealmRef) -> Result<GraphSnapshot, MemoryError> {
        let conn = self.db().read().await;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ENTITY_COLUMNS} FROM entities
                     WHERE realm_kind = ?1 AND realm_id = ?2 AND deleted_at IS NULL
                     ORDER BY entity_name"
                ),
                libsql::params![realm.kind.as_str(), realm.id.as_str()],
            )
            .await?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next().await? {
            entities.push(row_to_entity(&row)?);
        }

        let columns: Vec<String> = RELATIONSHIP_COLUMNS
            .split(", ")
            .map(|c| format!("r.{c}"))
            .collect();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM relationships r
                     JOIN entities e ON e.id = r.from_entity_id
                     WHERE e.realm_kind = ?1 AND e.realm_id = ?2
                       AND e.deleted_at IS NULL AND r.deleted_at IS NULL
                     ORDER BY r.created_at, r.id",
                    columns.join(", ")
                ),
                libsql::params![realm.kind.as_str(), realm.id.as_str()],
            )
            .await?;
        let mut relationships = Vec::new();
        while let Some(row) = rows.next().await? {
            relationships.push(row_to_relationship(&row)?);
        }

        Ok(GraphSnapshot {
            realm: realm.clone(),
            entities,
            relationships,
        })
    }

    /// Whether a live entity has at least one relationship and two active
    /// observations.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::EntityNotFound` for a missing or deleted entity.
    pub async fn is_complete(&self, entity_id: &str) -> Result<bool, MemoryError> {
        let conn = self.db().read().await;
        if fetch_live_entity(&conn, entity_id).await?.is_none() {
            return Err(MemoryError::EntityNotFound(entity_id.to_string()));
        }
        let edges = count_live_edges(&conn, entity_id).await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM observations WHERE entity_id = ?1 AND state = 'active'",
                [entity_id],
            )
            .await?;
        let observations = match rows.next().await? {
            Some(row) => get_count(&row, 0)?,
            None => 0,
        };
        Ok(edges >= 1 && observations >= 2)
    }

    /// Store-wide counts.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::Database` on storage failure.
    pub async fn stats(&self) -> Result<StoreStats, MemoryError> {
        let reader = self.db().read().await;
        let conn: &libsql::Connection = &reader;
        let count = |sql: &'static str| async move {
            let mut rows = conn.query(sql, ()).await?;
            match rows.next().await? {
                Some(row) => Ok::<u64, MemoryError>(get_count(&row, 0)?),
                None => Ok(0),
            }
        };

        let mut stats = StoreStats {
            entities: count("SELECT COUNT(*) FROM entities WHERE deleted_at IS NULL").await?,
            deleted_entities: count("SELECT COUNT(*) FROM entities WHERE deleted_at IS NOT NULL")
                .await?,
            relationships: count("SELECT COUNT(*) FROM relationships WHERE deleted_at IS NULL")
                .await?,
            active_observations: count(
                "SELECT COUNT(*) FROM observations WHERE state = 'active'",
            )
            .await?,
            archived_observations: count(
                "SELECT COUNT(*) FROM observations WHERE state = 'archived'",
            )
            .await?,
            incomplete_entities: count(INCOMPLETE_SQL).await?,
            entities_by_realm: BTreeMap::new(),
        };

        let mut rows = conn
            .query(
                "SELECT realm_kind, COUNT(*) FROM entities WHERE deleted_at IS NULL
                 GROUP BY realm_kind",
                (),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            stats
                .entities_by_realm
                .insert(row.get::<String>(0)?, get_count(&row, 1)?);
        }
        Ok(stats)
    }
}
