//! Realm precedence resolution and graph walks over resolved entities.
//!
//! A caller sees the union of its visible realms. Entities sharing a name
//! collapse to the one from the highest-precedence realm, and explicit
//! `overrides` edges can hand a lower realm's name to a higher realm's
//! entity. Reads only: nothing here writes.

pub mod reduce;
pub mod walk;

use strata_core::RealmRef;
use strata_core::entities::RelationType;
use strata_core::responses::ResolvedSet;

pub use reduce::{RealmScan, Resolution, reduce};
pub use walk::TraversalOptions;

use crate::error::MemoryError;
use crate::repos::EntityFilter;
use crate::repos::entity::query_entities;
use crate::repos::relationship::{Direction, load_edges};
use crate::service::MemoryService;

impl MemoryService {
    /// Every live entity of one realm.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::Database` on storage failure.
    pub async fn scan_realm(&self, realm: &RealmRef) -> Result<RealmScan, MemoryError> {
        let entities = self.list_entities(realm, &EntityFilter::default()).await?;
        Ok(RealmScan {
            realm: realm.clone(),
            entities,
        })
    }

    /// Scan every realm the caller can see and reduce by precedence.
    ///
    /// Returns the visible realms (ordered by tier) alongside the resolution.
    ///
    /// # Errors
    ///
    /// - `ActorNotFound` when the directory does not know the caller
    /// - `ServiceUnavailable` when the membership directory stays down
    pub async fn resolution_for(
        &self,
        caller: &RealmRef,
    ) -> Result<(Vec<RealmRef>, Resolution), MemoryError> {
        let membership = self.membership().membership(caller).await?;
        let visible = membership.visible_realms();

        // One reader for every scan so the realms are read as a unit.
        let conn = self.db().read().await;
        let mut scans = Vec::with_capacity(visible.len());
        for realm in &visible {
            scans.push(RealmScan {
                realm: realm.clone(),
                entities: query_entities(&conn, realm, &EntityFilter::default()).await?,
            });
        }
        let ids: Vec<String> = scans
            .iter()
            .flat_map(|s| s.entities.iter().map(|e| e.id.clone()))
            .collect();
        let overrides =
            load_edges(&conn, &ids, Direction::Outgoing, &[RelationType::OVERRIDES]).await?;
        drop(conn);

        tracing::debug!(
            caller = %caller,
            realms = visible.len(),
            entities = ids.len(),
            overrides = overrides.len(),
            "realms scanned"
        );
        Ok((visible, reduce(scans, &overrides)))
    }

    /// The entities a caller sees, one per logical name.
    ///
    /// # Errors
    ///
    /// See [`MemoryService::resolution_for`].
    pub async fn resolve_realm_memories(
        &self,
        caller: &RealmRef,
        filter: &EntityFilter,
    ) -> Result<ResolvedSet, MemoryError> {
        let (visible_realms, resolution) = self.resolution_for(caller).await?;
        Ok(ResolvedSet {
            caller: caller.clone(),
            visible_realms,
            entities: resolution.select(filter),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use strata_core::RealmRef;
    use strata_core::entities::{Metadata, RelationType};

    use crate::MemoryError;
    use crate::repos::EntityFilter;
    use crate::test_support::helpers::{metadata, seeded_service, sop_realm};

    #[tokio::test]
    async fn client_copy_shadows_the_class_copy() {
        let (svc, _dir) = seeded_service().await;
        for realm in [sop_realm(), RealmRef::client("vervelyn")] {
            svc.upsert_entity(&realm, "x", "sop", metadata(json!({"owner": realm.id.clone()})), vec![])
                .await
                .unwrap();
        }

        let set = svc
            .resolve_realm_memories(&RealmRef::synth("s-1"), &EntityFilter::named("x"))
            .await
            .unwrap();
        assert_eq!(set.entities.len(), 1);
        assert_eq!(set.entities[0].access_path.realm, RealmRef::client("vervelyn"));
        assert_eq!(set.entities[0].access_path.overrode, vec![sop_realm()]);
        assert_eq!(set.visible_realms.len(), 4);
    }

    #[tokio::test]
    async fn invisible_realms_stay_invisible() {
        let (svc, dir) = seeded_service().await;
        let other = RealmRef::synth_class("77");
        dir.add_actor(other.clone());
        svc.upsert_entity(&other, "secret", "checklist", Metadata::new(), vec![])
            .await
            .unwrap();

        let set = svc
            .resolve_realm_memories(&RealmRef::synth("s-1"), &EntityFilter::default())
            .await
            .unwrap();
        assert!(set.entities.is_empty());
    }

    #[tokio::test]
    async fn override_edge_answers_for_the_overridden_name() {
        let (svc, _dir) = seeded_service().await;
        let sop = svc
            .upsert_entity(
                &sop_realm(),
                "blog_writing_sop_v4",
                "sop",
                metadata(json!({"owner": "content"})),
                vec![],
            )
            .await
            .unwrap();
        let policy = svc
            .upsert_entity(
                &RealmRef::client("vervelyn"),
                "vervelyn_content_policy",
                "policy",
                Metadata::new(),
                vec![],
            )
            .await
            .unwrap();
        svc.create_relationship(&policy.id, &sop.id, RelationType::OVERRIDES, Metadata::new())
            .await
            .unwrap();

        let set = svc
            .resolve_realm_memories(
                &RealmRef::synth("s-1"),
                &EntityFilter::named("blog_writing_sop_v4"),
            )
            .await
            .unwrap();
        assert_eq!(set.entities.len(), 1);
        assert_eq!(set.entities[0].entity.id, policy.id);
        assert!(set.entities[0].access_path.via_override);
        assert_eq!(
            set.winner_for("blog_writing_sop_v4").map(|r| r.entity.id.as_str()),
            Some(policy.id.as_str())
        );
    }

    #[tokio::test]
    async fn unknown_caller_is_actor_not_found() {
        let (svc, _dir) = seeded_service().await;
        let err = svc
            .resolve_realm_memories(&RealmRef::synth("ghost"), &EntityFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::ActorNotFound { .. }));
    }
}
