//! On-disk database tests
//!
//! - Data and locally registered schemas survive a reopen
//! - Migrations are safe to re-run on an existing file

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use strata_config::StrataConfig;
use strata_core::RealmRef;
use strata_core::entities::{Metadata, NewObservation};
use strata_db::{Collaborators, MemoryError, MemoryService};
use strata_directory::StaticDirectory;

async fn open(path: &str) -> MemoryService {
    let directory = Arc::new(StaticDirectory::new().with_actor(RealmRef::client("vervelyn")));
    MemoryService::new_local(path, Collaborators::from_directory(directory), &StrataConfig::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn entities_and_schemas_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strata.db");
    let path = path.to_str().unwrap();

    let id = {
        let svc = open(path).await;
        svc.register_schema("policy", json!({"type": "object", "required": ["scope"]}))
            .await
            .unwrap();
        let mut metadata = Metadata::new();
        metadata.insert("scope".into(), json!("blog"));
        svc.upsert_entity(
            &RealmRef::client("vervelyn"),
            "content_policy",
            "policy",
            metadata,
            vec![NewObservation::new("rule", "cite sources")],
        )
        .await
        .unwrap()
        .id
    };

    let svc = open(path).await;
    let entity = svc.get_entity(&id).await.unwrap();
    assert_eq!(entity.entity_name, "content_policy");
    assert_eq!(svc.observations_for(&id, false).await.unwrap().len(), 1);

    // The schema registered before the reopen still gates writes.
    let err = svc
        .upsert_entity(
            &RealmRef::client("vervelyn"),
            "scopeless_policy",
            "policy",
            Metadata::new(),
            vec![],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::SchemaValidationFailed { .. }));
}
