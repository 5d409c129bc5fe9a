//! End-to-end memory scenarios
//!
//! - Complete-entity creation in a synth class
//! - Client override of a synth-class SOP
//! - Metric consolidation with delta, and its idempotence
//! - Consolidation alongside concurrent appends and protected kinds
//! - Collaborator outages: retries, fallbacks, and nothing half-written

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

use strata_config::StrataConfig;
use strata_core::entities::{Metadata, NewObservation, ObservationState, RelationType};
use strata_core::responses::{ConsolidationOutcome, Ineligible};
use strata_core::{RealmMembership, RealmRef};
use strata_db::repos::{CompleteEntity, EntityFilter, NewRelation, RelationTarget};
use strata_db::{Collaborators, MemoryError, MemoryService};
use strata_directory::StaticDirectory;
use strata_embeddings::{EmbeddingError, EmbeddingProvider};
use strata_schema::StaticSchemaSource;

fn config() -> StrataConfig {
    let mut config = StrataConfig::default();
    config.retry.base_delay_ms = 0;
    config.retry.max_delay_ms = 0;
    config.consolidation.min_entity_age_secs = 0;
    config
}

fn class_24() -> RealmRef {
    RealmRef::synth_class("24")
}

fn vervelyn() -> RealmRef {
    RealmRef::client("vervelyn")
}

fn synth() -> RealmRef {
    RealmRef::synth("s-1")
}

fn directory() -> Arc<StaticDirectory> {
    Arc::new(StaticDirectory::new().with_membership(RealmMembership {
        own: synth(),
        synth_class: Some(class_24()),
        skill_modules: vec![RealmRef::skill_module("seo")],
        client: Some(vervelyn()),
    }))
}

fn schemas() -> Arc<StaticSchemaSource> {
    Arc::new(
        StaticSchemaSource::new()
            .with_kind(
                "sop",
                json!({"type": "object", "required": ["owner"], "properties": {"owner": {"type": "string"}}}),
            )
            .with_kind("checklist", json!({"type": "object"}))
            .with_kind("policy", json!({"type": "object"}))
            .with_kind("report", json!({"type": "object"}))
            .with_kind("learning", json!({"type": "object"})),
    )
}

async fn service_with(collaborators: Collaborators) -> MemoryService {
    MemoryService::new_local(":memory:", collaborators, &config())
        .await
        .unwrap()
}

async fn test_service() -> (MemoryService, Arc<StaticDirectory>) {
    let dir = directory();
    let svc = service_with(Collaborators::from_directory(Arc::clone(&dir)).with_schemas(schemas())).await;
    (svc, dir)
}

fn owner(name: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("owner".into(), json!(name));
    metadata
}

async fn blog_sop(svc: &MemoryService) -> strata_core::responses::CompleteEntityReceipt {
    svc.upsert_entity(&class_24(), "blog_qa_checklist", "checklist", Metadata::new(), vec![])
        .await
        .unwrap();
    svc.create_complete_entity(CompleteEntity {
        realm: class_24(),
        name: "blog_writing_sop_v4".into(),
        kind: "sop".into(),
        metadata: owner("content"),
        observations: vec![
            NewObservation::new("procedure", "draft, edit, publish"),
            NewObservation::new("note", "run the QA checklist before publishing"),
        ],
        relationships: vec![NewRelation::new(
            RelationTarget::named(class_24(), "blog_qa_checklist"),
            RelationType::REQUIRES,
        )],
    })
    .await
    .unwrap()
}

// ---------------------------------------------------------------------------
// Scenario 1: complete entity in a synth class
// ---------------------------------------------------------------------------

#[tokio::test]
async fn complete_entity_adds_one_entity_and_one_edge() {
    let (svc, _dir) = test_service().await;
    svc.upsert_entity(&class_24(), "blog_qa_checklist", "checklist", Metadata::new(), vec![])
        .await
        .unwrap();
    let before = svc.stats().await.unwrap();

    svc.create_complete_entity(CompleteEntity {
        realm: class_24(),
        name: "blog_writing_sop_v4".into(),
        kind: "sop".into(),
        metadata: owner("content"),
        observations: vec![
            NewObservation::new("procedure", "draft, edit, publish"),
            NewObservation::new("note", "run the QA checklist before publishing"),
        ],
        relationships: vec![NewRelation::new(
            RelationTarget::named(class_24(), "blog_qa_checklist"),
            RelationType::REQUIRES,
        )],
    })
    .await
    .unwrap();

    let after = svc.stats().await.unwrap();
    assert_eq!(after.entities, before.entities + 1);
    assert_eq!(after.relationships, before.relationships + 1);
    assert_eq!(after.active_observations, before.active_observations + 2);
}

#[tokio::test]
async fn upsert_then_get_returns_a_stamped_entity() {
    let (svc, _dir) = test_service().await;
    let written = svc
        .upsert_entity(&class_24(), "seo_brief", "sop", owner("seo"), vec![])
        .await
        .unwrap();

    let read = svc
        .get_entity_by_name(&class_24(), "seo_brief")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, written);
    let stamp = strata_core::entities::ValidationStamp::read(&read.metadata).unwrap();
    assert!(stamp.passed);
    assert_eq!(stamp.schema, "sop_metadata");
    assert_eq!(read.metadata["owner"], json!("seo"));
}

// ---------------------------------------------------------------------------
// Scenario 2: client override
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_policy_overrides_class_sop() {
    let (svc, _dir) = test_service().await;
    let sop = blog_sop(&svc).await;
    let policy = svc
        .upsert_entity(
            &vervelyn(),
            "vervelyn_content_policy",
            "policy",
            Metadata::new(),
            vec![NewObservation::new("rule", "no listicles")],
        )
        .await
        .unwrap();
    svc.create_relationship(&policy.id, &sop.entity.id, RelationType::OVERRIDES, Metadata::new())
        .await
        .unwrap();

    let set = svc
        .resolve_realm_memories(&synth(), &EntityFilter::named("blog_writing_sop_v4"))
        .await
        .unwrap();
    assert_eq!(set.entities.len(), 1);
    let winner = &set.entities[0];
    assert_eq!(winner.entity.id, policy.id);
    assert_eq!(winner.access_path.realm, vervelyn());
    assert_eq!(winner.access_path.tier, 1);
    assert!(winner.access_path.via_override);
    assert_eq!(winner.overrides, vec!["blog_writing_sop_v4".to_string()]);
}

#[tokio::test]
async fn resolver_never_returns_two_entities_for_one_name() {
    let (svc, _dir) = test_service().await;
    for realm in [class_24(), vervelyn(), synth(), RealmRef::skill_module("seo")] {
        svc.upsert_entity(&realm, "shared_name", "report", Metadata::new(), vec![])
            .await
            .unwrap();
        svc.upsert_entity(&realm, &format!("only_{}", realm.id), "report", Metadata::new(), vec![])
            .await
            .unwrap();
    }

    let set = svc
        .resolve_realm_memories(&synth(), &EntityFilter::default())
        .await
        .unwrap();
    let mut names: Vec<&str> = set.entities.iter().map(|r| r.entity.entity_name.as_str()).collect();
    let total = names.len();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), total);
    assert_eq!(total, 5);
    assert_eq!(set.winner_for("shared_name").unwrap().access_path.realm, vervelyn());
}

#[tokio::test]
async fn traversal_lands_on_the_winning_copy() {
    let (svc, _dir) = test_service().await;
    blog_sop(&svc).await;
    // The client keeps its own checklist under the same name.
    let client_checklist = svc
        .upsert_entity(&vervelyn(), "blog_qa_checklist", "checklist", Metadata::new(), vec![])
        .await
        .unwrap();

    let result = svc
        .traverse(
            &synth(),
            &["blog_writing_sop_v4".to_string()],
            &strata_db::resolver::TraversalOptions::new(2, 50),
        )
        .await
        .unwrap();
    assert_eq!(result.nodes.len(), 2);
    assert_eq!(result.nodes[1].resolved.entity.id, client_checklist.id);
}

// ---------------------------------------------------------------------------
// Scenario 3: consolidation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn engagement_rate_consolidates_with_delta_and_is_idempotent() {
    let (svc, _dir) = test_service().await;
    let entity = svc
        .upsert_entity(&class_24(), "blog_performance", "report", Metadata::new(), vec![])
        .await
        .unwrap();
    for rate in [0.032, 0.041] {
        svc.add_observation(
            &entity.id,
            NewObservation::new("engagement_metric", json!({"engagement_rate": rate}))
                .consolidate_on("engagement_rate"),
        )
        .await
        .unwrap();
    }
    svc.add_observation(&entity.id, NewObservation::new("learning", "questions in titles help"))
        .await
        .unwrap();

    let first = svc.consolidate_entity(&entity.id).await.unwrap();
    assert!(matches!(first, ConsolidationOutcome::Consolidated(_)));
    let snapshot = svc.observations_for(&entity.id, true).await.unwrap();

    let active: Vec<_> = snapshot
        .iter()
        .filter(|o| o.state == ObservationState::Active && o.observation_kind == "engagement_metric")
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].value["value"], json!(0.041));
    assert_eq!(active[0].value["previous"], json!(0.032));
    assert_eq!(active[0].value["delta"], json!(28.1));
    assert!(
        snapshot
            .iter()
            .any(|o| o.observation_kind == "learning" && o.state == ObservationState::Active)
    );

    assert_eq!(svc.consolidate_entity(&entity.id).await.unwrap(), ConsolidationOutcome::NoOp);
    assert_eq!(svc.observations_for(&entity.id, true).await.unwrap(), snapshot);
}

#[tokio::test]
async fn status_metric_is_replaced_without_history() {
    let (svc, _dir) = test_service().await;
    let entity = svc
        .upsert_entity(&class_24(), "deploy_status", "report", Metadata::new(), vec![])
        .await
        .unwrap();
    for status in ["green", "amber"] {
        svc.add_observation(&entity.id, NewObservation::new("metric", status).consolidate_on("status"))
            .await
            .unwrap();
    }

    svc.consolidate_entity(&entity.id).await.unwrap();
    let active = svc.observations_for(&entity.id, false).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].value["value"], json!("amber"));
    assert!(active[0].value.get("previous").is_none());
    assert!(active[0].value.get("delta").is_none());
}

#[tokio::test]
async fn learning_entities_keep_every_row_through_a_sweep() {
    let (svc, _dir) = test_service().await;
    let entity = svc
        .upsert_entity(&class_24(), "lesson_log", "learning", Metadata::new(), vec![])
        .await
        .unwrap();
    for rate in [0.2, 0.3] {
        svc.add_observation(
            &entity.id,
            NewObservation::new("engagement_metric", json!(rate)).consolidate_on("rate"),
        )
        .await
        .unwrap();
    }

    let sweep = svc.consolidate_batch().await.unwrap();
    assert_eq!(sweep.scanned, 0);
    assert!(matches!(
        svc.consolidate_entity(&entity.id).await.unwrap(),
        ConsolidationOutcome::Ineligible(Ineligible::ProtectedKind { .. })
    ));
    assert_eq!(svc.observations_for(&entity.id, false).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweeps_and_appends_interleave_without_losing_rows() {
    let (svc, _dir) = test_service().await;
    let svc = Arc::new(svc);
    let entity = svc
        .upsert_entity(&class_24(), "blog_performance", "report", Metadata::new(), vec![])
        .await
        .unwrap();

    let appender = {
        let svc = Arc::clone(&svc);
        let id = entity.id.clone();
        tokio::spawn(async move {
            for views in 0..40 {
                svc.add_observation(
                    &id,
                    NewObservation::new("metric", json!(views)).consolidate_on("views"),
                )
                .await
                .unwrap();
            }
        })
    };
    while !appender.is_finished() {
        svc.consolidate_batch().await.unwrap();
    }
    appender.await.unwrap();
    svc.consolidate_batch().await.unwrap();

    let active = svc.observations_for(&entity.id, false).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].value["merge_count"], json!(40));
    assert_eq!(active[0].value["value"], json!(39));
    assert_eq!(svc.observations_for(&entity.id, true).await.unwrap().len(), 40);
}

// ---------------------------------------------------------------------------
// Collaborator failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_directory_failures_are_retried() {
    let (svc, dir) = test_service().await;
    dir.fail_next(2);
    svc.upsert_entity(&class_24(), "retry_me", "checklist", Metadata::new(), vec![])
        .await
        .unwrap();
}

#[tokio::test]
async fn directory_outage_is_service_unavailable_and_writes_nothing() {
    let (svc, dir) = test_service().await;
    dir.fail_next(100);
    let err = svc
        .upsert_entity(&class_24(), "never_written", "checklist", Metadata::new(), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::ServiceUnavailable { .. }));
    assert!(err.is_retryable());

    dir.fail_next(0);
    assert_eq!(svc.stats().await.unwrap().entities, 0);
}

#[tokio::test]
async fn schema_failure_reports_fields_and_writes_nothing() {
    let (svc, _dir) = test_service().await;
    let err = svc
        .upsert_entity(&class_24(), "ownerless", "sop", Metadata::new(), vec![])
        .await
        .unwrap_err();
    let MemoryError::SchemaValidationFailed { errors, .. } = err else {
        panic!("expected a validation failure, got {err:?}");
    };
    assert!(!errors.is_empty());
    assert_eq!(svc.stats().await.unwrap().entities, 0);
}

struct BrokenEmbedder;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::EmbedFailed("model offline".into()))
    }

    fn dimension(&self) -> usize {
        384
    }
}

#[tokio::test]
async fn embedding_failure_never_blocks_a_write() {
    let svc = service_with(
        Collaborators::from_directory(directory())
            .with_schemas(schemas())
            .with_embeddings(Arc::new(BrokenEmbedder)),
    )
    .await;

    let entity = svc
        .upsert_entity(&class_24(), "embedded", "checklist", Metadata::new(), vec![])
        .await
        .unwrap();
    let embedding = entity.embedding.unwrap();
    assert_eq!(embedding.len(), config().embeddings.dimension);
    assert!(embedding.iter().all(|v| v.abs() < f32::EPSILON));
}
