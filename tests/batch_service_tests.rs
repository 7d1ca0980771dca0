//! End-to-end scenarios of the batch service over the in-memory store.

mod common;

use common::{test_config, EntityCatalog, TestHarness, OPERATION};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tasker_batch::error::{BatchError, OperationErrorKind};
use tasker_batch::models::{EntityId, HistoricBatchFilter, JobKind, TargetQuery};
use tasker_batch::orchestration::{BatchRequest, BatchService};
use tasker_batch::registry::HandlerRegistry;
use tasker_batch::state_machine::BatchState;
use tasker_batch::store::InMemoryBatchStore;

fn ids(ids: &[&str]) -> Option<Vec<EntityId>> {
    Some(EntityCatalog::ids(ids))
}

#[tokio::test]
async fn test_deletes_listed_entities_and_writes_history() {
    let harness = TestHarness::new(EntityCatalog::new().with_entities("deployment-1", &["pi-1", "pi-2", "pi-3"]));

    let batch = harness
        .service
        .start_batch_with_ids(OPERATION, ids(&["pi-1", "pi-2", "pi-3"]), Some("retention".into()))
        .await
        .unwrap();
    assert_eq!(batch.state, BatchState::Active);
    assert!(batch.seed_job_uuid.is_some());

    let failures = harness.run_to_completion(batch.batch_uuid).await;

    assert!(failures.is_empty());
    assert_eq!(harness.catalog.len(), 0);

    let batch = harness.service.find_batch(batch.batch_uuid).await.unwrap();
    assert_eq!(batch.state, BatchState::Completed);
    assert_eq!(batch.total_jobs, 3);
    assert_eq!(batch.jobs_created, 3);
    assert_eq!(batch.jobs_completed, 3);
    assert_eq!(batch.jobs_failed, 0);
    assert!(batch.seed_job_uuid.is_none());
    assert!(harness.service.jobs_for_batch(batch.batch_uuid).await.unwrap().is_empty());

    let historic = harness.service.find_historic_batch(batch.batch_uuid).await.unwrap();
    assert_eq!(historic.operation_type, OPERATION);
    assert_eq!(historic.reason.as_deref(), Some("retention"));
    assert_eq!(historic.jobs_completed, 3);
    assert_eq!(historic.entity_failure_count, 0);
}

#[tokio::test]
async fn test_entities_of_two_deployments_get_one_job_each() {
    let catalog = EntityCatalog::new()
        .with_entities("deployment-a", &["pi-1", "pi-2"])
        .with_entities("deployment-b", &["pi-3", "pi-4"]);
    let mut config = test_config();
    config.batch.default_invocations_per_batch_job = 10;
    let harness = TestHarness::with_config(catalog, config);

    let batch = harness
        .service
        .start_batch_with_ids(OPERATION, ids(&["pi-4", "pi-1", "pi-3", "pi-2"]), None)
        .await
        .unwrap();
    harness.service.execute_seed_jobs(batch.batch_uuid).await.unwrap();

    let jobs = harness.service.jobs_for_batch(batch.batch_uuid).await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|job| job.kind() == JobKind::Worker));
    let keys: BTreeSet<String> = jobs
        .iter()
        .map(|job| job.partition_key().unwrap().to_string())
        .collect();
    assert_eq!(keys.len(), 2);

    // Run deployment-a's job only
    let job_a = jobs
        .iter()
        .find(|job| job.partition_key().map(|k| k.as_str()) == Some("deployment-a"))
        .unwrap();
    let outcome = harness.service.execute_job(job_a.job_uuid).await.unwrap();
    assert!(outcome.is_succeeded());
    assert!(!harness.catalog.contains("pi-1"));
    assert!(!harness.catalog.contains("pi-2"));
    assert!(harness.catalog.contains("pi-3"));
    assert!(harness.catalog.contains("pi-4"));
    assert!(harness.service.find_historic_batch(batch.batch_uuid).await.is_err());

    harness.service.execute_due_worker_jobs(batch.batch_uuid).await.unwrap();

    let batch = harness.service.find_batch(batch.batch_uuid).await.unwrap();
    assert_eq!(batch.jobs_completed, 2);
    assert_eq!(batch.jobs_failed, 0);
    assert_eq!(batch.state, BatchState::Completed);
    assert!(harness.service.find_historic_batch(batch.batch_uuid).await.is_ok());
}

#[tokio::test]
async fn test_invalid_targets_are_rejected_without_side_effects() {
    let harness = TestHarness::new(EntityCatalog::new().with_entities("deployment-1", &["pi-1"]));
    let service = &harness.service;

    let empty_list = service.start_batch_with_ids(OPERATION, Some(vec![]), None).await;
    assert!(matches!(empty_list, Err(BatchError::Validation(_))));

    let null_list = service.start_batch_with_ids(OPERATION, None, None).await;
    assert!(matches!(null_list, Err(BatchError::Validation(_))));

    let null_query = service.start_batch_with_query(OPERATION, None, None).await;
    assert!(matches!(null_query, Err(BatchError::Validation(_))));

    let empty_query = service
        .start_batch_with_query(
            OPERATION,
            Some(TargetQuery::new(json!({ "deployment": "unknown" }))),
            None,
        )
        .await;
    assert!(matches!(empty_query, Err(BatchError::Validation(_))));

    let neither = service.start_batch(BatchRequest::new(OPERATION)).await;
    assert!(matches!(neither, Err(BatchError::Validation(_))));

    let unknown_type = service
        .start_batch(BatchRequest::new("no-such-operation").with_entity_ids(EntityCatalog::ids(&["pi-1"])))
        .await;
    assert!(matches!(unknown_type, Err(BatchError::Validation(_))));

    assert!(service.list_batches().await.unwrap().is_empty());
    assert_eq!(harness.store.job_count(), 0);
}

#[tokio::test]
async fn test_unknown_id_does_not_block_others() {
    let harness = TestHarness::new(EntityCatalog::new().with_entities("deployment-1", &["pi-1", "pi-2"]));

    let batch = harness
        .service
        .start_batch_with_ids(OPERATION, ids(&["pi-1", "aFakeId", "pi-2"]), None)
        .await
        .unwrap();
    let failures = harness.run_to_completion(batch.batch_uuid).await;

    assert!(failures.is_empty());
    assert_eq!(harness.catalog.len(), 0);
    assert!(harness.catalog.applied().contains(&EntityId::from("aFakeId")));
    assert!(harness.service.entity_failures(batch.batch_uuid).await.unwrap().is_empty());

    let batch = harness.service.find_batch(batch.batch_uuid).await.unwrap();
    assert_eq!(batch.state, BatchState::Completed);
    assert_eq!(batch.jobs_failed, 0);
}

#[tokio::test]
async fn test_query_and_list_are_unioned_without_duplicates() {
    let catalog = EntityCatalog::new().with_entities("deployment-1", &["pi-1", "pi-2", "pi-3"]);
    catalog.insert("pi-4", "deployment-2", false);
    let mut config = test_config();
    config.batch.default_invocations_per_batch_job = 100;
    let harness = TestHarness::with_config(catalog, config);

    let batch = harness
        .service
        .start_batch(
            BatchRequest::new(OPERATION)
                .with_entity_ids(EntityCatalog::ids(&["pi-1", "pi-4"]))
                .with_query(TargetQuery::new(json!({ "finished": true })))
                .with_annotation("union"),
        )
        .await
        .unwrap();
    assert_eq!(batch.annotation.as_deref(), Some("union"));
    harness.run_to_completion(batch.batch_uuid).await;

    let applied = harness.catalog.applied();
    let distinct: BTreeSet<&EntityId> = applied.iter().collect();
    assert_eq!(applied.len(), 4);
    assert_eq!(distinct.len(), 4);
    assert_eq!(harness.catalog.len(), 0);
}

#[tokio::test]
async fn test_seed_job_creates_bounded_number_of_jobs_per_invocation() {
    let catalog = EntityCatalog::new().with_entities("deployment-1", &["pi-1", "pi-2", "pi-3", "pi-4", "pi-5"]);
    let mut config = test_config();
    config.batch.default_batch_jobs_per_seed = 2;
    config.batch.default_invocations_per_batch_job = 1;
    let harness = TestHarness::with_config(catalog, config);

    let batch = harness
        .service
        .start_batch_with_query(OPERATION, Some(TargetQuery::new(json!({}))), None)
        .await
        .unwrap();
    let seed_job_uuid = batch.seed_job_uuid.unwrap();

    harness.service.execute_seed_step(batch.batch_uuid).await.unwrap();
    let after_first = harness.service.find_batch(batch.batch_uuid).await.unwrap();
    assert_eq!(after_first.state, BatchState::Active);
    assert_eq!(after_first.jobs_created, 2);
    assert_eq!(after_first.total_jobs, 2);
    // Rescheduled in place
    assert_eq!(after_first.seed_job_uuid, Some(seed_job_uuid));

    let invocations = harness.service.execute_seed_jobs(batch.batch_uuid).await.unwrap();
    assert_eq!(invocations, 2);

    let seeded = harness.service.find_batch(batch.batch_uuid).await.unwrap();
    assert_eq!(seeded.state, BatchState::SeedingComplete);
    assert_eq!(seeded.total_jobs, 5);
    assert_eq!(seeded.jobs_created, 5);
    assert!(seeded.seed_job_uuid.is_none());
    assert!(harness.service.execute_seed_step(batch.batch_uuid).await.is_err());
}

#[tokio::test]
async fn test_seeding_keys_each_listed_entity_once() {
    let names: Vec<String> = (0..1_000).map(|i| format!("pi-{i:04}")).collect();
    let catalog = EntityCatalog::new();
    for name in &names {
        catalog.insert(name, "deployment-1", true);
    }
    let mut config = test_config();
    config.batch.default_batch_jobs_per_seed = 1;
    config.batch.default_invocations_per_batch_job = 1;
    let harness = TestHarness::with_config(catalog, config);

    let entity_ids: Vec<EntityId> = names.iter().map(|name| EntityId::new(name.clone())).collect();
    let batch = harness
        .service
        .start_batch_with_ids(OPERATION, Some(entity_ids), None)
        .await
        .unwrap();
    assert_eq!(harness.catalog.key_lookups(), names.len());

    let invocations = harness.service.execute_seed_jobs(batch.batch_uuid).await.unwrap();
    assert_eq!(invocations as usize, names.len());
    assert_eq!(harness.catalog.key_lookups(), names.len());

    let seeded = harness.service.find_batch(batch.batch_uuid).await.unwrap();
    assert_eq!(seeded.state, BatchState::SeedingComplete);
    assert_eq!(seeded.jobs_created, names.len() as u64);
}

#[tokio::test]
async fn test_query_pages_need_no_key_lookups() {
    let catalog = EntityCatalog::new()
        .with_entities("deployment-a", &["pi-1", "pi-2", "pi-3"])
        .with_entities("deployment-b", &["pi-4", "pi-5"]);
    let mut config = test_config();
    config.batch.default_batch_jobs_per_seed = 1;
    config.batch.default_invocations_per_batch_job = 2;
    let harness = TestHarness::with_config(catalog, config);

    let batch = harness
        .service
        .start_batch_with_query(OPERATION, Some(TargetQuery::new(json!({}))), None)
        .await
        .unwrap();
    let invocations = harness.service.execute_seed_jobs(batch.batch_uuid).await.unwrap();

    // [pi-1, pi-2] [pi-3] [pi-4, pi-5]
    assert_eq!(invocations, 3);
    assert_eq!(harness.catalog.key_lookups(), 0);
    let jobs = harness.service.jobs_for_batch(batch.batch_uuid).await.unwrap();
    let mut sizes: Vec<usize> = jobs.iter().map(|job| job.entity_ids().len()).collect();
    sizes.sort();
    assert_eq!(sizes, vec![1, 2, 2]);
}

#[tokio::test]
async fn test_query_is_reevaluated_on_each_seed_invocation() {
    let catalog = EntityCatalog::new().with_entities("deployment-1", &["pi-1", "pi-2"]);
    let mut config = test_config();
    config.batch.default_batch_jobs_per_seed = 1;
    let harness = TestHarness::with_config(catalog, config);

    let batch = harness
        .service
        .start_batch_with_query(OPERATION, Some(TargetQuery::new(json!({ "finished": true }))), None)
        .await
        .unwrap();
    harness.service.execute_seed_step(batch.batch_uuid).await.unwrap();

    // Appears after the batch started but before seeding finished
    harness.catalog.insert("pi-3", "deployment-1", true);
    harness.service.execute_seed_jobs(batch.batch_uuid).await.unwrap();

    let batch = harness.service.find_batch(batch.batch_uuid).await.unwrap();
    assert_eq!(batch.total_jobs, 3);
    assert_eq!(batch.state, BatchState::SeedingComplete);
}

#[tokio::test]
async fn test_per_type_override_is_snapshotted() {
    let catalog = EntityCatalog::new().with_entities("deployment-1", &["pi-1", "pi-2"]);
    let mut config = test_config();
    config
        .batch
        .invocations_per_batch_job_by_batch_type
        .insert(OPERATION.to_string(), 42);
    let harness = TestHarness::with_config(catalog, config);

    let first = harness
        .service
        .start_batch_with_ids(OPERATION, ids(&["pi-1"]), None)
        .await
        .unwrap();
    assert_eq!(first.invocations_per_batch_job, 42);

    harness
        .service
        .update_batch_config(|config| {
            config
                .batch
                .invocations_per_batch_job_by_batch_type
                .insert(OPERATION.to_string(), 7);
        })
        .await
        .unwrap();

    let second = harness
        .service
        .start_batch_with_ids(OPERATION, ids(&["pi-2"]), None)
        .await
        .unwrap();
    assert_eq!(second.invocations_per_batch_job, 7);

    let first = harness.service.find_batch(first.batch_uuid).await.unwrap();
    assert_eq!(first.invocations_per_batch_job, 42);

    // Invalid updates are rejected and leave the live configuration alone
    let rejected = harness
        .service
        .update_batch_config(|config| config.batch.default_invocations_per_batch_job = 0)
        .await;
    assert!(matches!(rejected, Err(BatchError::Configuration(_))));
    assert_eq!(
        harness.service.config().await.batch.default_invocations_per_batch_job,
        test_config().batch.default_invocations_per_batch_job
    );
}

#[tokio::test]
async fn test_entity_failures_are_collected_not_retried() {
    let catalog = EntityCatalog::new().with_entities("deployment-1", &["pi-1", "pi-2", "pi-3"]);
    catalog.protect("pi-2");
    let mut config = test_config();
    config.batch.default_invocations_per_batch_job = 3;
    let harness = TestHarness::with_config(catalog, config);

    let batch = harness
        .service
        .start_batch_with_ids(OPERATION, ids(&["pi-1", "pi-2", "pi-3"]), None)
        .await
        .unwrap();
    let failures = harness.run_to_completion(batch.batch_uuid).await;

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].entity_id, EntityId::from("pi-2"));
    assert_eq!(failures[0].error_kind, OperationErrorKind::PreconditionFailed);
    assert!(harness.catalog.contains("pi-2"));
    assert!(!harness.catalog.contains("pi-3"));
    assert_eq!(harness.catalog.applied().len(), 3);

    let stored = harness.service.entity_failures(batch.batch_uuid).await.unwrap();
    assert_eq!(stored, failures);

    let batch = harness.service.find_batch(batch.batch_uuid).await.unwrap();
    assert_eq!(batch.jobs_completed, 1);
    assert_eq!(batch.jobs_failed, 1);
    let historic = harness.service.find_historic_batch(batch.batch_uuid).await.unwrap();
    assert_eq!(historic.entity_failure_count, 1);
    assert_eq!(historic.jobs_failed, 1);
}

#[tokio::test]
async fn test_job_error_does_not_hide_sibling_failures() {
    let catalog = EntityCatalog::new()
        .with_entities("deployment-a", &["pi-1"])
        .with_entities("deployment-b", &["pi-2"]);
    catalog.protect("pi-2");
    catalog.slow_down("pi-1", Duration::from_millis(300));
    let harness = TestHarness::new(catalog);

    let batch = harness
        .service
        .start_batch_with_ids(OPERATION, ids(&["pi-1", "pi-2"]), None)
        .await
        .unwrap();
    harness.service.execute_seed_jobs(batch.batch_uuid).await.unwrap();
    let jobs = harness.service.jobs_for_batch(batch.batch_uuid).await.unwrap();
    let job_of = |id: &str| {
        jobs.iter()
            .find(|job| job.entity_ids().iter().any(|e| e.as_str() == id))
            .map(|job| job.job_uuid)
            .unwrap()
    };
    let (slow_job, protected_job) = (job_of("pi-1"), job_of("pi-2"));

    // The store goes away while pi-1 is still being applied
    let (summary, _) = tokio::join!(
        harness.service.run_due_worker_jobs(batch.batch_uuid),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            harness.store.set_unavailable(true);
        }
    );
    harness.store.set_unavailable(false);
    let summary = summary.unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].entity_id.as_str(), "pi-2");
    assert_eq!(summary.outcome_of(protected_job).unwrap().failures().len(), 1);

    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].0, slow_job);
    assert!(matches!(summary.errors[0].1, BatchError::Infrastructure(_)));
    assert!(summary.outcome_of(slow_job).is_none());

    let batch = harness.service.find_batch(batch.batch_uuid).await.unwrap();
    assert_eq!(batch.jobs_completed, 1);
    assert_eq!(batch.jobs_failed, 1);
}

#[tokio::test]
async fn test_delete_batch_requires_cascade_while_jobs_remain() {
    let harness = TestHarness::new(EntityCatalog::new().with_entities("deployment-1", &["pi-1", "pi-2"]));
    let batch = harness
        .service
        .start_batch_with_ids(OPERATION, ids(&["pi-1", "pi-2"]), None)
        .await
        .unwrap();
    harness.service.execute_seed_jobs(batch.batch_uuid).await.unwrap();

    let refused = harness.service.delete_batch(batch.batch_uuid, false).await;
    assert!(matches!(refused, Err(BatchError::State(_))));
    assert!(harness.service.find_batch(batch.batch_uuid).await.is_ok());
    assert_eq!(harness.service.jobs_for_batch(batch.batch_uuid).await.unwrap().len(), 2);

    harness.service.delete_batch(batch.batch_uuid, true).await.unwrap();
    assert!(matches!(
        harness.service.find_batch(batch.batch_uuid).await,
        Err(BatchError::NotFound { .. })
    ));
    assert!(harness.service.jobs_for_batch(batch.batch_uuid).await.unwrap().is_empty());
    assert!(harness.service.find_historic_batch(batch.batch_uuid).await.is_err());
    assert_eq!(harness.catalog.len(), 2);

    let missing = harness.service.delete_batch(batch.batch_uuid, true).await;
    assert!(matches!(missing, Err(BatchError::NotFound { .. })));
}

#[tokio::test]
async fn test_completed_batch_and_history_have_separate_lifecycles() {
    let harness = TestHarness::new(EntityCatalog::new().with_entities("deployment-1", &["pi-1"]));
    let batch = harness
        .service
        .start_batch_with_ids(OPERATION, ids(&["pi-1"]), None)
        .await
        .unwrap();
    harness.run_to_completion(batch.batch_uuid).await;

    // No jobs left, so no cascade needed
    harness.service.delete_batch(batch.batch_uuid, false).await.unwrap();
    let historic = harness.service.find_historic_batch(batch.batch_uuid).await.unwrap();
    assert_eq!(historic.batch_uuid, batch.batch_uuid);

    let listed = harness
        .service
        .list_historic_batches(&HistoricBatchFilter::default().operation_type(OPERATION))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    harness.service.delete_historic_batch(batch.batch_uuid).await.unwrap();
    let again = harness.service.delete_historic_batch(batch.batch_uuid).await;
    assert!(matches!(again, Err(BatchError::NotFound { .. })));
}

#[tokio::test]
async fn test_cleanup_removes_only_older_history() {
    let harness = TestHarness::new(EntityCatalog::new().with_entities("deployment-1", &["pi-1", "pi-2"]));

    let first = harness
        .service
        .start_batch_with_ids(OPERATION, ids(&["pi-1"]), None)
        .await
        .unwrap();
    harness.run_to_completion(first.batch_uuid).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let cutoff = chrono::Utc::now();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let second = harness
        .service
        .start_batch_with_ids(OPERATION, ids(&["pi-2"]), None)
        .await
        .unwrap();
    harness.run_to_completion(second.batch_uuid).await;

    let removed = harness.service.cleanup_historic_batches(cutoff).await.unwrap();
    assert_eq!(removed, 1);
    assert!(harness.service.find_historic_batch(first.batch_uuid).await.is_err());
    assert!(harness.service.find_historic_batch(second.batch_uuid).await.is_ok());
    assert_eq!(harness.service.cleanup_historic_batches(cutoff).await.unwrap(), 0);
}

#[tokio::test]
async fn test_store_outage_surfaces_as_infrastructure_error() {
    let store = Arc::new(InMemoryBatchStore::new());
    let registry = HandlerRegistry::new();
    let catalog = Arc::new(EntityCatalog::new().with_entities("deployment-1", &["pi-1"]));
    registry.register(catalog);
    let service = BatchService::new(store.clone(), registry, test_config()).unwrap();

    store.set_unavailable(true);
    let result = service.start_batch_with_ids(OPERATION, ids(&["pi-1"]), None).await;
    assert!(matches!(result, Err(BatchError::Infrastructure(_))));
    assert!(result.unwrap_err().is_retryable());

    store.set_unavailable(false);
    assert!(service.start_batch_with_ids(OPERATION, ids(&["pi-1"]), None).await.is_ok());
}
