#![allow(dead_code)]

pub mod entity_catalog;
pub mod strategies;

pub use entity_catalog::*;

use std::sync::Arc;
use tasker_batch::config::BatchFrameworkConfig;
use tasker_batch::constants::batch_types;
use tasker_batch::orchestration::BatchService;
use tasker_batch::registry::HandlerRegistry;
use tasker_batch::store::InMemoryBatchStore;
use uuid::Uuid;

pub const OPERATION: &str = batch_types::HISTORIC_PROCESS_INSTANCE_DELETION;

/// Configuration for tests: immediate retries, no jitter, generous commit retries
pub fn test_config() -> BatchFrameworkConfig {
    let mut config = BatchFrameworkConfig::default();
    config.executor.default_job_retries = 3;
    config.executor.max_commit_attempts = 1_000;
    config.executor.polling_interval_ms = 10;
    config.backoff.base_delay_ms = 0;
    config.backoff.max_delay_ms = 0;
    config.backoff.jitter_enabled = false;
    config
}

pub struct TestHarness {
    pub service: BatchService,
    pub store: Arc<InMemoryBatchStore>,
    pub catalog: Arc<EntityCatalog>,
}

impl TestHarness {
    pub fn new(catalog: EntityCatalog) -> Self {
        Self::with_config(catalog, test_config())
    }

    pub fn with_config(catalog: EntityCatalog, config: BatchFrameworkConfig) -> Self {
        let store = Arc::new(InMemoryBatchStore::new());
        let catalog = Arc::new(catalog);
        let registry = HandlerRegistry::new();
        registry.register(catalog.clone());
        let service = BatchService::new(store.clone(), registry, config).unwrap();
        Self {
            service,
            store,
            catalog,
        }
    }

    /// Seed to exhaustion, then run worker jobs until none is due
    pub async fn run_to_completion(&self, batch_uuid: Uuid) -> Vec<tasker_batch::EntityFailure> {
        self.service.execute_seed_jobs(batch_uuid).await.unwrap();
        let mut failures = Vec::new();
        loop {
            let round = self
                .service
                .execute_due_worker_jobs(batch_uuid)
                .await
                .unwrap();
            let remaining = self.service.jobs_for_batch(batch_uuid).await.unwrap();
            failures.extend(round);
            if remaining
                .iter()
                .all(|job| job.state == tasker_batch::JobState::Failed)
            {
                return failures;
            }
        }
    }
}
