//! # Batch Service
//!
//! Inbound API of the framework: starting batches, driving their jobs synchronously,
//! querying them and deleting them.
//!
//! ## Starting a Batch
//!
//! ```text
//! BatchRequest ─> validate target ─> resolve config (snapshot) ─> resolve seed target
//!              ─> reject empty target ─> commit(Batch + seed Job)
//! ```
//!
//! Nothing is persisted for a rejected request. Explicit ids are deduplicated and keyed once
//! here; a query is only checked for a first match and is paged by the seed job later.

use super::context::BatchContext;
use super::executor::{JobExecutor, JobOutcome, ProcessingLoop};
use super::historic_tracker::HistoricBatchTracker;
use crate::config::{BatchConfigResolver, BatchFrameworkConfig, ConfigManager};
use crate::constants::entities;
use crate::error::{BatchError, BatchResult};
use crate::models::{
    Batch, BatchTarget, EntityFailure, EntityId, HistoricBatch, HistoricBatchFilter, Job,
    JobKind, NewBatch, TargetQuery,
};
use crate::partition::SeedTarget;
use crate::registry::HandlerRegistry;
use crate::store::{BatchStore, ChangeSet, DueJobQuery};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Request to start a batch over an id list, a query, or both
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub operation_type: String,
    pub entity_ids: Option<Vec<EntityId>>,
    pub query: Option<TargetQuery>,
    pub reason: Option<String>,
    pub annotation: Option<String>,
}

/// Results of running the due worker jobs of one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerRunSummary {
    /// Entity failures reported by the jobs that ran
    pub failures: Vec<EntityFailure>,
    /// Outcome of every job whose result was recorded
    pub outcomes: Vec<(Uuid, JobOutcome)>,
    /// Jobs whose result could not be recorded; their claims expire and they run again
    pub errors: Vec<(Uuid, BatchError)>,
}

impl WorkerRunSummary {
    pub fn outcome_of(&self, job_uuid: Uuid) -> Option<&JobOutcome> {
        self.outcomes
            .iter()
            .find(|(uuid, _)| *uuid == job_uuid)
            .map(|(_, outcome)| outcome)
    }
}

impl BatchRequest {
    pub fn new(operation_type: impl Into<String>) -> Self {
        Self {
            operation_type: operation_type.into(),
            ..Default::default()
        }
    }

    pub fn with_entity_ids(mut self, entity_ids: Vec<EntityId>) -> Self {
        self.entity_ids = Some(entity_ids);
        self
    }

    pub fn with_query(mut self, query: TargetQuery) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct BatchService {
    context: BatchContext,
    executor: Arc<JobExecutor>,
    tracker: HistoricBatchTracker,
}

impl BatchService {
    /// Create a service over `store`, validating `config` first
    pub fn new(
        store: Arc<dyn BatchStore>,
        registry: HandlerRegistry,
        config: BatchFrameworkConfig,
    ) -> BatchResult<Self> {
        config.validate()?;
        let max_concurrent_jobs = config.executor.max_concurrent_jobs;
        let context = BatchContext::new(store, registry, config);
        Ok(Self {
            executor: Arc::new(JobExecutor::new(context.clone(), max_concurrent_jobs)),
            tracker: HistoricBatchTracker::new(context.clone()),
            context,
        })
    }

    pub fn from_config_manager(
        store: Arc<dyn BatchStore>,
        registry: HandlerRegistry,
        manager: &ConfigManager,
    ) -> BatchResult<Self> {
        Self::new(store, registry, manager.config().clone())
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.context.registry
    }

    pub fn executor(&self) -> Arc<JobExecutor> {
        Arc::clone(&self.executor)
    }

    /// Background loop executing due jobs of all batches
    pub fn processing_loop(&self) -> ProcessingLoop {
        ProcessingLoop::new(self.executor(), Arc::clone(&self.context.config))
    }

    pub async fn config(&self) -> BatchFrameworkConfig {
        self.context.config_snapshot().await
    }

    /// Change the live configuration; only batches started afterwards see the new sizing
    pub async fn update_batch_config<F>(&self, update: F) -> BatchResult<()>
    where
        F: FnOnce(&mut BatchFrameworkConfig),
    {
        let mut config = self.context.config.write().await;
        let mut updated = config.clone();
        update(&mut updated);
        updated.validate()?;
        *config = updated;
        debug!("Batch configuration updated");
        Ok(())
    }

    #[instrument(skip(self, request), fields(operation_type = %request.operation_type))]
    pub async fn start_batch(&self, request: BatchRequest) -> BatchResult<Batch> {
        if request.operation_type.trim().is_empty() {
            return Err(BatchError::validation("operation type must not be empty"));
        }
        let target = BatchTarget::from_parts(request.entity_ids, request.query)?;
        let handler = self
            .context
            .registry
            .resolve(&request.operation_type)
            .map_err(|_| {
                BatchError::validation(format!(
                    "no handler registered for operation type {}",
                    request.operation_type
                ))
            })?;

        let config = self.context.config_snapshot().await;
        let resolved_config = BatchConfigResolver::new(&config.batch).resolve(&request.operation_type);

        let seed_target = SeedTarget::resolve(&target, handler.as_ref()).await?;
        if !seed_target.has_candidates(handler.as_ref()).await? {
            return Err(BatchError::validation(
                "batch would be empty: no entity matches the given ids or query",
            ));
        }
        let explicit_candidates = seed_target.entities.len();

        let now = Utc::now();
        let batch_uuid = Uuid::now_v7();
        let seed = Job::new_seed(
            batch_uuid,
            seed_target,
            config.executor.default_job_retries,
            now,
        );
        let batch = Batch::new(
            batch_uuid,
            NewBatch {
                operation_type: request.operation_type,
                resolved_config,
                reason: request.reason,
                annotation: request.annotation,
            },
            seed.job_uuid,
            now,
        );

        self.context
            .store
            .commit(ChangeSet::new().insert_batch(batch.clone()).insert_job(seed))
            .await?;

        crate::log_batch!(
            info,
            "STARTED",
            batch_uuid: batch.batch_uuid,
            operation_type: batch.operation_type,
            explicit_candidates: explicit_candidates,
            batch_jobs_per_seed: batch.batch_jobs_per_seed,
            invocations_per_batch_job: batch.invocations_per_batch_job,
        );
        Ok(batch)
    }

    /// Start a batch over an explicit id list; `None` is a validation error
    pub async fn start_batch_with_ids(
        &self,
        operation_type: &str,
        entity_ids: Option<Vec<EntityId>>,
        reason: Option<String>,
    ) -> BatchResult<Batch> {
        let target = BatchTarget::from_ids(entity_ids)?;
        self.start_batch(BatchRequest {
            operation_type: operation_type.to_string(),
            entity_ids: target.entity_ids,
            query: None,
            reason,
            annotation: None,
        })
        .await
    }

    /// Start a batch over a query; `None` is a validation error
    pub async fn start_batch_with_query(
        &self,
        operation_type: &str,
        query: Option<TargetQuery>,
        reason: Option<String>,
    ) -> BatchResult<Batch> {
        let target = BatchTarget::from_query(query)?;
        self.start_batch(BatchRequest {
            operation_type: operation_type.to_string(),
            entity_ids: None,
            query: target.query,
            reason,
            annotation: None,
        })
        .await
    }

    /// Run one invocation of the batch's seed job, whether due or not
    pub async fn execute_seed_step(&self, batch_uuid: Uuid) -> BatchResult<JobOutcome> {
        let batch = self.find_batch(batch_uuid).await?;
        let seed_job_uuid = batch.seed_job_uuid.ok_or_else(|| {
            BatchError::state(format!("batch {batch_uuid} has no seed job left ({})", batch.state))
        })?;
        self.execute_job(seed_job_uuid).await
    }

    /// Invoke the seed job until seeding is complete or an invocation does not succeed
    ///
    /// Returns the number of invocations run.
    pub async fn execute_seed_jobs(&self, batch_uuid: Uuid) -> BatchResult<u32> {
        let mut invocations = 0;
        loop {
            let batch = self.find_batch(batch_uuid).await?;
            if batch.seed_job_uuid.is_none() || batch.seed_failure.is_some() {
                return Ok(invocations);
            }
            let outcome = self.execute_seed_step(batch_uuid).await?;
            invocations += 1;
            if !outcome.is_succeeded() {
                return Ok(invocations);
            }
        }
    }

    /// Run every due worker job of the batch and return the entity failures they reported
    ///
    /// Job-level results are logged; [`Self::run_due_worker_jobs`] returns them as well.
    pub async fn execute_due_worker_jobs(&self, batch_uuid: Uuid) -> BatchResult<Vec<EntityFailure>> {
        Ok(self.run_due_worker_jobs(batch_uuid).await?.failures)
    }

    /// Run every due worker job of the batch, reporting each job's result
    ///
    /// A job that errors never hides the results of its siblings.
    pub async fn run_due_worker_jobs(&self, batch_uuid: Uuid) -> BatchResult<WorkerRunSummary> {
        self.find_batch(batch_uuid).await?;
        let jobs = self
            .executor
            .poll_query(
                DueJobQuery::new(Utc::now(), usize::MAX)
                    .for_batch(batch_uuid)
                    .of_kind(JobKind::Worker),
            )
            .await?;

        let mut summary = WorkerRunSummary::default();
        for (job_uuid, result) in self.executor.execute_all(jobs).await {
            match result {
                Ok(outcome) => {
                    if !outcome.is_succeeded() {
                        crate::log_job!(warn, "NOT_SUCCEEDED", job_uuid: job_uuid, outcome: outcome);
                    }
                    summary.failures.extend(outcome.failures().iter().cloned());
                    summary.outcomes.push((job_uuid, outcome));
                }
                Err(error) => {
                    crate::log_job!(error, "EXECUTION_ERROR", job_uuid: job_uuid, error: error.to_string());
                    summary.errors.push((job_uuid, error));
                }
            }
        }
        Ok(summary)
    }

    /// Run one job by id, whether due or not
    pub async fn execute_job(&self, job_uuid: Uuid) -> BatchResult<JobOutcome> {
        let job = self
            .context
            .store
            .find_job(job_uuid)
            .await?
            .ok_or_else(|| BatchError::not_found(entities::JOB, job_uuid))?;
        self.executor.execute(job).await
    }

    pub async fn find_batch(&self, batch_uuid: Uuid) -> BatchResult<Batch> {
        self.context
            .store
            .find_batch(batch_uuid)
            .await?
            .ok_or_else(|| BatchError::not_found(entities::BATCH, batch_uuid))
    }

    pub async fn list_batches(&self) -> BatchResult<Vec<Batch>> {
        Ok(self.context.store.list_batches().await?)
    }

    pub async fn jobs_for_batch(&self, batch_uuid: Uuid) -> BatchResult<Vec<Job>> {
        Ok(self.context.store.jobs_for_batch(batch_uuid).await?)
    }

    /// Entity failures collected across all worker jobs of the batch
    pub async fn entity_failures(&self, batch_uuid: Uuid) -> BatchResult<Vec<EntityFailure>> {
        Ok(self.context.store.entity_failures(batch_uuid).await?)
    }

    pub async fn find_historic_batch(&self, batch_uuid: Uuid) -> BatchResult<HistoricBatch> {
        self.tracker.find_historic_batch(batch_uuid).await
    }

    pub async fn list_historic_batches(
        &self,
        filter: &HistoricBatchFilter,
    ) -> BatchResult<Vec<HistoricBatch>> {
        self.tracker.list_historic_batches(filter).await
    }

    pub async fn delete_batch(&self, batch_uuid: Uuid, cascade: bool) -> BatchResult<()> {
        self.tracker.delete_batch(batch_uuid, cascade).await
    }

    pub async fn delete_historic_batch(&self, batch_uuid: Uuid) -> BatchResult<()> {
        self.tracker.delete_historic_batch(batch_uuid).await
    }

    pub async fn cleanup_historic_batches(
        &self,
        completed_before: DateTime<Utc>,
    ) -> BatchResult<usize> {
        self.tracker.cleanup_historic_batches(completed_before).await
    }
}
