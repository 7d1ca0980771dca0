//! # Job Executor
//!
//! Polls due jobs, claims them, runs them and records the outcome.
//!
//! ## Claiming
//!
//! A job is claimed by a version-checked update that sets `lock_owner` and `lock_expires_at`.
//! Losing that race means another executor has the job, and the local attempt is dropped.
//! Every later write for the attempt re-reads the job and checks it still holds the claim.
//!
//! ## Failure Handling
//!
//! | Failure | Handling |
//! |---|---|
//! | entity-level [`OperationError`](crate::error::OperationError) | recorded by the worker job, never retried |
//! | infrastructure error, attempts left | rescheduled with exponential backoff |
//! | infrastructure error with no attempts left, or any other job-level error | job kept as `Failed`; worker counts as completed+failed, seed sets `seed_failure` |
//! | batch or job deleted meanwhile | outcome discarded |

use super::super::backoff_calculator::BackoffCalculator;
use super::super::context::{BatchContext, CommitAttempts};
use super::super::historic_tracker::close_if_finished;
use super::super::seed_job::SeedJob;
use super::super::worker_job::WorkerJob;
use crate::config::BatchFrameworkConfig;
use crate::constants::entities;
use crate::error::{BatchError, BatchResult};
use crate::models::{EntityFailure, Job, JobKind};
use crate::state_machine::JobState;
use crate::store::{ChangeSet, DueJobQuery};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// What became of one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The job ran; worker jobs report their entity failures
    Succeeded { failures: Vec<EntityFailure> },
    /// Job-level failure, rescheduled at `due_at`
    Retrying {
        due_at: DateTime<Utc>,
        retries_left: u32,
        error: String,
    },
    /// Job-level failure with no attempts left
    PermanentlyFailed { error: String },
    /// Nothing recorded: the job was claimed elsewhere, or it or its batch was deleted
    Discarded { reason: String },
}

impl JobOutcome {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn failures(&self) -> &[EntityFailure] {
        match self {
            Self::Succeeded { failures } => failures,
            _ => &[],
        }
    }

    fn discarded(reason: impl Into<String>) -> Self {
        Self::Discarded {
            reason: reason.into(),
        }
    }
}

/// Tally of one polling round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub polled: usize,
    pub succeeded: usize,
    pub retrying: usize,
    pub failed: usize,
    pub discarded: usize,
    pub errors: usize,
}

impl ExecutionSummary {
    fn record(&mut self, result: &BatchResult<JobOutcome>) {
        match result {
            Ok(JobOutcome::Succeeded { .. }) => self.succeeded += 1,
            Ok(JobOutcome::Retrying { .. }) => self.retrying += 1,
            Ok(JobOutcome::PermanentlyFailed { .. }) => self.failed += 1,
            Ok(JobOutcome::Discarded { .. }) => self.discarded += 1,
            Err(_) => self.errors += 1,
        }
    }
}

enum JobRun {
    Seed(bool),
    Worker(Vec<EntityFailure>),
}

#[derive(Debug)]
pub struct JobExecutor {
    executor_id: Uuid,
    context: BatchContext,
    seed_job: SeedJob,
    worker_job: WorkerJob,
    semaphore: Arc<Semaphore>,
    max_concurrent_jobs: usize,
}

impl JobExecutor {
    pub fn new(context: BatchContext, max_concurrent_jobs: usize) -> Self {
        let max_concurrent_jobs = max_concurrent_jobs.max(1);
        Self {
            executor_id: Uuid::new_v4(),
            seed_job: SeedJob::new(context.clone()),
            worker_job: WorkerJob::new(context.clone()),
            context,
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            max_concurrent_jobs,
        }
    }

    /// Lock owner id written into claimed jobs
    pub fn executor_id(&self) -> Uuid {
        self.executor_id
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// Due jobs of any batch, in queue order
    pub async fn poll(&self, limit: usize) -> BatchResult<Vec<Job>> {
        self.poll_query(DueJobQuery::new(Utc::now(), limit)).await
    }

    pub async fn poll_query(&self, query: DueJobQuery) -> BatchResult<Vec<Job>> {
        Ok(self.context.store.due_jobs(query).await?)
    }

    /// Claim, run and record one job, waiting for a concurrency slot first
    #[instrument(skip(self, job), fields(executor_id = %self.executor_id, job_uuid = %job.job_uuid, kind = %job.kind()))]
    pub async fn execute(&self, job: Job) -> BatchResult<JobOutcome> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| BatchError::infrastructure("job executor is shut down"))?;
        let config = self.context.config_snapshot().await;

        let Some(claimed) = self.claim(job, &config).await? else {
            return Ok(JobOutcome::discarded("job is claimed elsewhere or gone"));
        };

        let run = self.run_claimed(&claimed);
        let result = match config.executor.job_timeout() {
            Some(limit) => tokio::time::timeout(limit, run).await.unwrap_or_else(|_| {
                Err(BatchError::infrastructure(format!(
                    "job timed out after {}ms",
                    limit.as_millis()
                )))
            }),
            None => run.await,
        };

        match result {
            Ok(JobRun::Worker(failures)) => {
                if self.worker_job.complete(&claimed, &failures).await? {
                    Ok(JobOutcome::Succeeded { failures })
                } else {
                    Ok(JobOutcome::discarded("batch or job deleted during execution"))
                }
            }
            Ok(JobRun::Seed(true)) => Ok(JobOutcome::Succeeded { failures: vec![] }),
            Ok(JobRun::Seed(false)) => {
                Ok(JobOutcome::discarded("batch or job deleted during execution"))
            }
            Err(BatchError::NotFound { entity, .. }) if entity == entities::BATCH => {
                Ok(JobOutcome::discarded("batch deleted during execution"))
            }
            Err(error) => self.record_failure(&claimed, error, &config).await,
        }
    }

    /// Execute `jobs` concurrently, bounded by the executor's concurrency limit
    pub async fn execute_all(&self, jobs: Vec<Job>) -> Vec<(Uuid, BatchResult<JobOutcome>)> {
        join_all(jobs.into_iter().map(|job| async move {
            let job_uuid = job.job_uuid;
            (job_uuid, self.execute(job).await)
        }))
        .await
    }

    /// One polling round over all batches
    pub async fn run_once(&self) -> BatchResult<ExecutionSummary> {
        let limit = self.context.config.read().await.executor.poll_batch_size;
        let jobs = self.poll(limit).await?;
        let mut summary = ExecutionSummary {
            polled: jobs.len(),
            ..Default::default()
        };
        if jobs.is_empty() {
            return Ok(summary);
        }

        for (job_uuid, result) in self.execute_all(jobs).await {
            if let Err(error) = &result {
                crate::log_job!(error, "EXECUTION_ERROR", job_uuid: job_uuid, error: error.to_string());
            }
            summary.record(&result);
        }
        debug!(executor_id = %self.executor_id, ?summary, "Polling round finished");
        Ok(summary)
    }

    async fn claim(&self, job: Job, config: &BatchFrameworkConfig) -> BatchResult<Option<Job>> {
        let now = Utc::now();
        if job.state == JobState::Failed {
            return Err(BatchError::state(format!(
                "job {} failed permanently and is not executed again",
                job.job_uuid
            )));
        }
        if job.is_locked(now) {
            return Ok(None);
        }

        let lock_duration = chrono::Duration::from_std(config.executor.lock_duration())
            .map_err(|error| BatchError::Configuration(error.to_string()))?;
        let mut claimed = job;
        claimed.claim(self.executor_id, now, lock_duration);

        match self
            .context
            .store
            .commit(ChangeSet::new().update_job(claimed.clone()))
            .await
        {
            Ok(()) => {
                claimed.version += 1;
                Ok(Some(claimed))
            }
            Err(error) if error.is_version_conflict() || error.is_not_found() => {
                debug!(job_uuid = %claimed.job_uuid, error = %error, "Lost claim race");
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn run_claimed(&self, job: &Job) -> BatchResult<JobRun> {
        match job.kind() {
            JobKind::Seed => Ok(JobRun::Seed(self.seed_job.run(job).await?.is_some())),
            JobKind::Worker => Ok(JobRun::Worker(self.worker_job.run(job).await?)),
        }
    }

    async fn record_failure(
        &self,
        claimed: &Job,
        error: BatchError,
        config: &BatchFrameworkConfig,
    ) -> BatchResult<JobOutcome> {
        let message = error.to_string();
        let retryable = error.is_retryable();
        let backoff = BackoffCalculator::new(config.backoff.clone());
        let mut attempts = CommitAttempts::new(config.executor.max_commit_attempts);

        loop {
            let now = Utc::now();
            let Some(mut current) = self.context.store.find_job(claimed.job_uuid).await? else {
                return Ok(JobOutcome::discarded("job deleted during execution"));
            };
            if !current.holds_claim_of(claimed) {
                return Ok(JobOutcome::discarded("claim expired during execution"));
            }

            current.last_error = Some(message.clone());
            current.retries = if retryable {
                current.retries.saturating_sub(1)
            } else {
                0
            };

            if current.retries > 0 {
                let due_at = backoff.next_due_at(current.attempts, now);
                let retries_left = current.retries;
                current.reschedule(due_at);

                match self
                    .context
                    .store
                    .commit(ChangeSet::new().update_job(current))
                    .await
                {
                    Ok(()) => {
                        crate::log_job!(
                            warn,
                            "RETRY_SCHEDULED",
                            job_uuid: claimed.job_uuid,
                            retries_left: retries_left,
                            due_at: due_at.to_rfc3339(),
                            error: message,
                        );
                        return Ok(JobOutcome::Retrying {
                            due_at,
                            retries_left,
                            error: message,
                        });
                    }
                    Err(error) if attempts.retry_after(&error) => continue,
                    Err(error) => return Err(error.into()),
                }
            }

            let Some(mut batch) = self.context.store.find_batch(claimed.batch_uuid).await? else {
                return Ok(JobOutcome::discarded("batch deleted during execution"));
            };
            if !batch.state.accepts_job_outcomes() {
                return Ok(JobOutcome::discarded("batch no longer accepts job outcomes"));
            }

            let kind = current.kind();
            current.mark_failed(message.clone());
            let mut changes = ChangeSet::new();
            match kind {
                JobKind::Worker => {
                    batch.record_job_completed(true, now);
                    let failure_count = self
                        .context
                        .store
                        .count_entity_failures(batch.batch_uuid)
                        .await?;
                    if let Some(historic) = close_if_finished(&mut batch, failure_count, now)? {
                        changes = changes.insert_historic(historic);
                    }
                }
                JobKind::Seed => {
                    batch.seed_failure = Some(message.clone());
                    batch.updated_at = now;
                }
            }
            let changes = changes.update_job(current).update_batch(batch.clone());

            match self.context.store.commit(changes).await {
                Ok(()) => {
                    crate::log_job!(
                        error,
                        "PERMANENTLY_FAILED",
                        job_uuid: claimed.job_uuid,
                        batch_uuid: batch.batch_uuid,
                        kind: kind,
                        error: message,
                    );
                    if batch.completed_at.is_some() {
                        info!(batch_uuid = %batch.batch_uuid, "Batch completed");
                    }
                    return Ok(JobOutcome::PermanentlyFailed { error: message });
                }
                Err(error) if attempts.retry_after(&error) => continue,
                Err(error) => return Err(error.into()),
            }
        }
    }
}
