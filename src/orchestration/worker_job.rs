//! # Worker Job
//!
//! Applies the operation handler to every entity of one chunk.
//!
//! Entity-level failures are collected, never retried, and never stop the chunk. Anything
//! that prevents the chunk from running at all (no handler, wrong payload, store trouble) is
//! a job-level failure and goes back to the executor's retry path.

use super::context::BatchContext;
use super::historic_tracker::close_if_finished;
use crate::constants::entities;
use crate::error::{BatchError, BatchResult};
use crate::models::{EntityFailure, Job, JobPayload};
use crate::store::ChangeSet;
use chrono::Utc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct WorkerJob {
    context: BatchContext,
}

impl WorkerJob {
    pub fn new(context: BatchContext) -> Self {
        Self { context }
    }

    /// Apply the operation to each entity of the claimed worker job `job`
    #[instrument(skip(self, job), fields(job_uuid = %job.job_uuid, batch_uuid = %job.batch_uuid))]
    pub async fn run(&self, job: &Job) -> BatchResult<Vec<EntityFailure>> {
        let JobPayload::Worker {
            partition_key,
            entity_ids,
        } = &job.payload
        else {
            return Err(BatchError::infrastructure(format!(
                "job {} is not a worker job",
                job.job_uuid
            )));
        };

        let batch = self
            .context
            .store
            .find_batch(job.batch_uuid)
            .await?
            .ok_or_else(|| BatchError::not_found(entities::BATCH, job.batch_uuid))?;
        let handler = self
            .context
            .registry
            .resolve(&batch.operation_type)
            .map_err(|error| BatchError::infrastructure(error.to_string()))?;

        let mut failures = Vec::new();
        for entity_id in entity_ids {
            if let Err(error) = handler.apply_to(entity_id).await {
                warn!(
                    entity_id = %entity_id,
                    error_kind = %error.kind,
                    error = %error.message,
                    "Entity operation failed"
                );
                failures.push(EntityFailure::from_operation_error(
                    job.batch_uuid,
                    job.job_uuid,
                    error,
                    Utc::now(),
                ));
            }
        }

        debug!(
            partition_key = ?partition_key,
            entity_count = entity_ids.len(),
            failures = failures.len(),
            "Worker job applied"
        );
        Ok(failures)
    }

    /// Record the successful run of `job`
    ///
    /// Deletes the job, bumps the batch counters, stores `failures` and closes the batch when
    /// this was its last outstanding job. Returns `false` when the batch or the claim vanished
    /// meanwhile and nothing was written.
    pub async fn complete(&self, job: &Job, failures: &[EntityFailure]) -> BatchResult<bool> {
        let mut attempts = self.context.commit_attempts().await;
        loop {
            let now = Utc::now();
            let Some(mut batch) = self.context.store.find_batch(job.batch_uuid).await? else {
                return Ok(false);
            };
            let Some(current) = self.context.store.find_job(job.job_uuid).await? else {
                return Ok(false);
            };
            if !current.holds_claim_of(job) || !batch.state.accepts_job_outcomes() {
                return Ok(false);
            }

            batch.record_job_completed(!failures.is_empty(), now);
            let mut changes = ChangeSet::new()
                .delete_job(&current)
                .append_failures(failures.to_vec());

            let failure_count = self
                .context
                .store
                .count_entity_failures(batch.batch_uuid)
                .await?
                + failures.len() as u64;
            if let Some(historic) = close_if_finished(&mut batch, failure_count, now)? {
                changes = changes.insert_historic(historic);
            }
            let changes = changes.update_batch(batch.clone());

            match self.context.store.commit(changes).await {
                Ok(()) => {
                    crate::log_job!(
                        debug,
                        "COMPLETED",
                        job_uuid: job.job_uuid,
                        batch_uuid: batch.batch_uuid,
                        failures: failures.len(),
                        jobs_completed: batch.jobs_completed,
                        batch_state: batch.state,
                    );
                    return Ok(true);
                }
                Err(error) if attempts.retry_after(&error) => continue,
                Err(error) => return Err(error.into()),
            }
        }
    }
}
