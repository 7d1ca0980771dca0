//! # Seed Job
//!
//! Expands the candidate set of a batch into worker jobs, a bounded number per invocation.
//!
//! ## Invocation
//!
//! 1. Fetch the page of candidates past the cursor, one more than the invocation can use
//! 2. Cut at most `batch_jobs_per_seed` chunks of `invocations_per_batch_job` ids
//! 3. Whatever is left over in the page means the target is not exhausted yet
//! 4. Commit the new worker jobs together with the batch counters and either
//!    - the rescheduled seed job with its advanced cursor, or
//!    - the deletion of the seed job and the flip to `SeedingComplete`
//!
//! The invocation itself performs no writes until step 4, so a failed invocation can simply
//! be retried by the executor.

use super::context::BatchContext;
use super::historic_tracker::close_if_finished;
use crate::error::{BatchError, BatchResult};
use crate::models::{Batch, CandidatePosition, Job, JobPayload, SeedCursor};
use crate::partition::WorkPartitioner;
use crate::state_machine::{BatchEvent, SeedJobEvent, SeedJobState, SeedJobStateMachine};
use crate::store::ChangeSet;
use chrono::Utc;
use tracing::{debug, instrument};

/// Result of one committed seed invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedProgress {
    pub jobs_created: u64,
    pub entities_seeded: u64,
    pub state: SeedJobState,
}

impl SeedProgress {
    pub fn is_exhausted(&self) -> bool {
        self.state == SeedJobState::Done
    }
}

/// Worker jobs planned by one invocation, not yet committed
#[derive(Debug)]
struct SeedPlan {
    workers: Vec<Job>,
    cursor: SeedCursor,
    exhausted: bool,
}

#[derive(Debug, Clone)]
pub struct SeedJob {
    context: BatchContext,
}

impl SeedJob {
    pub fn new(context: BatchContext) -> Self {
        Self { context }
    }

    /// Run one invocation of the claimed seed job `job`
    ///
    /// Returns `Ok(None)` when the batch or the claim disappeared meanwhile; nothing is written
    /// in that case.
    #[instrument(skip(self, job), fields(job_uuid = %job.job_uuid, batch_uuid = %job.batch_uuid))]
    pub async fn run(&self, job: &Job) -> BatchResult<Option<SeedProgress>> {
        let JobPayload::Seed { target, cursor } = &job.payload else {
            return Err(BatchError::infrastructure(format!(
                "job {} is not a seed job",
                job.job_uuid
            )));
        };

        let Some(batch) = self.context.store.find_batch(job.batch_uuid).await? else {
            return Ok(None);
        };
        if !batch.state.is_seeding() {
            return Err(BatchError::state(format!(
                "batch {} is {} and no longer seeding",
                batch.batch_uuid, batch.state
            )));
        }

        let handler = self
            .context
            .registry
            .resolve(&batch.operation_type)
            .map_err(|error| BatchError::infrastructure(error.to_string()))?;
        let page_size = invocation_capacity(&batch).saturating_add(1);
        let candidates = target
            .next_candidates(cursor, page_size, handler.as_ref())
            .await?;
        let job_retries = self.context.config.read().await.executor.default_job_retries;
        let plan = plan_invocation(&batch, cursor, candidates, job_retries)?;

        self.commit(job, plan).await
    }

    async fn commit(&self, job: &Job, plan: SeedPlan) -> BatchResult<Option<SeedProgress>> {
        let jobs_created = plan.workers.len() as u64;
        let entities_seeded = plan.cursor.seeded_entities;
        let event = if plan.exhausted {
            SeedJobEvent::Exhaust
        } else {
            SeedJobEvent::Reschedule
        };
        let state = SeedJobStateMachine::determine_target_state(SeedJobState::Running, &event)?;

        let mut attempts = self.context.commit_attempts().await;
        loop {
            let now = Utc::now();
            let Some(mut batch) = self.context.store.find_batch(job.batch_uuid).await? else {
                return Ok(None);
            };
            let Some(mut current) = self.context.store.find_job(job.job_uuid).await? else {
                return Ok(None);
            };
            if !current.holds_claim_of(job) {
                return Ok(None);
            }

            batch.record_jobs_created(jobs_created, now);
            let mut changes = ChangeSet::new().insert_jobs(plan.workers.iter().cloned());

            if plan.exhausted {
                batch.transition(BatchEvent::CompleteSeeding, now)?;
                let failure_count = self
                    .context
                    .store
                    .count_entity_failures(batch.batch_uuid)
                    .await?;
                if let Some(historic) = close_if_finished(&mut batch, failure_count, now)? {
                    changes = changes.insert_historic(historic);
                }
                changes = changes.delete_job(&current);
            } else {
                if let JobPayload::Seed { cursor, .. } = &mut current.payload {
                    *cursor = plan.cursor.clone();
                }
                current.reschedule(now);
                changes = changes.update_job(current);
            }
            let changes = changes.update_batch(batch.clone());

            match self.context.store.commit(changes).await {
                Ok(()) => {
                    crate::log_batch!(
                        debug,
                        "SEEDED",
                        batch_uuid: batch.batch_uuid,
                        jobs_created: jobs_created,
                        entities_seeded: entities_seeded,
                        seed_state: state,
                        batch_state: batch.state,
                    );
                    return Ok(Some(SeedProgress {
                        jobs_created,
                        entities_seeded,
                        state,
                    }));
                }
                Err(error) if attempts.retry_after(&error) => continue,
                Err(error) => return Err(error.into()),
            }
        }
    }
}

/// Most entity ids one invocation can hand out
fn invocation_capacity(batch: &Batch) -> usize {
    (batch.batch_jobs_per_seed as usize).saturating_mul(batch.invocations_per_batch_job as usize)
}

/// Cut the page of candidates past `cursor` into this invocation's worker jobs
fn plan_invocation(
    batch: &Batch,
    cursor: &SeedCursor,
    candidates: Vec<CandidatePosition>,
    job_retries: u32,
) -> BatchResult<SeedPlan> {
    let partitioner = WorkPartitioner::new(batch.invocations_per_batch_job as usize)?;
    let mut chunks = partitioner.partition(candidates).peekable();

    let now = Utc::now();
    let mut next_cursor = SeedCursor {
        last_position: cursor.last_position.clone(),
        seeded_entities: cursor.seeded_entities,
        invocations: cursor.invocations + 1,
    };
    let mut workers = Vec::new();
    for chunk in chunks.by_ref().take(batch.batch_jobs_per_seed as usize) {
        next_cursor.seeded_entities += chunk.len() as u64;
        next_cursor.last_position = Some(chunk.last_position);
        workers.push(Job::new_worker(
            batch.batch_uuid,
            chunk.partition_key,
            chunk.entity_ids,
            job_retries,
            now,
        ));
    }
    let exhausted = chunks.peek().is_none();

    debug!(
        batch_uuid = %batch.batch_uuid,
        planned_jobs = workers.len(),
        exhausted,
        "Planned seed invocation"
    );

    Ok(SeedPlan {
        workers,
        cursor: next_cursor,
        exhausted,
    })
}
