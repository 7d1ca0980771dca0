//! # Batch Model
//!
//! The durable aggregate of one bulk operation invocation.
//!
//! ## Counters
//!
//! `total_jobs`, `jobs_created`, `jobs_completed` and `jobs_failed` only ever grow. The seed
//! job pages through the candidates one invocation at a time, so `total_jobs` grows together
//! with `jobs_created` while seeding and is final once the batch reaches `SeedingComplete`.
//! `jobs_completed <= jobs_created <= total_jobs` holds at all times.
//!
//! ## Versioning
//!
//! Many worker jobs complete concurrently and all of them bump the same counters. Every update
//! goes through the store with the `version` that was read; the store rejects stale versions
//! and the caller re-reads and retries.

use crate::config::ResolvedBatchConfig;
use crate::error::BatchResult;
use crate::state_machine::{BatchEvent, BatchState, BatchStateMachine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_uuid: Uuid,
    pub operation_type: String,
    pub state: BatchState,
    pub total_jobs: u64,
    pub jobs_created: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    /// Snapshot taken at creation; later configuration changes never reach this batch
    pub batch_jobs_per_seed: u32,
    /// Snapshot taken at creation; chunk size of every worker job of this batch
    pub invocations_per_batch_job: u32,
    /// The one seed job of this batch, `None` once seeding completed
    pub seed_job_uuid: Option<Uuid>,
    pub reason: Option<String>,
    pub annotation: Option<String>,
    /// Set when the seed job ran out of retries
    pub seed_failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub seeding_completed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

/// New batch for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatch {
    pub operation_type: String,
    pub resolved_config: ResolvedBatchConfig,
    pub reason: Option<String>,
    pub annotation: Option<String>,
}

impl Batch {
    /// Batch `batch_uuid` whose seed job `seed_job_uuid` was already built
    pub fn new(
        batch_uuid: Uuid,
        new_batch: NewBatch,
        seed_job_uuid: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            batch_uuid,
            operation_type: new_batch.operation_type,
            state: BatchState::Active,
            total_jobs: 0,
            jobs_created: 0,
            jobs_completed: 0,
            jobs_failed: 0,
            batch_jobs_per_seed: new_batch.resolved_config.batch_jobs_per_seed,
            invocations_per_batch_job: new_batch.resolved_config.invocations_per_batch_job,
            seed_job_uuid: Some(seed_job_uuid),
            reason: new_batch.reason,
            annotation: new_batch.annotation,
            seed_failure: None,
            created_at: now,
            updated_at: now,
            seeding_completed_at: None,
            completed_at: None,
            version: 0,
        }
    }

    pub fn resolved_config(&self) -> ResolvedBatchConfig {
        ResolvedBatchConfig {
            batch_jobs_per_seed: self.batch_jobs_per_seed,
            invocations_per_batch_job: self.invocations_per_batch_job,
        }
    }

    /// Worker jobs created but not yet reported
    pub fn outstanding_jobs(&self) -> u64 {
        self.jobs_created - self.jobs_completed
    }

    /// Seeding is done and every created worker job reported back
    pub fn is_finished(&self) -> bool {
        self.state == BatchState::SeedingComplete && self.outstanding_jobs() == 0
    }

    pub fn record_jobs_created(&mut self, count: u64, now: DateTime<Utc>) {
        self.jobs_created += count;
        self.total_jobs = self.total_jobs.max(self.jobs_created);
        self.updated_at = now;
    }

    pub fn record_job_completed(&mut self, failed: bool, now: DateTime<Utc>) {
        self.jobs_completed += 1;
        if failed {
            self.jobs_failed += 1;
        }
        self.updated_at = now;
    }

    /// Apply a lifecycle event, stamping the matching timestamp
    pub fn transition(&mut self, event: BatchEvent, now: DateTime<Utc>) -> BatchResult<BatchState> {
        let target = BatchStateMachine::determine_target_state(self.state, &event)?;
        match target {
            BatchState::SeedingComplete => {
                self.seed_job_uuid = None;
                self.seeding_completed_at = Some(now);
            }
            BatchState::Completed => self.completed_at = Some(now),
            BatchState::Active | BatchState::Deleted => {}
        }
        self.state = target;
        self.updated_at = now;
        Ok(target)
    }
}
