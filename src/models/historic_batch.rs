//! # Historic Batch Model
//!
//! Immutable record of a completed batch. It has its own lifecycle: it survives deletion of
//! the live batch and is removed only by explicit historic deletion or cleanup.

use super::batch::Batch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricBatch {
    /// Same id as the live batch it was taken from
    pub batch_uuid: Uuid,
    pub operation_type: String,
    pub reason: Option<String>,
    pub annotation: Option<String>,
    pub batch_jobs_per_seed: u32,
    pub invocations_per_batch_job: u32,
    pub total_jobs: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub entity_failure_count: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl HistoricBatch {
    pub fn from_batch(batch: &Batch, entity_failure_count: u64, completed_at: DateTime<Utc>) -> Self {
        Self {
            batch_uuid: batch.batch_uuid,
            operation_type: batch.operation_type.clone(),
            reason: batch.reason.clone(),
            annotation: batch.annotation.clone(),
            batch_jobs_per_seed: batch.batch_jobs_per_seed,
            invocations_per_batch_job: batch.invocations_per_batch_job,
            total_jobs: batch.total_jobs,
            jobs_completed: batch.jobs_completed,
            jobs_failed: batch.jobs_failed,
            entity_failure_count,
            created_at: batch.created_at,
            completed_at,
        }
    }
}

/// Filter for historic batch queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricBatchFilter {
    pub operation_type: Option<String>,
    pub completed_before: Option<DateTime<Utc>>,
}

impl HistoricBatchFilter {
    pub fn operation_type(mut self, operation_type: impl Into<String>) -> Self {
        self.operation_type = Some(operation_type.into());
        self
    }

    pub fn completed_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.completed_before = Some(cutoff);
        self
    }

    pub fn matches(&self, historic: &HistoricBatch) -> bool {
        self.operation_type
            .as_deref()
            .map_or(true, |op| historic.operation_type == op)
            && self
                .completed_before
                .map_or(true, |cutoff| historic.completed_at < cutoff)
    }
}
