//! # Batch Store
//!
//! Persistence seam of the framework. Everything the framework keeps durable goes through
//! [`BatchStore`]: batches, jobs, historic batches and entity failures.
//!
//! ## Atomic Commits
//!
//! Writes are expressed as a [`ChangeSet`] and applied with [`BatchStore::commit`]. A commit is
//! all-or-nothing. Updates and deletes carry the `version` they were read at; a store whose
//! current version differs rejects the whole change set with [`StoreError::VersionConflict`],
//! and the caller re-reads and retries. A committed update stores `version + 1`. Each change in
//! a set must address a different record.
//!
//! ```text
//! seed invocation:   UpdateBatch(counters) + InsertJob(worker)* + UpdateJob(seed cursor)
//! seeding exhausted: UpdateBatch(SeedingComplete) + InsertJob(worker)* + DeleteJob(seed)
//! last job outcome:  UpdateBatch(Completed) + DeleteJob(worker) + AppendFailures + InsertHistoric
//! ```

pub mod memory;

pub use memory::InMemoryBatchStore;

use crate::models::{Batch, EntityFailure, HistoricBatch, HistoricBatchFilter, Job, JobKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} {id} was modified concurrently")]
    VersionConflict { entity: &'static str, id: String },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} {id} already exists")]
    Duplicate { entity: &'static str, id: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One record-level write inside a [`ChangeSet`]
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    InsertBatch(Batch),
    /// Replace the stored batch; `version` must match the stored one
    UpdateBatch(Batch),
    /// Delete the batch if it is still at `expected_version`
    DeleteBatch { batch_uuid: Uuid, expected_version: u64 },
    InsertJob(Job),
    /// Replace the stored job; `version` must match the stored one
    UpdateJob(Job),
    /// Delete the job if it is still at `expected_version`
    DeleteJob { job_uuid: Uuid, expected_version: u64 },
    /// Delete every job of a batch
    DeleteJobsOfBatch(Uuid),
    InsertHistoric(HistoricBatch),
    DeleteHistoric(Uuid),
    AppendFailures(Vec<EntityFailure>),
    DeleteFailuresOfBatch(Uuid),
}

/// Ordered set of changes applied atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) -> &mut Self {
        self.changes.push(change);
        self
    }

    pub fn insert_batch(mut self, batch: Batch) -> Self {
        self.changes.push(Change::InsertBatch(batch));
        self
    }

    pub fn update_batch(mut self, batch: Batch) -> Self {
        self.changes.push(Change::UpdateBatch(batch));
        self
    }

    pub fn delete_batch(mut self, batch: &Batch) -> Self {
        self.changes.push(Change::DeleteBatch {
            batch_uuid: batch.batch_uuid,
            expected_version: batch.version,
        });
        self
    }

    pub fn insert_job(mut self, job: Job) -> Self {
        self.changes.push(Change::InsertJob(job));
        self
    }

    pub fn insert_jobs(mut self, jobs: impl IntoIterator<Item = Job>) -> Self {
        self.changes.extend(jobs.into_iter().map(Change::InsertJob));
        self
    }

    pub fn update_job(mut self, job: Job) -> Self {
        self.changes.push(Change::UpdateJob(job));
        self
    }

    pub fn delete_job(mut self, job: &Job) -> Self {
        self.changes.push(Change::DeleteJob {
            job_uuid: job.job_uuid,
            expected_version: job.version,
        });
        self
    }

    pub fn delete_jobs_of_batch(mut self, batch_uuid: Uuid) -> Self {
        self.changes.push(Change::DeleteJobsOfBatch(batch_uuid));
        self
    }

    pub fn insert_historic(mut self, historic: HistoricBatch) -> Self {
        self.changes.push(Change::InsertHistoric(historic));
        self
    }

    pub fn delete_historic(mut self, batch_uuid: Uuid) -> Self {
        self.changes.push(Change::DeleteHistoric(batch_uuid));
        self
    }

    pub fn append_failures(mut self, failures: Vec<EntityFailure>) -> Self {
        if !failures.is_empty() {
            self.changes.push(Change::AppendFailures(failures));
        }
        self
    }

    pub fn delete_failures_of_batch(mut self, batch_uuid: Uuid) -> Self {
        self.changes.push(Change::DeleteFailuresOfBatch(batch_uuid));
        self
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// Selection of due jobs for the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueJobQuery {
    pub now: DateTime<Utc>,
    pub limit: usize,
    pub batch_uuid: Option<Uuid>,
    pub kind: Option<JobKind>,
}

impl DueJobQuery {
    pub fn new(now: DateTime<Utc>, limit: usize) -> Self {
        Self {
            now,
            limit,
            batch_uuid: None,
            kind: None,
        }
    }

    pub fn for_batch(mut self, batch_uuid: Uuid) -> Self {
        self.batch_uuid = Some(batch_uuid);
        self
    }

    pub fn of_kind(mut self, kind: JobKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        job.is_pollable(self.now)
            && self.batch_uuid.map_or(true, |uuid| job.batch_uuid == uuid)
            && self.kind.map_or(true, |kind| job.kind() == kind)
    }
}

/// Durable state of the batch framework
#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn find_batch(&self, batch_uuid: Uuid) -> StoreResult<Option<Batch>>;

    /// All live batches, oldest first
    async fn list_batches(&self) -> StoreResult<Vec<Batch>>;

    async fn find_job(&self, job_uuid: Uuid) -> StoreResult<Option<Job>>;

    /// Jobs of a batch in queue order, dead-lettered ones included
    async fn jobs_for_batch(&self, batch_uuid: Uuid) -> StoreResult<Vec<Job>>;

    /// Pollable jobs ordered by `(due_at, created_at, job_uuid)`, at most `query.limit`
    async fn due_jobs(&self, query: DueJobQuery) -> StoreResult<Vec<Job>>;

    async fn entity_failures(&self, batch_uuid: Uuid) -> StoreResult<Vec<EntityFailure>>;

    async fn count_entity_failures(&self, batch_uuid: Uuid) -> StoreResult<u64>;

    async fn find_historic_batch(&self, batch_uuid: Uuid) -> StoreResult<Option<HistoricBatch>>;

    /// Historic batches matching `filter`, most recently completed first
    async fn list_historic_batches(
        &self,
        filter: &HistoricBatchFilter,
    ) -> StoreResult<Vec<HistoricBatch>>;

    /// Apply every change in `changes` or none of them
    async fn commit(&self, changes: ChangeSet) -> StoreResult<()>;
}
