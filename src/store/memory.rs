//! In-process [`BatchStore`] backed by hash maps behind one `parking_lot::RwLock`.
//!
//! A commit validates every change against the current state under the write lock and only
//! then applies them, which makes change sets atomic and serialisable.

use super::{BatchStore, Change, ChangeSet, DueJobQuery, StoreError, StoreResult};
use crate::constants::entities;
use crate::models::{Batch, EntityFailure, HistoricBatch, HistoricBatchFilter, Job};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    batches: HashMap<Uuid, Batch>,
    jobs: HashMap<Uuid, Job>,
    historic: HashMap<Uuid, HistoricBatch>,
    failures: HashMap<Uuid, Vec<EntityFailure>>,
}

#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with [`StoreError::Unavailable`] while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    pub fn job_count(&self) -> usize {
        self.state.read().jobs.len()
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable(
                "in-memory store is switched off".to_string(),
            ));
        }
        Ok(())
    }
}

fn not_found(entity: &'static str, id: Uuid) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

fn conflict(entity: &'static str, id: Uuid) -> StoreError {
    StoreError::VersionConflict {
        entity,
        id: id.to_string(),
    }
}

fn duplicate(entity: &'static str, id: Uuid) -> StoreError {
    StoreError::Duplicate {
        entity,
        id: id.to_string(),
    }
}

impl MemoryState {
    fn validate(&self, change: &Change) -> StoreResult<()> {
        match change {
            Change::InsertBatch(batch) => {
                if self.batches.contains_key(&batch.batch_uuid) {
                    return Err(duplicate(entities::BATCH, batch.batch_uuid));
                }
            }
            Change::UpdateBatch(batch) => {
                let stored = self
                    .batches
                    .get(&batch.batch_uuid)
                    .ok_or_else(|| not_found(entities::BATCH, batch.batch_uuid))?;
                if stored.version != batch.version {
                    return Err(conflict(entities::BATCH, batch.batch_uuid));
                }
            }
            Change::DeleteBatch {
                batch_uuid,
                expected_version,
            } => {
                let stored = self
                    .batches
                    .get(batch_uuid)
                    .ok_or_else(|| not_found(entities::BATCH, *batch_uuid))?;
                if stored.version != *expected_version {
                    return Err(conflict(entities::BATCH, *batch_uuid));
                }
            }
            Change::InsertJob(job) => {
                if self.jobs.contains_key(&job.job_uuid) {
                    return Err(duplicate(entities::JOB, job.job_uuid));
                }
            }
            Change::UpdateJob(job) => {
                let stored = self
                    .jobs
                    .get(&job.job_uuid)
                    .ok_or_else(|| not_found(entities::JOB, job.job_uuid))?;
                if stored.version != job.version {
                    return Err(conflict(entities::JOB, job.job_uuid));
                }
            }
            Change::DeleteJob {
                job_uuid,
                expected_version,
            } => {
                let stored = self
                    .jobs
                    .get(job_uuid)
                    .ok_or_else(|| not_found(entities::JOB, *job_uuid))?;
                if stored.version != *expected_version {
                    return Err(conflict(entities::JOB, *job_uuid));
                }
            }
            Change::InsertHistoric(historic) => {
                if self.historic.contains_key(&historic.batch_uuid) {
                    return Err(duplicate(entities::HISTORIC_BATCH, historic.batch_uuid));
                }
            }
            Change::DeleteHistoric(batch_uuid) => {
                if !self.historic.contains_key(batch_uuid) {
                    return Err(not_found(entities::HISTORIC_BATCH, *batch_uuid));
                }
            }
            Change::DeleteJobsOfBatch(_)
            | Change::AppendFailures(_)
            | Change::DeleteFailuresOfBatch(_) => {}
        }
        Ok(())
    }

    fn apply(&mut self, change: Change) {
        match change {
            Change::InsertBatch(batch) => {
                self.batches.insert(batch.batch_uuid, batch);
            }
            Change::UpdateBatch(mut batch) => {
                batch.version += 1;
                self.batches.insert(batch.batch_uuid, batch);
            }
            Change::DeleteBatch { batch_uuid, .. } => {
                self.batches.remove(&batch_uuid);
            }
            Change::InsertJob(job) => {
                self.jobs.insert(job.job_uuid, job);
            }
            Change::UpdateJob(mut job) => {
                job.version += 1;
                self.jobs.insert(job.job_uuid, job);
            }
            Change::DeleteJob { job_uuid, .. } => {
                self.jobs.remove(&job_uuid);
            }
            Change::DeleteJobsOfBatch(batch_uuid) => {
                self.jobs.retain(|_, job| job.batch_uuid != batch_uuid);
            }
            Change::InsertHistoric(historic) => {
                self.historic.insert(historic.batch_uuid, historic);
            }
            Change::DeleteHistoric(batch_uuid) => {
                self.historic.remove(&batch_uuid);
            }
            Change::AppendFailures(failures) => {
                for failure in failures {
                    self.failures
                        .entry(failure.batch_uuid)
                        .or_default()
                        .push(failure);
                }
            }
            Change::DeleteFailuresOfBatch(batch_uuid) => {
                self.failures.remove(&batch_uuid);
            }
        }
    }
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn find_batch(&self, batch_uuid: Uuid) -> StoreResult<Option<Batch>> {
        self.ensure_available()?;
        Ok(self.state.read().batches.get(&batch_uuid).cloned())
    }

    async fn list_batches(&self) -> StoreResult<Vec<Batch>> {
        self.ensure_available()?;
        let mut batches: Vec<Batch> = self.state.read().batches.values().cloned().collect();
        batches.sort_by_key(|batch| (batch.created_at, batch.batch_uuid));
        Ok(batches)
    }

    async fn find_job(&self, job_uuid: Uuid) -> StoreResult<Option<Job>> {
        self.ensure_available()?;
        Ok(self.state.read().jobs.get(&job_uuid).cloned())
    }

    async fn jobs_for_batch(&self, batch_uuid: Uuid) -> StoreResult<Vec<Job>> {
        self.ensure_available()?;
        let mut jobs: Vec<Job> = self
            .state
            .read()
            .jobs
            .values()
            .filter(|job| job.batch_uuid == batch_uuid)
            .cloned()
            .collect();
        jobs.sort_by_key(Job::queue_order_key);
        Ok(jobs)
    }

    async fn due_jobs(&self, query: DueJobQuery) -> StoreResult<Vec<Job>> {
        self.ensure_available()?;
        let mut jobs: Vec<Job> = self
            .state
            .read()
            .jobs
            .values()
            .filter(|job| query.matches(job))
            .cloned()
            .collect();
        jobs.sort_by_key(Job::queue_order_key);
        jobs.truncate(query.limit);
        Ok(jobs)
    }

    async fn entity_failures(&self, batch_uuid: Uuid) -> StoreResult<Vec<EntityFailure>> {
        self.ensure_available()?;
        Ok(self
            .state
            .read()
            .failures
            .get(&batch_uuid)
            .cloned()
            .unwrap_or_default())
    }

    async fn count_entity_failures(&self, batch_uuid: Uuid) -> StoreResult<u64> {
        self.ensure_available()?;
        Ok(self
            .state
            .read()
            .failures
            .get(&batch_uuid)
            .map_or(0, |failures| failures.len() as u64))
    }

    async fn find_historic_batch(&self, batch_uuid: Uuid) -> StoreResult<Option<HistoricBatch>> {
        self.ensure_available()?;
        Ok(self.state.read().historic.get(&batch_uuid).cloned())
    }

    async fn list_historic_batches(
        &self,
        filter: &HistoricBatchFilter,
    ) -> StoreResult<Vec<HistoricBatch>> {
        self.ensure_available()?;
        let mut historic: Vec<HistoricBatch> = self
            .state
            .read()
            .historic
            .values()
            .filter(|historic| filter.matches(historic))
            .cloned()
            .collect();
        historic.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then_with(|| b.batch_uuid.cmp(&a.batch_uuid))
        });
        Ok(historic)
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        self.ensure_available()?;
        let mut state = self.state.write();
        for change in changes.changes() {
            state.validate(change)?;
        }
        let count = changes.len();
        for change in changes.changes {
            state.apply(change);
        }
        trace!(changes = count, "Committed change set");
        Ok(())
    }
}
