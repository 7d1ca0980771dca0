//! # Historic Batch Tracker
//!
//! Closes finished batches and owns the deletion paths of live and historic batches.
//!
//! A batch is finished once seeding is complete and every created worker job reported back.
//! The job outcome that gets it there flips the batch to `Completed` and inserts the
//! [`HistoricBatch`] in the same commit, so a historic record exists exactly for batches whose
//! completion was persisted.

use super::context::BatchContext;
use crate::constants::entities;
use crate::error::{BatchError, BatchResult};
use crate::models::{Batch, HistoricBatch, HistoricBatchFilter};
use crate::state_machine::BatchEvent;
use crate::store::ChangeSet;
use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

/// Complete `batch` in place when it is finished and return its historic record
pub(crate) fn close_if_finished(
    batch: &mut Batch,
    entity_failure_count: u64,
    now: DateTime<Utc>,
) -> BatchResult<Option<HistoricBatch>> {
    if !batch.is_finished() {
        return Ok(None);
    }
    batch.transition(BatchEvent::FinishJobs, now)?;
    Ok(Some(HistoricBatch::from_batch(
        batch,
        entity_failure_count,
        now,
    )))
}

#[derive(Debug, Clone)]
pub struct HistoricBatchTracker {
    context: BatchContext,
}

impl HistoricBatchTracker {
    pub fn new(context: BatchContext) -> Self {
        Self { context }
    }

    /// Delete a live batch
    ///
    /// Without `cascade` the batch must not have any jobs left; otherwise its jobs are removed
    /// with it. Entity failures always go with the batch. The historic record is untouched.
    #[instrument(skip(self), fields(batch_uuid = %batch_uuid))]
    pub async fn delete_batch(&self, batch_uuid: Uuid, cascade: bool) -> BatchResult<()> {
        let mut attempts = self.context.commit_attempts().await;
        loop {
            let mut batch = self
                .context
                .store
                .find_batch(batch_uuid)
                .await?
                .ok_or_else(|| BatchError::not_found(entities::BATCH, batch_uuid))?;
            let remaining_jobs = self.context.store.jobs_for_batch(batch_uuid).await?.len();

            if remaining_jobs > 0 && !cascade {
                return Err(BatchError::state(format!(
                    "batch {batch_uuid} still has {remaining_jobs} job(s); delete with cascade to remove them"
                )));
            }

            let expected = batch.clone();
            batch.transition(BatchEvent::Delete, Utc::now())?;

            let changes = ChangeSet::new()
                .delete_batch(&expected)
                .delete_jobs_of_batch(batch_uuid)
                .delete_failures_of_batch(batch_uuid);

            match self.context.store.commit(changes).await {
                Ok(()) => {
                    crate::log_batch!(
                        info,
                        "DELETED",
                        batch_uuid: batch_uuid,
                        cascade: cascade,
                        removed_jobs: remaining_jobs,
                        previous_state: expected.state,
                    );
                    return Ok(());
                }
                Err(error) if attempts.retry_after(&error) => continue,
                Err(error) => return Err(error.into()),
            }
        }
    }

    #[instrument(skip(self), fields(batch_uuid = %batch_uuid))]
    pub async fn delete_historic_batch(&self, batch_uuid: Uuid) -> BatchResult<()> {
        self.context
            .store
            .commit(ChangeSet::new().delete_historic(batch_uuid))
            .await?;
        info!(batch_uuid = %batch_uuid, "Deleted historic batch");
        Ok(())
    }

    /// Remove historic batches completed before `completed_before`, returning how many went
    pub async fn cleanup_historic_batches(
        &self,
        completed_before: DateTime<Utc>,
    ) -> BatchResult<usize> {
        let expired = self
            .context
            .store
            .list_historic_batches(&HistoricBatchFilter::default().completed_before(completed_before))
            .await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let changes = expired
            .iter()
            .fold(ChangeSet::new(), |changes, historic| {
                changes.delete_historic(historic.batch_uuid)
            });
        self.context.store.commit(changes).await?;

        info!(
            removed = expired.len(),
            completed_before = %completed_before.to_rfc3339(),
            "Cleaned up historic batches"
        );
        Ok(expired.len())
    }

    pub async fn find_historic_batch(&self, batch_uuid: Uuid) -> BatchResult<HistoricBatch> {
        self.context
            .store
            .find_historic_batch(batch_uuid)
            .await?
            .ok_or_else(|| BatchError::not_found(entities::HISTORIC_BATCH, batch_uuid))
    }

    pub async fn list_historic_batches(
        &self,
        filter: &HistoricBatchFilter,
    ) -> BatchResult<Vec<HistoricBatch>> {
        Ok(self.context.store.list_historic_batches(filter).await?)
    }
}
