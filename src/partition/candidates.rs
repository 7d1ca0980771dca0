//! Candidates of a batch, in seeding order.
//!
//! The explicit id list is deduplicated and keyed once when the batch starts and travels with
//! the seed job. The query stays lazy: every seed invocation asks the handler only for the
//! page of matches past its cursor.

use crate::error::{BatchError, BatchResult};
use crate::models::{BatchTarget, CandidatePosition, EntityId, SeedCursor, TargetQuery};
use crate::registry::BatchJobHandler;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Distinct candidates ordered by `(partition key, entity id)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateSet {
    positions: Vec<CandidatePosition>,
}

impl CandidateSet {
    /// Deduplicate `entity_ids` and attach their partition keys in one handler call
    ///
    /// Ids the handler does not know are kept with no partition key.
    pub async fn resolve_ids(
        entity_ids: &[EntityId],
        handler: &dyn BatchJobHandler,
    ) -> BatchResult<Self> {
        let entity_ids: Vec<EntityId> = entity_ids
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if entity_ids.is_empty() {
            return Ok(Self::default());
        }

        let keys = handler.partition_keys(&entity_ids).await?;
        if keys.len() != entity_ids.len() {
            return Err(BatchError::infrastructure(format!(
                "handler {} returned {} partition keys for {} entity ids",
                handler.operation_type(),
                keys.len(),
                entity_ids.len()
            )));
        }

        Ok(entity_ids
            .into_iter()
            .zip(keys)
            .map(|(entity_id, partition_key)| CandidatePosition {
                partition_key,
                entity_id,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[CandidatePosition] {
        &self.positions
    }

    /// Candidates the seed job has not reached yet
    pub fn after(&self, cursor: &SeedCursor) -> &[CandidatePosition] {
        let skip = self
            .positions
            .partition_point(|position| !cursor.is_ahead(position));
        &self.positions[skip..]
    }
}

impl FromIterator<CandidatePosition> for CandidateSet {
    fn from_iter<T: IntoIterator<Item = CandidatePosition>>(iter: T) -> Self {
        let mut positions: Vec<CandidatePosition> = iter.into_iter().collect();
        positions.sort();
        positions.dedup();
        Self { positions }
    }
}

/// Persisted target of a seed job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedTarget {
    /// Explicit ids, keyed and ordered at batch start
    pub entities: CandidateSet,
    /// Query re-evaluated page by page on every invocation
    pub query: Option<TargetQuery>,
}

impl SeedTarget {
    pub async fn resolve(target: &BatchTarget, handler: &dyn BatchJobHandler) -> BatchResult<Self> {
        target.validate()?;
        Ok(Self {
            entities: CandidateSet::resolve_ids(target.explicit_ids(), handler).await?,
            query: target.query.clone(),
        })
    }

    /// Whether at least one candidate exists; looks no further than the first one
    pub async fn has_candidates(&self, handler: &dyn BatchJobHandler) -> BatchResult<bool> {
        if !self.entities.is_empty() {
            return Ok(true);
        }
        let first = self
            .next_candidates(&SeedCursor::default(), 1, handler)
            .await?;
        Ok(!first.is_empty())
    }

    /// Up to `limit` candidates past `cursor`, union of both sources without duplicates
    pub async fn next_candidates(
        &self,
        cursor: &SeedCursor,
        limit: usize,
        handler: &dyn BatchJobHandler,
    ) -> BatchResult<Vec<CandidatePosition>> {
        let mut page: BTreeSet<CandidatePosition> = self
            .entities
            .after(cursor)
            .iter()
            .take(limit)
            .cloned()
            .collect();

        if let Some(query) = &self.query {
            let queried = handler
                .resolve_query_after(query, cursor.last_position.as_ref(), limit)
                .await?;
            debug!(
                operation_type = %handler.operation_type(),
                queried = queried.len(),
                limit,
                "Resolved target query page"
            );
            page.extend(queried.into_iter().filter(|position| cursor.is_ahead(position)));
        }

        Ok(page.into_iter().take(limit).collect())
    }
}
