//! # Job Model
//!
//! Seed and worker jobs share one record; the payload is the tagged variant.
//!
//! Job ids are UUIDv7, so ordering by id approximates creation order. The executor's queue
//! order is `(due_at, created_at, job_uuid)`.

use super::ids::{EntityId, PartitionKey};
use crate::partition::SeedTarget;
use crate::state_machine::JobState;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Position in the ordered candidate set: partition key first, then entity id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidatePosition {
    pub partition_key: Option<PartitionKey>,
    pub entity_id: EntityId,
}

/// Keyset cursor of a seed job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedCursor {
    /// Last candidate handed to a worker job, `None` before the first invocation
    pub last_position: Option<CandidatePosition>,
    /// Entity ids seeded so far
    pub seeded_entities: u64,
    /// Completed invocations of the seed job
    pub invocations: u32,
}

impl SeedCursor {
    /// Whether `position` still has to be seeded
    pub fn is_ahead(&self, position: &CandidatePosition) -> bool {
        self.last_position
            .as_ref()
            .map_or(true, |last| position > last)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    Seed {
        target: SeedTarget,
        cursor: SeedCursor,
    },
    Worker {
        partition_key: Option<PartitionKey>,
        entity_ids: Vec<EntityId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Seed,
    Worker,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seed => write!(f, "seed"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Seed { .. } => JobKind::Seed,
            Self::Worker { .. } => JobKind::Worker,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_uuid: Uuid,
    pub batch_uuid: Uuid,
    pub payload: JobPayload,
    pub state: JobState,
    pub due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Remaining attempts, decremented on every job-level failure
    pub retries: u32,
    pub attempts: u32,
    pub lock_owner: Option<Uuid>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub version: u64,
}

impl Job {
    fn new(batch_uuid: Uuid, payload: JobPayload, retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            job_uuid: Uuid::now_v7(),
            batch_uuid,
            payload,
            state: JobState::Pending,
            due_at: now,
            created_at: now,
            retries,
            attempts: 0,
            lock_owner: None,
            lock_expires_at: None,
            last_error: None,
            version: 0,
        }
    }

    pub fn new_seed(
        batch_uuid: Uuid,
        target: SeedTarget,
        retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            batch_uuid,
            JobPayload::Seed {
                target,
                cursor: SeedCursor::default(),
            },
            retries,
            now,
        )
    }

    pub fn new_worker(
        batch_uuid: Uuid,
        partition_key: Option<PartitionKey>,
        entity_ids: Vec<EntityId>,
        retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            batch_uuid,
            JobPayload::Worker {
                partition_key,
                entity_ids,
            },
            retries,
            now,
        )
    }

    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    pub fn partition_key(&self) -> Option<&PartitionKey> {
        match &self.payload {
            JobPayload::Worker { partition_key, .. } => partition_key.as_ref(),
            JobPayload::Seed { .. } => None,
        }
    }

    pub fn entity_ids(&self) -> &[EntityId] {
        match &self.payload {
            JobPayload::Worker { entity_ids, .. } => entity_ids,
            JobPayload::Seed { .. } => &[],
        }
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lock_expires_at.is_some_and(|expires| expires > now)
    }

    /// Whether an executor may pick this job up at `now`
    ///
    /// Running jobs whose lock expired are pollable again: their executor is gone.
    pub fn is_pollable(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Pending => self.due_at <= now,
            JobState::Running => !self.is_locked(now),
            JobState::Failed => false,
        }
    }

    pub fn claim(&mut self, owner: Uuid, now: DateTime<Utc>, lock_duration: Duration) {
        self.state = JobState::Running;
        self.attempts += 1;
        self.lock_owner = Some(owner);
        self.lock_expires_at = Some(now + lock_duration);
    }

    pub fn is_claimed_by(&self, owner: Uuid) -> bool {
        self.lock_owner == Some(owner)
    }

    /// Whether this (re-read) job is still under the claim taken on `claimed`
    ///
    /// A job re-claimed after its lock expired has a higher attempt count.
    pub fn holds_claim_of(&self, claimed: &Job) -> bool {
        self.state == JobState::Running
            && claimed.lock_owner.is_some_and(|owner| self.is_claimed_by(owner))
            && self.attempts == claimed.attempts
    }

    /// Put the job back into the queue at `due_at`
    pub fn reschedule(&mut self, due_at: DateTime<Utc>) {
        self.state = JobState::Pending;
        self.due_at = due_at;
        self.release_lock();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.state = JobState::Failed;
        self.last_error = Some(error.into());
        self.release_lock();
    }

    fn release_lock(&mut self) {
        self.lock_owner = None;
        self.lock_expires_at = None;
    }

    pub fn queue_order_key(&self) -> (DateTime<Utc>, DateTime<Utc>, Uuid) {
        (self.due_at, self.created_at, self.job_uuid)
    }
}
