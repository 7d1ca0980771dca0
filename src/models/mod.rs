//! # Data Models
//!
//! Records the batch framework persists through [`crate::store::BatchStore`]:
//!
//! - [`Batch`] - live aggregate of one bulk operation
//! - [`Job`] - seed or worker job with its retry and lock bookkeeping
//! - [`HistoricBatch`] - snapshot of a completed batch
//! - [`EntityFailure`] - terminal per-entity failure collected by a worker job

pub mod batch;
pub mod entity_failure;
pub mod historic_batch;
pub mod ids;
pub mod job;
pub mod target;

pub use batch::{Batch, NewBatch};
pub use entity_failure::EntityFailure;
pub use historic_batch::{HistoricBatch, HistoricBatchFilter};
pub use ids::{EntityId, PartitionKey};
pub use job::{CandidatePosition, Job, JobKind, JobPayload, SeedCursor};
pub use target::{BatchTarget, TargetQuery};
