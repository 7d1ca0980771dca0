//! # Work Partitioning
//!
//! Turns the target of a batch into worker-job sized chunks.
//!
//! ## Overview
//!
//! The steps are kept apart so the seed job can resume between them:
//!
//! ```text
//! BatchTarget ──(SeedTarget::resolve, once at batch start)──> SeedTarget
//! SeedTarget + SeedCursor ──(next_candidates, per invocation)──> next page of candidates
//!             ──(WorkPartitioner::partition)──> lazy Iterator<Item = Chunk>
//! ```
//!
//! An invocation only ever looks at the page past its cursor: explicit ids are keyed once,
//! queries are paged by the handler.
//!
//! Candidates are ordered by `(partition key, entity id)`; entities whose key the handler
//! does not know sort first. Chunks are cut when the chunk size is reached or when the key
//! changes, so no chunk ever spans two partition keys.

pub mod candidates;
pub mod partitioner;

pub use candidates::{CandidateSet, SeedTarget};
pub use partitioner::{Chunk, Chunks, WorkPartitioner};
