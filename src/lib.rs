#![allow(clippy::doc_markdown)] // Allow technical terms like UUIDv7 in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Batch
//!
//! Asynchronous batch operation core: a bulk operation over an unbounded set of entity ids
//! is split into independently schedulable worker jobs, executed with bounded concurrency and
//! retries, and tracked durably until a historic record is written.
//!
//! ## Architecture
//!
//! A batch is started with an id list, a query, or both. A single **seed job** expands that
//! target into **worker jobs** a bounded number at a time, rescheduling itself until the
//! candidate set is exhausted. Worker jobs apply a registered per-entity operation to a chunk
//! of ids that share one partition key. When seeding is complete and every worker job reported
//! back, the batch completes and a **historic batch** is written in the same commit.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Batch service, seed/worker jobs, executor, historic tracker
//! - [`partition`] - Candidate resolution and chunking
//! - [`models`] - Batch, job, historic batch and entity failure records
//! - [`store`] - Persistence seam with atomic, version-checked commits
//! - [`registry`] - Per-entity operation handlers by operation type
//! - [`state_machine`] - Batch and seed job lifecycles
//! - [`config`] - YAML configuration, environment overrides, per-type resolution
//! - [`error`] - Error taxonomy
//! - [`logging`] - Structured logging setup and macros
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tasker_batch::config::BatchFrameworkConfig;
//! use tasker_batch::models::EntityId;
//! use tasker_batch::orchestration::BatchService;
//! use tasker_batch::registry::HandlerRegistry;
//! use tasker_batch::store::InMemoryBatchStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = HandlerRegistry::new();
//! // registry.register(Arc::new(MyDeletionHandler::new(...)));
//! let service = BatchService::new(
//!     Arc::new(InMemoryBatchStore::new()),
//!     registry,
//!     BatchFrameworkConfig::default(),
//! )?;
//!
//! let batch = service
//!     .start_batch_with_ids(
//!         "historic-process-instance-deletion",
//!         Some(vec![EntityId::from("pi-1")]),
//!         Some("retention".to_string()),
//!     )
//!     .await?;
//! service.execute_seed_jobs(batch.batch_uuid).await?;
//! let failures = service.execute_due_worker_jobs(batch.batch_uuid).await?;
//! # let _ = failures;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod partition;
pub mod registry;
pub mod state_machine;
pub mod store;

pub use config::{
    BackoffConfig, BatchConfig, BatchConfigResolver, BatchFrameworkConfig, ConfigManager,
    ExecutorConfig, ResolvedBatchConfig,
};
pub use error::{BatchError, BatchResult, OperationError, OperationErrorKind};
pub use models::{
    Batch, BatchTarget, EntityFailure, EntityId, HistoricBatch, HistoricBatchFilter, Job,
    PartitionKey, TargetQuery,
};
pub use orchestration::{BatchRequest, BatchService, JobOutcome, ProcessingLoop, WorkerRunSummary};
pub use partition::{Chunk, WorkPartitioner};
pub use registry::{BatchJobHandler, HandlerRegistry};
pub use state_machine::{BatchState, JobState, SeedJobState};
pub use store::{BatchStore, InMemoryBatchStore};
