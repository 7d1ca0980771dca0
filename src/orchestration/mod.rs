//! # Batch Orchestration
//!
//! Runtime of the batch framework: the seed and worker jobs, their executor and the tracker
//! that closes and deletes batches.
//!
//! ## Core Components
//!
//! - **BatchService**: inbound API, the only entry point callers need
//! - **SeedJob**: expands a batch target into worker jobs, a bounded number per invocation
//! - **WorkerJob**: applies the operation handler to one chunk of entity ids
//! - **JobExecutor**: claims, runs and retries jobs with bounded concurrency
//! - **ProcessingLoop**: polls the executor in the background
//! - **HistoricBatchTracker**: historic records and batch deletion
//! - **BackoffCalculator**: exponential retry delays with jitter
//!
//! ## Data Flow
//!
//! ```text
//! start_batch ─> Batch + seed Job
//! seed Job ─(per invocation)─> worker Jobs ─> executor ─> batch counters ─> HistoricBatch
//! ```

pub mod backoff_calculator;
pub mod batch_service;
pub mod context;
pub mod executor;
pub mod historic_tracker;
pub mod seed_job;
pub mod worker_job;

pub use backoff_calculator::BackoffCalculator;
pub use batch_service::{BatchRequest, BatchService, WorkerRunSummary};
pub use context::BatchContext;
pub use executor::{ExecutionSummary, JobExecutor, JobOutcome, ProcessingLoop};
pub use historic_tracker::HistoricBatchTracker;
pub use seed_job::{SeedJob, SeedProgress};
pub use worker_job::WorkerJob;
