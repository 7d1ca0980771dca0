//! # Job Execution
//!
//! [`JobExecutor`] runs individual jobs with bounded concurrency; [`ProcessingLoop`] drives it
//! in the background at the configured polling interval.

pub mod job_executor;
pub mod processing_loop;

pub use job_executor::{ExecutionSummary, JobExecutor, JobOutcome};
pub use processing_loop::ProcessingLoop;
