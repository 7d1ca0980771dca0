//! # System Constants
//!
//! Defaults and well-known identifiers shared across the batch framework.

/// Well-known batch operation types
pub mod batch_types {
    pub const HISTORIC_PROCESS_INSTANCE_DELETION: &str = "historic-process-instance-deletion";
    pub const HISTORIC_DECISION_INSTANCE_DELETION: &str = "historic-decision-instance-deletion";
    pub const PROCESS_INSTANCE_DELETION: &str = "process-instance-deletion";
    pub const SET_JOB_RETRIES: &str = "set-job-retries";
}

/// Process-wide defaults used when no configuration overrides them
pub mod defaults {
    /// Worker jobs created per seed job invocation
    pub const BATCH_JOBS_PER_SEED: u32 = 100;
    /// Entity ids handled by one worker job
    pub const INVOCATIONS_PER_BATCH_JOB: u32 = 1;
    /// Retry budget of a freshly created job
    pub const JOB_RETRIES: u32 = 3;
    pub const MAX_CONCURRENT_JOBS: usize = 8;
    pub const POLL_BATCH_SIZE: usize = 32;
    pub const POLLING_INTERVAL_MS: u64 = 250;
    pub const LOCK_DURATION_MS: u64 = 300_000;
    pub const MAX_COMMIT_ATTEMPTS: u32 = 16;
}

/// Entity names used in errors and logs
pub mod entities {
    pub const BATCH: &str = "batch";
    pub const JOB: &str = "job";
    pub const HISTORIC_BATCH: &str = "historic batch";
    pub const HANDLER: &str = "batch job handler";
}
