//! # Batch Framework Configuration
//!
//! Explicit configuration passed into the batch service. Nothing here is read live by an
//! in-flight batch: the batch-sizing values are resolved once per batch (see [`resolver`])
//! and copied into the batch record.
//!
//! ## Layers
//!
//! 1. Compiled-in defaults ([`BatchFrameworkConfig::default`])
//! 2. `batch-config.yaml`, with the section named after the environment merged on top
//!    (see [`loader::ConfigManager`])
//! 3. `BATCH_*` environment variables ([`BatchFrameworkConfig::apply_env_overrides`])
//!
//! ```rust,no_run
//! use tasker_batch::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let per_seed = manager.config().batch.default_batch_jobs_per_seed;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;
pub mod resolver;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;
pub use resolver::{BatchConfigResolver, ResolvedBatchConfig};

/// Root configuration structure mirroring batch-config.yaml
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct BatchFrameworkConfig {
    /// Batch sizing defaults and per-type overrides
    #[serde(default)]
    pub batch: BatchConfig,

    /// Job executor settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Retry backoff for failed jobs
    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// Batch sizing configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Worker jobs created by one seed job invocation
    pub default_batch_jobs_per_seed: u32,
    /// Entity ids handled by one worker job
    pub default_invocations_per_batch_job: u32,
    /// Per operation type override of `default_invocations_per_batch_job`
    #[serde(default)]
    pub invocations_per_batch_job_by_batch_type: HashMap<String, u32>,
    /// Per operation type override of `default_batch_jobs_per_seed`
    #[serde(default)]
    pub batch_jobs_per_seed_by_batch_type: HashMap<String, u32>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_batch_jobs_per_seed: defaults::BATCH_JOBS_PER_SEED,
            default_invocations_per_batch_job: defaults::INVOCATIONS_PER_BATCH_JOB,
            invocations_per_batch_job_by_batch_type: HashMap::new(),
            batch_jobs_per_seed_by_batch_type: HashMap::new(),
        }
    }
}

/// Job executor configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutorConfig {
    /// Upper bound of jobs executing at the same time
    pub max_concurrent_jobs: usize,
    /// Jobs fetched per poll
    pub poll_batch_size: usize,
    /// Sleep between polls of the background loop
    pub polling_interval_ms: u64,
    /// How long a claimed job stays invisible to other executors
    pub lock_duration_ms: u64,
    /// Retry budget given to new jobs
    pub default_job_retries: u32,
    /// Optional wall-clock limit for a single job execution
    #[serde(default)]
    pub job_timeout_ms: Option<u64>,
    /// Attempts at an optimistic commit before giving up
    pub max_commit_attempts: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: defaults::MAX_CONCURRENT_JOBS,
            poll_batch_size: defaults::POLL_BATCH_SIZE,
            polling_interval_ms: defaults::POLLING_INTERVAL_MS,
            lock_duration_ms: defaults::LOCK_DURATION_MS,
            default_job_retries: defaults::JOB_RETRIES,
            job_timeout_ms: None,
            max_commit_attempts: defaults::MAX_COMMIT_ATTEMPTS,
        }
    }
}

impl ExecutorConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn lock_duration(&self) -> Duration {
        Duration::from_millis(self.lock_duration_ms)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_ms.map(Duration::from_millis)
    }
}

/// Backoff configuration for job retries
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_enabled: bool,
    pub jitter_max_percentage: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            backoff_multiplier: 2.0,
            jitter_enabled: true,
            jitter_max_percentage: 0.1,
        }
    }
}

impl BatchFrameworkConfig {
    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.batch.default_batch_jobs_per_seed == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch.default_batch_jobs_per_seed",
                "0",
                "a seed job must create at least one worker job",
            ));
        }

        if self.batch.default_invocations_per_batch_job == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch.default_invocations_per_batch_job",
                "0",
                "chunk size must be greater than 0",
            ));
        }

        for (field, overrides) in [
            (
                "batch.invocations_per_batch_job_by_batch_type",
                &self.batch.invocations_per_batch_job_by_batch_type,
            ),
            (
                "batch.batch_jobs_per_seed_by_batch_type",
                &self.batch.batch_jobs_per_seed_by_batch_type,
            ),
        ] {
            if let Some((batch_type, _)) = overrides.iter().find(|(_, value)| **value == 0) {
                return Err(ConfigurationError::invalid_value(
                    format!("{field}.{batch_type}"),
                    "0",
                    "override must be greater than 0",
                ));
            }
        }

        if self.executor.max_concurrent_jobs == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.max_concurrent_jobs",
                "0",
                "at least one job must be able to run",
            ));
        }

        if self.executor.poll_batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.poll_batch_size",
                "0",
                "poll batch size must be greater than 0",
            ));
        }

        if self.executor.max_commit_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.max_commit_attempts",
                "0",
                "at least one commit attempt is required",
            ));
        }

        if self.backoff.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.backoff_multiplier",
                self.backoff.backoff_multiplier.to_string(),
                "multiplier must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff.jitter_max_percentage) {
            return Err(ConfigurationError::invalid_value(
                "backoff.jitter_max_percentage",
                self.backoff.jitter_max_percentage.to_string(),
                "jitter must be between 0.0 and 1.0",
            ));
        }

        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_delay_ms",
                self.backoff.max_delay_ms.to_string(),
                "max delay must not be below base delay",
            ));
        }

        Ok(())
    }

    /// Apply `BATCH_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        if let Some(value) = env_override::<u32>("BATCH_JOBS_PER_SEED")? {
            self.batch.default_batch_jobs_per_seed = value;
        }
        if let Some(value) = env_override::<u32>("BATCH_INVOCATIONS_PER_JOB")? {
            self.batch.default_invocations_per_batch_job = value;
        }
        if let Some(value) = env_override::<usize>("BATCH_MAX_CONCURRENT_JOBS")? {
            self.executor.max_concurrent_jobs = value;
        }
        if let Some(value) = env_override::<u32>("BATCH_JOB_RETRIES")? {
            self.executor.default_job_retries = value;
        }
        Ok(())
    }
}

fn env_override<T>(key: &str) -> ConfigResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigurationError::environment_override(key, e.to_string())),
        Err(_) => Ok(None),
    }
}
