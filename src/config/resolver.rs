//! Batch configuration resolution.
//!
//! Resolves the effective sizing for one operation type. The result is meant to be
//! snapshotted into the batch at creation time.

use super::BatchConfig;
use serde::{Deserialize, Serialize};

/// Effective sizing of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBatchConfig {
    /// Worker jobs created per seed job invocation
    pub batch_jobs_per_seed: u32,
    /// Entity ids per worker job
    pub invocations_per_batch_job: u32,
}

/// Resolves per-type overrides against process-wide defaults
#[derive(Debug, Clone, Copy)]
pub struct BatchConfigResolver<'a> {
    config: &'a BatchConfig,
}

impl<'a> BatchConfigResolver<'a> {
    pub fn new(config: &'a BatchConfig) -> Self {
        Self { config }
    }

    pub fn resolve(&self, operation_type: &str) -> ResolvedBatchConfig {
        let invocations_per_batch_job = self
            .config
            .invocations_per_batch_job_by_batch_type
            .get(operation_type)
            .copied()
            .unwrap_or(self.config.default_invocations_per_batch_job);

        let batch_jobs_per_seed = self
            .config
            .batch_jobs_per_seed_by_batch_type
            .get(operation_type)
            .copied()
            .unwrap_or(self.config.default_batch_jobs_per_seed);

        ResolvedBatchConfig {
            batch_jobs_per_seed,
            invocations_per_batch_job,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::batch_types;

    #[test]
    fn test_defaults_apply_without_override() {
        let config = BatchConfig {
            default_batch_jobs_per_seed: 50,
            default_invocations_per_batch_job: 3,
            ..BatchConfig::default()
        };

        let resolved = BatchConfigResolver::new(&config).resolve(batch_types::SET_JOB_RETRIES);
        assert_eq!(
            resolved,
            ResolvedBatchConfig {
                batch_jobs_per_seed: 50,
                invocations_per_batch_job: 3,
            }
        );
    }

    #[test]
    fn test_per_type_override_wins() {
        let mut config = BatchConfig::default();
        config.invocations_per_batch_job_by_batch_type.insert(
            batch_types::HISTORIC_PROCESS_INSTANCE_DELETION.to_string(),
            42,
        );
        config
            .batch_jobs_per_seed_by_batch_type
            .insert(batch_types::PROCESS_INSTANCE_DELETION.to_string(), 5);

        let resolver = BatchConfigResolver::new(&config);
        let historic = resolver.resolve(batch_types::HISTORIC_PROCESS_INSTANCE_DELETION);
        assert_eq!(historic.invocations_per_batch_job, 42);
        assert_eq!(historic.batch_jobs_per_seed, config.default_batch_jobs_per_seed);

        let runtime = resolver.resolve(batch_types::PROCESS_INSTANCE_DELETION);
        assert_eq!(runtime.batch_jobs_per_seed, 5);
        assert_eq!(
            runtime.invocations_per_batch_job,
            config.default_invocations_per_batch_job
        );
    }
}
