//! Configuration Loader
//!
//! Environment-aware configuration loading. A single `batch-config.yaml` carries the base
//! values; a top-level section named after the environment is merged over them.

use super::error::{ConfigResult, ConfigurationError};
use super::BatchFrameworkConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_NAMES: [&str; 2] = ["batch-config.yaml", "batch-config.yml"];
const ENVIRONMENTS: [&str; 3] = ["development", "test", "production"];

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: BatchFrameworkConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let mut config = Self::load_and_merge_config(&config_directory, environment)?;
        config.apply_env_overrides()?;
        config.validate()?;

        info!(
            environment = environment,
            batch_jobs_per_seed = config.batch.default_batch_jobs_per_seed,
            invocations_per_batch_job = config.batch.default_invocations_per_batch_job,
            type_overrides = config.batch.invocations_per_batch_job_by_batch_type.len(),
            max_concurrent_jobs = config.executor.max_concurrent_jobs,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already built configuration (no file involved)
    pub fn from_config(config: BatchFrameworkConfig, environment: &str) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        })
    }

    pub fn config(&self) -> &BatchFrameworkConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect environment from environment variables
    fn detect_environment() -> String {
        crate::logging::get_environment()
    }

    fn default_config_directory() -> PathBuf {
        env::var("BATCH_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config").join("batch"))
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let candidates: Vec<PathBuf> = CONFIG_FILE_NAMES
            .iter()
            .map(|name| config_directory.join(name))
            .collect();

        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or_else(|| ConfigurationError::config_file_not_found(candidates))
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<BatchFrameworkConfig> {
        let config_file = Self::find_config_file(config_directory)?;

        let yaml_content = std::fs::read_to_string(&config_file).map_err(|e| {
            ConfigurationError::file_read_error(config_file.display().to_string(), e)
        })?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!("Applying environment-specific overrides for: {}", environment);
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for name in ENVIRONMENTS.iter().copied().chain(std::iter::once(environment)) {
                map.remove(YamlValue::String(name.to_string()));
            }
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }
}
