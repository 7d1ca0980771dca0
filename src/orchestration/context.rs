//! Shared collaborators of the orchestration components.

use crate::config::BatchFrameworkConfig;
use crate::registry::HandlerRegistry;
use crate::store::{BatchStore, StoreError};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Store, handler registry and live configuration, cheap to clone
#[derive(Clone)]
pub struct BatchContext {
    pub store: Arc<dyn BatchStore>,
    pub registry: HandlerRegistry,
    pub config: Arc<RwLock<BatchFrameworkConfig>>,
}

impl fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchContext")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl BatchContext {
    pub fn new(
        store: Arc<dyn BatchStore>,
        registry: HandlerRegistry,
        config: BatchFrameworkConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Snapshot of the live configuration
    pub async fn config_snapshot(&self) -> BatchFrameworkConfig {
        self.config.read().await.clone()
    }

    pub async fn commit_attempts(&self) -> CommitAttempts {
        CommitAttempts::new(self.config.read().await.executor.max_commit_attempts)
    }
}

/// Bounded retry budget for optimistic read-modify-commit loops
#[derive(Debug, Clone, Copy)]
pub struct CommitAttempts {
    used: u32,
    max: u32,
}

impl CommitAttempts {
    pub fn new(max: u32) -> Self {
        Self {
            used: 0,
            max: max.max(1),
        }
    }

    /// Whether the loop should re-read and try again after `error`
    pub fn retry_after(&mut self, error: &StoreError) -> bool {
        self.used += 1;
        let retry = error.is_version_conflict() && self.used < self.max;
        if retry {
            debug!(attempt = self.used, max = self.max, error = %error, "Retrying commit");
        }
        retry
    }
}
