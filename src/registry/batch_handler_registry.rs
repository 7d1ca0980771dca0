//! # Batch Job Handler Registry
//!
//! Per-entity operations plug into the framework through [`BatchJobHandler`]. Handlers are
//! registered once per operation type and looked up by the seed job (candidate resolution)
//! and by worker jobs (per-entity application).

use crate::constants::entities;
use crate::error::{BatchError, BatchResult, OperationError};
use crate::models::{CandidatePosition, EntityId, PartitionKey, TargetQuery};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-entity operation of one batch type
#[async_trait]
pub trait BatchJobHandler: Send + Sync {
    /// Operation type this handler serves, e.g. `historic-process-instance-deletion`
    fn operation_type(&self) -> &str;

    /// Apply the operation to a single entity
    ///
    /// An entity that no longer exists must be treated as a successful no-op. Any other
    /// entity-level problem is reported as an [`OperationError`] and is never retried.
    async fn apply_to(&self, entity_id: &EntityId) -> Result<(), OperationError>;

    /// Grouping key of an entity; `None` for entities the handler does not know
    async fn partition_key(&self, _entity_id: &EntityId) -> BatchResult<Option<PartitionKey>> {
        Ok(None)
    }

    /// Partition keys of `entity_ids`, in the same order
    ///
    /// Override with a single lookup when the backing store supports it.
    async fn partition_keys(&self, entity_ids: &[EntityId]) -> BatchResult<Vec<Option<PartitionKey>>> {
        let mut keys = Vec::with_capacity(entity_ids.len());
        for entity_id in entity_ids {
            keys.push(self.partition_key(entity_id).await?);
        }
        Ok(keys)
    }

    /// Resolve a target query into entity ids
    async fn resolve_query(&self, _query: &TargetQuery) -> BatchResult<Vec<EntityId>> {
        Err(BatchError::validation(format!(
            "operation type {} does not support queries",
            self.operation_type()
        )))
    }

    /// Up to `limit` query matches strictly after `after`, ordered by `(partition key, entity id)`
    ///
    /// Called once per seed invocation. The default resolves the whole query and pages in
    /// memory; handlers over large entity sets should answer it with a keyset query.
    async fn resolve_query_after(
        &self,
        query: &TargetQuery,
        after: Option<&CandidatePosition>,
        limit: usize,
    ) -> BatchResult<Vec<CandidatePosition>> {
        let entity_ids: Vec<EntityId> = self
            .resolve_query(query)
            .await?
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let keys = self.partition_keys(&entity_ids).await?;

        let page: BTreeSet<CandidatePosition> = entity_ids
            .into_iter()
            .zip(keys)
            .map(|(entity_id, partition_key)| CandidatePosition {
                partition_key,
                entity_id,
            })
            .filter(|position| after.map_or(true, |last| position > last))
            .collect();
        Ok(page.into_iter().take(limit).collect())
    }
}

/// Thread-safe handler lookup keyed by operation type
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<DashMap<String, Arc<dyn BatchJobHandler>>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("operation_types", &self.operation_types())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same operation type
    pub fn register(&self, handler: Arc<dyn BatchJobHandler>) {
        let operation_type = handler.operation_type().to_string();
        if self
            .handlers
            .insert(operation_type.clone(), handler)
            .is_some()
        {
            warn!(operation_type = %operation_type, "Replaced existing batch job handler");
        } else {
            info!(operation_type = %operation_type, "Registered batch job handler");
        }
    }

    pub fn unregister(&self, operation_type: &str) -> bool {
        let removed = self.handlers.remove(operation_type).is_some();
        debug!(operation_type = %operation_type, removed, "Unregistered batch job handler");
        removed
    }

    pub fn contains(&self, operation_type: &str) -> bool {
        self.handlers.contains_key(operation_type)
    }

    /// Look up the handler, `NotFound` when nothing is registered for `operation_type`
    pub fn resolve(&self, operation_type: &str) -> BatchResult<Arc<dyn BatchJobHandler>> {
        self.handlers
            .get(operation_type)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BatchError::not_found(entities::HANDLER, operation_type))
    }

    pub fn operation_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl BatchJobHandler for NoopHandler {
        fn operation_type(&self) -> &str {
            "noop"
        }

        async fn apply_to(&self, _entity_id: &EntityId) -> Result<(), OperationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registry = HandlerRegistry::new();
        assert!(matches!(
            registry.resolve("noop"),
            Err(BatchError::NotFound { entity, .. }) if entity == entities::HANDLER
        ));

        registry.register(Arc::new(NoopHandler));
        let handler = registry.resolve("noop").unwrap();
        assert_eq!(handler.operation_type(), "noop");
        assert_eq!(registry.operation_types(), vec!["noop".to_string()]);

        // Defaults: no partition key, no query support
        assert_eq!(handler.partition_key(&EntityId::from("x")).await.unwrap(), None);
        assert!(matches!(
            handler
                .resolve_query(&TargetQuery::new(serde_json::json!({})))
                .await,
            Err(BatchError::Validation(_))
        ));
        assert!(matches!(
            handler
                .resolve_query_after(&TargetQuery::new(serde_json::json!({})), None, 10)
                .await,
            Err(BatchError::Validation(_))
        ));
        assert_eq!(
            handler
                .partition_keys(&[EntityId::from("x"), EntityId::from("y")])
                .await
                .unwrap(),
            vec![None, None]
        );

        assert!(registry.unregister("noop"));
        assert!(!registry.contains("noop"));
    }
}
