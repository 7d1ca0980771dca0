use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tasker_batch::constants::batch_types;
use tasker_batch::error::{BatchError, BatchResult, OperationError};
use tasker_batch::models::{CandidatePosition, EntityId, PartitionKey, TargetQuery};
use tasker_batch::registry::BatchJobHandler;

/// A deletable entity, e.g. a historic process instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub deployment: String,
    pub finished: bool,
    /// Deletion is refused with an entity-level error
    pub protected: bool,
}

/// In-memory entity store whose operation deletes entries
///
/// Unknown ids are a no-op success. Queries are JSON objects with optional `deployment` and
/// `finished` fields.
pub struct EntityCatalog {
    operation_type: String,
    entries: Mutex<BTreeMap<EntityId, CatalogEntry>>,
    applied: Mutex<Vec<EntityId>>,
    apply_delay: Mutex<Option<Duration>>,
    entity_delays: Mutex<HashMap<EntityId, Duration>>,
    query_error: Mutex<Option<BatchError>>,
    key_lookups: AtomicUsize,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::for_operation(batch_types::HISTORIC_PROCESS_INSTANCE_DELETION)
    }

    pub fn for_operation(operation_type: &str) -> Self {
        Self {
            operation_type: operation_type.to_string(),
            entries: Mutex::new(BTreeMap::new()),
            applied: Mutex::new(Vec::new()),
            apply_delay: Mutex::new(None),
            entity_delays: Mutex::new(HashMap::new()),
            query_error: Mutex::new(None),
            key_lookups: AtomicUsize::new(0),
        }
    }

    pub fn with_entities(self, deployment: &str, ids: &[&str]) -> Self {
        for id in ids {
            self.insert(id, deployment, true);
        }
        self
    }

    pub fn insert(&self, id: &str, deployment: &str, finished: bool) {
        self.entries.lock().insert(
            EntityId::from(id),
            CatalogEntry {
                deployment: deployment.to_string(),
                finished,
                protected: false,
            },
        );
    }

    pub fn protect(&self, id: &str) {
        if let Some(entry) = self.entries.lock().get_mut(&EntityId::from(id)) {
            entry.protected = true;
        }
    }

    pub fn set_apply_delay(&self, delay: Duration) {
        *self.apply_delay.lock() = Some(delay);
    }

    /// Delay `apply_to` for one entity only
    pub fn slow_down(&self, id: &str, delay: Duration) {
        self.entity_delays.lock().insert(EntityId::from(id), delay);
    }

    /// Fail every query with an infrastructure error
    pub fn set_fail_queries(&self, fail: bool) {
        self.set_query_error(
            fail.then(|| BatchError::infrastructure("catalog query backend unavailable")),
        );
    }

    pub fn set_query_error(&self, error: Option<BatchError>) {
        *self.query_error.lock() = error;
    }

    /// Number of entities `partition_key` was asked about
    pub fn key_lookups(&self) -> usize {
        self.key_lookups.load(Ordering::SeqCst)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().contains_key(&EntityId::from(id))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Every id `apply_to` was called with, in call order
    pub fn applied(&self) -> Vec<EntityId> {
        self.applied.lock().clone()
    }

    pub fn ids(ids: &[&str]) -> Vec<EntityId> {
        ids.iter().map(|id| EntityId::from(*id)).collect()
    }
}

#[async_trait]
impl BatchJobHandler for EntityCatalog {
    fn operation_type(&self) -> &str {
        &self.operation_type
    }

    async fn apply_to(&self, entity_id: &EntityId) -> Result<(), OperationError> {
        let delay = self
            .entity_delays
            .lock()
            .get(entity_id)
            .copied()
            .or(*self.apply_delay.lock());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.applied.lock().push(entity_id.clone());

        let mut entries = self.entries.lock();
        match entries.get(entity_id) {
            None => Ok(()),
            Some(entry) if entry.protected => Err(OperationError::precondition_failed(
                entity_id.clone(),
                "entity is protected",
            )),
            Some(_) => {
                entries.remove(entity_id);
                Ok(())
            }
        }
    }

    async fn partition_key(&self, entity_id: &EntityId) -> BatchResult<Option<PartitionKey>> {
        self.key_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .entries
            .lock()
            .get(entity_id)
            .map(|entry| PartitionKey::new(entry.deployment.clone())))
    }

    async fn resolve_query(&self, query: &TargetQuery) -> BatchResult<Vec<EntityId>> {
        Ok(self
            .matching(query)?
            .into_iter()
            .map(|position| position.entity_id)
            .collect())
    }

    /// Scans the catalog directly, so paging costs no key lookups
    async fn resolve_query_after(
        &self,
        query: &TargetQuery,
        after: Option<&CandidatePosition>,
        limit: usize,
    ) -> BatchResult<Vec<CandidatePosition>> {
        Ok(self
            .matching(query)?
            .into_iter()
            .filter(|position| after.map_or(true, |after| position > after))
            .take(limit)
            .collect())
    }
}

impl EntityCatalog {
    fn matching(&self, query: &TargetQuery) -> BatchResult<BTreeSet<CandidatePosition>> {
        if let Some(error) = self.query_error.lock().clone() {
            return Err(error);
        }
        let deployment = query.filter.get("deployment").and_then(|v| v.as_str());
        let finished = query.filter.get("finished").and_then(|v| v.as_bool());

        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|(_, entry)| deployment.map_or(true, |d| entry.deployment == d))
            .filter(|(_, entry)| finished.map_or(true, |f| entry.finished == f))
            .map(|(id, entry)| CandidatePosition {
                partition_key: Some(PartitionKey::new(entry.deployment.clone())),
                entity_id: id.clone(),
            })
            .collect())
    }
}
