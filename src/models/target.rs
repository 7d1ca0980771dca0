//! What a batch operates on: an explicit id list, a query, or both.

use super::ids::EntityId;
use crate::error::{BatchError, BatchResult};
use serde::{Deserialize, Serialize};

/// Serialisable query over the entities of an operation type
///
/// The framework never interprets the filter; the registered handler resolves it. It is
/// persisted with the seed job and re-evaluated on every seed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetQuery {
    pub filter: serde_json::Value,
}

impl TargetQuery {
    pub fn new(filter: serde_json::Value) -> Self {
        Self { filter }
    }
}

/// Candidate source of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTarget {
    pub entity_ids: Option<Vec<EntityId>>,
    pub query: Option<TargetQuery>,
}

impl BatchTarget {
    /// Target from an explicit id list; `None` is rejected
    pub fn from_ids(entity_ids: Option<Vec<EntityId>>) -> BatchResult<Self> {
        let entity_ids =
            entity_ids.ok_or_else(|| BatchError::validation("entity ids must not be null"))?;
        Ok(Self {
            entity_ids: Some(entity_ids),
            query: None,
        })
    }

    /// Target from a query; `None` is rejected
    pub fn from_query(query: Option<TargetQuery>) -> BatchResult<Self> {
        let query = query.ok_or_else(|| BatchError::validation("query must not be null"))?;
        Ok(Self {
            entity_ids: None,
            query: Some(query),
        })
    }

    /// Union of an id list and a query; at least one of them has to be present
    pub fn from_parts(
        entity_ids: Option<Vec<EntityId>>,
        query: Option<TargetQuery>,
    ) -> BatchResult<Self> {
        let target = Self { entity_ids, query };
        target.validate()?;
        Ok(target)
    }

    pub fn validate(&self) -> BatchResult<()> {
        if self.entity_ids.is_none() && self.query.is_none() {
            return Err(BatchError::validation(
                "either entity ids or a query must be given",
            ));
        }
        Ok(())
    }

    pub fn explicit_ids(&self) -> &[EntityId] {
        self.entity_ids.as_deref().unwrap_or(&[])
    }
}
