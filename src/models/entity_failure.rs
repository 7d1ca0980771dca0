//! Per-entity failure records collected by worker jobs.

use super::ids::EntityId;
use crate::error::{OperationError, OperationErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entity the handler could not process
///
/// Terminal: the entity is not retried. A batch accumulates these across all of its worker
/// jobs and exposes them as one list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub batch_uuid: Uuid,
    pub job_uuid: Uuid,
    pub entity_id: EntityId,
    pub error_kind: OperationErrorKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl EntityFailure {
    pub fn from_operation_error(
        batch_uuid: Uuid,
        job_uuid: Uuid,
        error: OperationError,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            batch_uuid,
            job_uuid,
            entity_id: error.entity_id,
            error_kind: error.kind,
            message: error.message,
            occurred_at,
        }
    }
}
