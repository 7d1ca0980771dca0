//! Error types for the batch framework.
//!
//! The taxonomy follows how failures are handled, not where they happen:
//!
//! - `Validation` - bad batch-start input, surfaced before anything is persisted
//! - `Operation` - a single entity could not be processed; recorded, never retried
//! - `Infrastructure` - a job could not run at all; retried by the executor
//! - `State` - the requested mutation is not allowed in the current state
//! - `NotFound` - the addressed record does not exist

use crate::config::ConfigurationError;
use crate::models::EntityId;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
    #[error("State error: {0}")]
    State(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BatchError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the executor should spend a retry on this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }
}

impl From<StoreError> for BatchError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { entity, id } => BatchError::NotFound { entity, id },
            other => BatchError::Infrastructure(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(error: serde_json::Error) -> Self {
        BatchError::Infrastructure(format!("JSON serialization error: {error}"))
    }
}

impl From<ConfigurationError> for BatchError {
    fn from(error: ConfigurationError) -> Self {
        BatchError::Configuration(error.to_string())
    }
}

pub type BatchResult<T> = std::result::Result<T, BatchError>;

/// Kind of a per-entity failure reported by a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationErrorKind {
    /// The entity does not exist (anymore)
    EntityNotFound,
    /// An operation-specific precondition was not met
    PreconditionFailed,
    /// A business rule rejected the operation
    Conflict,
    /// Anything else the handler could not classify
    Other,
}

impl fmt::Display for OperationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntityNotFound => write!(f, "entity_not_found"),
            Self::PreconditionFailed => write!(f, "precondition_failed"),
            Self::Conflict => write!(f, "conflict"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Failure of a per-entity operation for exactly one entity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} for entity {entity_id}: {message}")]
pub struct OperationError {
    pub entity_id: EntityId,
    pub kind: OperationErrorKind,
    pub message: String,
}

impl OperationError {
    pub fn new(entity_id: EntityId, kind: OperationErrorKind, message: impl Into<String>) -> Self {
        Self {
            entity_id,
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(entity_id: EntityId) -> Self {
        let message = format!("entity {entity_id} does not exist");
        Self::new(entity_id, OperationErrorKind::EntityNotFound, message)
    }

    pub fn precondition_failed(entity_id: EntityId, message: impl Into<String>) -> Self {
        Self::new(entity_id, OperationErrorKind::PreconditionFailed, message)
    }
}
