//! Error types for the persistence engine.

use kvmodel_model::{ModelError, ValidationErrors};
use kvmodel_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// A relation that could not be written during a save.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("relation {relation} to {target_model}: {reason}")]
pub struct LinkError {
    pub relation: String,
    pub target_model: String,
    pub reason: String,
}

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// One or more properties failed validation. Nothing was written.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// A unique value is already claimed by another entity. Nothing was written.
    #[error("unique constraint violated on {model}.{property} for value {value:?}")]
    UniqueConstraint {
        model: String,
        property: String,
        value: String,
    },

    /// The record's indexed values changed in the store since this instance
    /// loaded them. Nothing was written; reload and retry.
    #[error("{model} {id} was modified concurrently")]
    Stale { model: String, id: String },

    /// No record exists for this id.
    #[error("{model} {id} not found")]
    NotFound { model: String, id: String },

    /// Relations could not be written and the save was aborted.
    #[error("{} relation error(s)", .0.len())]
    Relation(Vec<LinkError>),

    /// The store failed. The in-memory entity is unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("unknown property {property} on model {model}")]
    UnknownProperty { model: String, property: String },

    /// The query cannot be answered from the model's indexes.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The operation needs a persisted entity.
    #[error("{0} entity has no id")]
    MissingId(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid model definition: {0}")]
    Definition(String),
}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::UnknownModel(name) => EngineError::UnknownModel(name),
            ModelError::UnknownProperty { model, property } => {
                EngineError::UnknownProperty { model, property }
            }
            other => EngineError::Definition(other.to_string()),
        }
    }
}

impl EngineError {
    /// True for failures the caller can fix by changing input and retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::UniqueConstraint { .. }
                | EngineError::Relation(_)
                | EngineError::Stale { .. }
        )
    }
}
