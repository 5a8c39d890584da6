//! Error types for the model layer.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while defining models or addressing their properties.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No model with this name is registered.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The model has no property with this name.
    #[error("unknown property {property} on model {model}")]
    UnknownProperty { model: String, property: String },

    /// A behavior tried to set a property whose coercion is already running.
    #[error("coercion cycle on {model}.{property}")]
    CoercionCycle { model: String, property: String },

    /// The definition itself is malformed.
    #[error("invalid model definition: {0}")]
    InvalidDefinition(String),

    /// A pattern validation could not be compiled.
    #[error("invalid validation pattern: {0}")]
    InvalidPattern(#[from] regex_lite::Error),
}
