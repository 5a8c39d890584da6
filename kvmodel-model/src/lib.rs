//! Model layer for kvmodel.
//!
//! Defines everything about an entity that can be decided without talking to
//! the store:
//! - [`ModelDefinition`]: a model's ordered properties and id strategy
//! - [`Registry`]: the process-wide table of registered definitions
//! - [`coerce`]: conversion of raw input into a property's declared type
//! - [`Validation`]: built-in and custom rules, evaluated asynchronously
//! - [`Properties`]: one entity's typed values with dirty tracking
//!
//! The engine crate composes these with the store to persist entities.

mod behavior;
mod coerce;
mod error;
mod properties;
mod registry;
mod schema;
mod validation;

pub use behavior::{Behavior, Siblings};
pub use coerce::{coerce, decode_stored, encode_field, encode_stored, score_of, zero_value};
pub use error::{ModelError, ModelResult};
pub use kvmodel_types::PropertyDiff;
pub use properties::Properties;
pub use registry::Registry;
pub use schema::{
    BuiltinType, IdStrategy, ModelDefinition, ModelDefinitionBuilder, PropertyDef, PropertyType,
};
pub use validation::{
    NumberLocale, Validation, ValidationErrors, ValidationResult, ValidatorOptions,
};
