//! Core type definitions for kvmodel.
//!
//! This crate defines the small, store-agnostic types shared by every other
//! kvmodel crate:
//! - [`EntityId`]: the opaque identifier assigned to a persisted entity
//! - [`ChangeEvent`]: the create/update/remove/link notifications published per model
//! - epoch-millisecond timestamp parsing used by property coercion

mod event;
mod ids;
mod timestamp;

pub use event::{ChangeEvent, EventId, EventKind, EventPayload, PropertyDiff};
pub use ids::EntityId;
pub use timestamp::{now_millis, parse_timestamp_millis};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("invalid entity id: {0}")]
    InvalidId(String),
}
