//! Error types for the store layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Transport and protocol failures reported by a store backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend did not answer in time.
    #[error("operation timed out")]
    Timeout,

    /// A command addressed a key holding a different kind of value.
    #[error("wrong type for key {key}: expected {expected}")]
    WrongType { key: String, expected: &'static str },

    /// The backend answered with something the client could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A pub/sub channel was closed.
    #[error("channel closed")]
    ChannelClosed,
}
