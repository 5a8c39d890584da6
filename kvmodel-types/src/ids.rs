//! Identifier types used throughout kvmodel.
//!
//! Entity ids are opaque strings. They are produced either as random tokens
//! (UUID v7, rendered without hyphens) or from a per-model counter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a persisted entity.
///
/// The engine never interprets the contents; it only requires the id to be
/// non-empty and free of the `:` key separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates a new random entity id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    /// Creates an entity id from a counter value.
    #[must_use]
    pub fn from_counter(value: i64) -> Self {
        Self(value.to_string())
    }

    /// Parses an entity id, rejecting empty strings and strings containing `:`.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() || s.contains(':') {
            return Err(crate::Error::InvalidId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the id and returns the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for EntityId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for EntityId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
