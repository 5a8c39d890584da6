//! Change events published per model.
//!
//! Events describe a committed mutation of one entity. They are immutable,
//! carry everything a subscriber needs without a follow-up load, and are
//! serialized as JSON onto the model's pub/sub channel.

use crate::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new event ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The kind of change an event describes. Subscriptions are per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Create,
    Update,
    Remove,
    Link,
    Unlink,
}

impl EventKind {
    /// All event kinds, in publication order within one commit.
    pub const ALL: [EventKind; 5] = [
        EventKind::Create,
        EventKind::Update,
        EventKind::Remove,
        EventKind::Link,
        EventKind::Unlink,
    ];

    /// Channel suffix for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Remove => "remove",
            EventKind::Link => "link",
            EventKind::Unlink => "unlink",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(EventKind::Create),
            "update" => Ok(EventKind::Update),
            "remove" => Ok(EventKind::Remove),
            "link" => Ok(EventKind::Link),
            "unlink" => Ok(EventKind::Unlink),
            other => Err(crate::Error::UnknownEventKind(other.to_string())),
        }
    }
}

/// One property whose in-memory value differs from its persisted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDiff {
    /// Property name.
    pub key: String,
    /// Last persisted value (`None` for a never-saved entity).
    pub before: Option<Value>,
    /// Current value.
    pub after: Value,
}

/// The payload of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    /// An entity was saved for the first time.
    Created {
        /// All properties as committed.
        properties: Map<String, Value>,
    },

    /// An existing entity was saved with changed properties.
    Updated {
        /// All properties as committed.
        properties: Map<String, Value>,
        /// The properties that changed in this commit.
        diff: Vec<PropertyDiff>,
    },

    /// An entity was removed.
    Removed {
        /// Properties as they were before removal.
        properties: Map<String, Value>,
    },

    /// A relation was established from this entity to a target.
    Linked {
        relation: String,
        target_model: String,
        target_id: EntityId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
    },

    /// A relation from this entity to a target was removed.
    Unlinked {
        relation: String,
        target_model: String,
        target_id: EntityId,
    },
}

impl EventPayload {
    /// Returns the subscription kind of this payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            EventPayload::Created { .. } => EventKind::Create,
            EventPayload::Updated { .. } => EventKind::Update,
            EventPayload::Removed { .. } => EventKind::Remove,
            EventPayload::Linked { .. } => EventKind::Link,
            EventPayload::Unlinked { .. } => EventKind::Unlink,
        }
    }
}

/// A committed change to one entity of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Unique identifier for this event.
    pub id: EventId,

    /// Model the entity belongs to.
    pub model: String,

    /// The entity this event applies to.
    pub entity_id: EntityId,

    /// Epoch milliseconds at which the commit batch was built.
    pub timestamp: i64,

    /// The change itself.
    pub payload: EventPayload,
}

impl ChangeEvent {
    /// Creates a new event stamped with the current time.
    #[must_use]
    pub fn new(model: impl Into<String>, entity_id: EntityId, payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            model: model.into(),
            entity_id,
            timestamp: crate::now_millis(),
            payload,
        }
    }

    /// Returns the subscription kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Serializes the event for publication.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a published event.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
