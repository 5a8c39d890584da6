//! One instance of a registered model.

use crate::error::EngineResult;
use crate::relation::{RelationChange, RelationTarget, DEFAULT_RELATION};
use kvmodel_model::{ModelDefinition, Properties, PropertyDiff, ValidationResult};
use kvmodel_types::EntityId;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A model instance: an optional id, typed properties and queued relation
/// changes that are written on the next save.
///
/// Entities are plain values; every store round-trip goes through
/// [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) id: Option<EntityId>,
    pub(crate) properties: Properties,
    pub(crate) relations: Vec<RelationChange>,
}

impl Entity {
    /// An empty instance holding the model's defaults, with no id.
    pub fn new(definition: Arc<ModelDefinition>) -> Self {
        Self {
            id: None,
            properties: Properties::new(definition),
            relations: Vec::new(),
        }
    }

    pub fn model(&self) -> &str {
        self.properties.definition().name()
    }

    pub fn definition(&self) -> &Arc<ModelDefinition> {
        self.properties.definition()
    }

    /// The id, once the entity has been saved or loaded.
    pub fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    /// True until the first successful save or load.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Sets one property through its type's coercion.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> EngineResult<()> {
        Ok(self.properties.set(name, value)?)
    }

    /// Sets several properties in order.
    pub fn set_many<I, K, V>(&mut self, values: I) -> EngineResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        Ok(self.properties.set_many(values)?)
    }

    /// Typed values of every property.
    pub fn all_properties(&self) -> Map<String, Value> {
        self.properties.all()
    }

    /// `{"id": .., <properties>}` with JSON properties decoded.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "id".into(),
            self.id
                .as_ref()
                .map_or(Value::Null, |id| Value::String(id.to_string())),
        );
        map.extend(self.properties.to_json());
        Value::Object(map)
    }

    pub fn is_dirty(&self) -> bool {
        self.properties.is_dirty()
    }

    pub fn is_property_dirty(&self, name: &str) -> bool {
        self.properties.is_property_dirty(name)
    }

    /// Properties changed since the last load or save.
    pub fn diff(&self) -> Vec<PropertyDiff> {
        self.properties.diff()
    }

    pub fn diff_of(&self, keys: &[&str]) -> Vec<PropertyDiff> {
        self.properties.diff_of(keys)
    }

    /// Discards unsaved property changes and queued relation changes.
    pub fn reset(&mut self) {
        self.properties.reset();
        self.relations.clear();
    }

    /// Validates every property, or just `only`.
    pub async fn validate(&self, only: Option<&str>) -> EngineResult<ValidationResult> {
        Ok(self.properties.validate(only).await?)
    }

    /// Queues a plain relation to `target`, written on the next save.
    pub fn link(&mut self, target: &Entity, name: Option<&str>) {
        self.relations.push(RelationChange::Link {
            name: name.unwrap_or(DEFAULT_RELATION).to_string(),
            target: RelationTarget::of(target),
            score: None,
        });
    }

    /// Queues a scored relation to `target`, ordered by `score`.
    pub fn zlink(&mut self, target: &Entity, name: Option<&str>, score: f64) {
        self.relations.push(RelationChange::Link {
            name: name.unwrap_or(DEFAULT_RELATION).to_string(),
            target: RelationTarget::of(target),
            score: Some(score),
        });
    }

    /// Queues removal of one named relation to `target`.
    pub fn unlink(&mut self, target: &Entity, name: Option<&str>) {
        self.relations.push(RelationChange::Unlink {
            name: name.unwrap_or(DEFAULT_RELATION).to_string(),
            target: RelationTarget::of(target),
        });
    }

    /// Relation changes waiting for the next save.
    pub fn pending_relations(&self) -> usize {
        self.relations.len()
    }
}
