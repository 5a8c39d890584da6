use crate::behavior::Siblings;
use crate::coerce::{coerce, decode_stored, encode_field};
use crate::error::{ModelError, ModelResult};
use crate::schema::{ModelDefinition, PropertyDef, PropertyType};
use crate::validation::{failing_rules, ValidationErrors, ValidationResult};
use kvmodel_types::PropertyDiff;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    /// `None` until the value has been loaded from or written to the store.
    persisted: Option<Value>,
    /// The record's hash holds a field for this property.
    in_store: bool,
}

impl Slot {
    fn is_dirty(&self) -> bool {
        self.persisted.as_ref() != Some(&self.value)
    }
}

/// The typed property values of one entity, with dirty tracking.
///
/// A property is dirty iff its current value differs from the last value
/// persisted to (or loaded from) the store. Fresh instances hold coerced
/// defaults and are entirely dirty.
#[derive(Debug, Clone)]
pub struct Properties {
    definition: Arc<ModelDefinition>,
    slots: Vec<Slot>,
}

impl Properties {
    /// Creates a property store holding the model's defaults.
    pub fn new(definition: Arc<ModelDefinition>) -> Self {
        let slots = definition
            .properties()
            .iter()
            .map(|p| Slot {
                value: p.coerced_default(),
                persisted: None,
                in_store: false,
            })
            .collect();
        Self { definition, slots }
    }

    pub fn definition(&self) -> &Arc<ModelDefinition> {
        &self.definition
    }

    fn position(&self, name: &str) -> ModelResult<usize> {
        self.definition
            .position(name)
            .ok_or_else(|| ModelError::UnknownProperty {
                model: self.definition.name().to_string(),
                property: name.to_string(),
            })
    }

    /// Current value of a property.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.definition.position(name).map(|i| &self.slots[i].value)
    }

    /// Last persisted value of a property.
    pub fn persisted(&self, name: &str) -> Option<&Value> {
        self.definition
            .position(name)
            .and_then(|i| self.slots[i].persisted.as_ref())
    }

    /// Coerces `raw` into the property's type and stores it.
    pub fn set(&mut self, name: &str, raw: impl Into<Value>) -> ModelResult<()> {
        self.set_within(name, raw.into(), &mut Vec::new())
    }

    /// Sets a property while the behaviors at `coercing` are running.
    ///
    /// A behavior that sets a property already being coerced is rejected.
    pub(crate) fn set_within(
        &mut self,
        name: &str,
        raw: Value,
        coercing: &mut Vec<usize>,
    ) -> ModelResult<()> {
        let index = self.position(name)?;
        if coercing.contains(&index) {
            return Err(ModelError::CoercionCycle {
                model: self.definition.name().to_string(),
                property: name.to_string(),
            });
        }
        let definition = Arc::clone(&self.definition);
        let value = match &definition.properties()[index].kind {
            PropertyType::Builtin(ty) => coerce(*ty, &raw),
            PropertyType::Behavior(behavior) => {
                let previous = self.slots[index].value.clone();
                coercing.push(index);
                let mut siblings = Siblings::new(self, coercing);
                let value = behavior.call(&mut siblings, raw, name, &previous);
                coercing.pop();
                value
            }
        };
        self.slots[index].value = value;
        Ok(())
    }

    /// Sets several properties in the given order. Stops at the first unknown name.
    pub fn set_many<I, K, V>(&mut self, values: I) -> ModelResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in values {
            self.set(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// All current values keyed by property name.
    pub fn all(&self) -> Map<String, Value> {
        self.definition
            .properties()
            .iter()
            .zip(&self.slots)
            .map(|(p, s)| (p.name.clone(), s.value.clone()))
            .collect()
    }

    /// All current values with JSON properties decoded into structured values.
    pub fn to_json(&self) -> Map<String, Value> {
        self.definition
            .properties()
            .iter()
            .zip(&self.slots)
            .map(|(p, s)| {
                let value = match (p.builtin(), &s.value) {
                    (Some(crate::BuiltinType::Json), Value::String(text)) => {
                        serde_json::from_str(text).unwrap_or_else(|_| s.value.clone())
                    }
                    _ => s.value.clone(),
                };
                (p.name.clone(), value)
            })
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.slots.iter().any(Slot::is_dirty)
    }

    pub fn is_property_dirty(&self, name: &str) -> bool {
        self.definition
            .position(name)
            .is_some_and(|i| self.slots[i].is_dirty())
    }

    /// Dirty properties in definition order.
    pub fn diff(&self) -> Vec<PropertyDiff> {
        self.definition
            .properties()
            .iter()
            .zip(&self.slots)
            .filter(|(_, s)| s.is_dirty())
            .map(|(p, s)| PropertyDiff {
                key: p.name.clone(),
                before: s.persisted.clone(),
                after: s.value.clone(),
            })
            .collect()
    }

    /// Dirty properties restricted to `keys`.
    pub fn diff_of(&self, keys: &[&str]) -> Vec<PropertyDiff> {
        self.diff()
            .into_iter()
            .filter(|d| keys.contains(&d.key.as_str()))
            .collect()
    }

    /// Discards unsaved changes.
    pub fn reset(&mut self) {
        for (prop, slot) in self.definition.properties().iter().zip(self.slots.iter_mut()) {
            slot.value = slot
                .persisted
                .clone()
                .unwrap_or_else(|| prop.coerced_default());
        }
    }

    /// Marks every current value as persisted.
    ///
    /// Call after [`stored_fields`](Self::stored_fields) has been written: dirty
    /// properties now have a hash field.
    pub fn mark_clean(&mut self) {
        for slot in &mut self.slots {
            let dirty = slot.is_dirty();
            slot.in_store |= dirty;
            slot.persisted = Some(slot.value.clone());
        }
    }

    /// Forgets persisted state, as for an entity that was never saved.
    pub fn mark_new(&mut self) {
        for slot in &mut self.slots {
            slot.persisted = None;
            slot.in_store = false;
        }
    }

    /// Replaces all values with a stored hash and marks them clean.
    ///
    /// Fields the hash lacks take the property default. Unknown fields are ignored.
    pub fn load_stored(&mut self, fields: &HashMap<String, String>) {
        for (prop, slot) in self.definition.properties().iter().zip(self.slots.iter_mut()) {
            let stored = fields.get(&prop.name);
            slot.value = match stored {
                Some(stored) => decode_stored(prop, stored),
                None => prop.coerced_default(),
            };
            slot.persisted = Some(slot.value.clone());
            slot.in_store = stored.is_some();
        }
    }

    /// Hash fields to write for the dirty properties (all of them when `all`).
    pub fn stored_fields(&self, all: bool) -> Vec<(String, String)> {
        self.definition
            .properties()
            .iter()
            .zip(&self.slots)
            .filter(|(_, s)| all || s.is_dirty())
            .map(|(p, s)| (p.name.clone(), encode_field(p, &s.value)))
            .collect()
    }

    /// The hash fields the store should hold for the persisted values of the
    /// properties selected by `filter`.
    ///
    /// `None` marks a field the record lacks. Properties that were never
    /// persisted are skipped.
    pub fn persisted_fields<F>(&self, filter: F) -> Vec<(String, Option<String>)>
    where
        F: Fn(&PropertyDef) -> bool,
    {
        self.definition
            .properties()
            .iter()
            .zip(&self.slots)
            .filter(|(p, _)| filter(p))
            .filter_map(|(p, s)| {
                let persisted = s.persisted.as_ref()?;
                let text = s.in_store.then(|| encode_field(p, persisted));
                Some((p.name.clone(), text))
            })
            .collect()
    }

    /// Pairs each property definition with its current and persisted value.
    pub fn entries(&self) -> impl Iterator<Item = (&PropertyDef, &Value, Option<&Value>)> {
        self.definition
            .properties()
            .iter()
            .zip(&self.slots)
            .map(|(p, s)| (p, &s.value, s.persisted.as_ref()))
    }

    /// Validates every property, or only `only` when given.
    pub async fn validate(&self, only: Option<&str>) -> ModelResult<ValidationResult> {
        let mut errors = ValidationErrors::new();
        match only {
            Some(name) => {
                let index = self.position(name)?;
                let failed = self.failing_rules_at(index).await;
                errors.insert(name, failed);
            }
            None => {
                for index in 0..self.slots.len() {
                    let failed = self.failing_rules_at(index).await;
                    errors.insert(&self.definition.properties()[index].name, failed);
                }
            }
        }
        Ok(ValidationResult::from_errors(errors))
    }

    async fn failing_rules_at(&self, index: usize) -> Vec<String> {
        let prop = &self.definition.properties()[index];
        if prop.validations.is_empty() {
            return Vec::new();
        }
        let slot = &self.slots[index];
        let default = prop.coerced_default();
        failing_rules(&prop.validations, &slot.value, &default, slot.persisted.as_ref()).await
    }
}
