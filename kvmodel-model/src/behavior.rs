//! Behavior-typed properties.
//!
//! A behavior replaces built-in coercion with a caller-supplied function. It
//! receives explicit access to the other properties of the same entity, so it
//! can read them or derive additional values (for example a salt written next
//! to a hashed password).

use crate::error::ModelResult;
use crate::properties::Properties;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type BehaviorFn = dyn Fn(&mut Siblings<'_>, Value, &str, &Value) -> Value + Send + Sync;

/// A coercion function attached to a property.
#[derive(Clone)]
pub struct Behavior(Arc<BehaviorFn>);

impl Behavior {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Siblings<'_>, Value, &str, &Value) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn call(
        &self,
        siblings: &mut Siblings<'_>,
        value: Value,
        key: &str,
        previous: &Value,
    ) -> Value {
        (*self.0)(siblings, value, key, previous)
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Behavior(..)")
    }
}

/// Read/write access to the properties of the entity being coerced.
pub struct Siblings<'a> {
    properties: &'a mut Properties,
    coercing: &'a mut Vec<usize>,
}

impl<'a> Siblings<'a> {
    pub(crate) fn new(properties: &'a mut Properties, coercing: &'a mut Vec<usize>) -> Self {
        Self {
            properties,
            coercing,
        }
    }

    /// Current value of a sibling property.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Sets a sibling property through its own coercion.
    ///
    /// Fails with [`ModelError::CoercionCycle`](crate::ModelError::CoercionCycle)
    /// for the property currently being coerced, or any behavior further up
    /// the chain. The behavior's return value is what that property receives.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> ModelResult<()> {
        self.properties.set_within(name, value.into(), self.coercing)
    }
}
