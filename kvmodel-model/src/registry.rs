use crate::error::{ModelError, ModelResult};
use crate::schema::ModelDefinition;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Registered model definitions, shared by reference with the engine.
///
/// Re-registering a name replaces the definition for instances created
/// afterwards; existing instances keep the definition they were built with.
#[derive(Debug, Default)]
pub struct Registry {
    models: RwLock<HashMap<String, Arc<ModelDefinition>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a model definition.
    pub fn register(&self, definition: ModelDefinition) -> Arc<ModelDefinition> {
        let definition = Arc::new(definition);
        let mut models = self.models.write().unwrap_or_else(|e| e.into_inner());
        models.insert(definition.name().to_string(), Arc::clone(&definition));
        definition
    }

    /// Looks up a model definition.
    pub fn get(&self, name: &str) -> Option<Arc<ModelDefinition>> {
        let models = self.models.read().unwrap_or_else(|e| e.into_inner());
        models.get(name).cloned()
    }

    /// Looks up a model definition, failing with `UnknownModel`.
    pub fn require(&self, name: &str) -> ModelResult<Arc<ModelDefinition>> {
        self.get(name)
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        let models = self.models.read().unwrap_or_else(|e| e.into_inner());
        models.contains_key(name)
    }

    /// Names of all registered models, sorted.
    pub fn names(&self) -> Vec<String> {
        let models = self.models.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = models.keys().cloned().collect();
        names.sort();
        names
    }
}
