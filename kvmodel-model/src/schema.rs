use crate::behavior::{Behavior, Siblings};
use crate::coerce::{coerce, zero_value};
use crate::error::{ModelError, ModelResult};
use crate::validation::Validation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// The built-in semantic types a property value can be coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinType {
    String,
    Boolean,
    Integer,
    Float,
    /// Epoch milliseconds.
    Timestamp,
    /// Opaque structured value kept in its canonical serialized form.
    Json,
}

impl BuiltinType {
    /// Returns true for types whose values can live in a scored index.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, BuiltinType::Integer | BuiltinType::Float | BuiltinType::Timestamp)
    }

    /// Stable tag used in the model version hash.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            BuiltinType::String => "string",
            BuiltinType::Boolean => "boolean",
            BuiltinType::Integer => "integer",
            BuiltinType::Float => "float",
            BuiltinType::Timestamp => "timestamp",
            BuiltinType::Json => "json",
        }
    }
}

/// How a property turns raw input into its stored value.
#[derive(Debug, Clone)]
pub enum PropertyType {
    /// Coerced by a built-in type.
    Builtin(BuiltinType),
    /// Coerced by a caller-supplied function with access to sibling properties.
    Behavior(Behavior),
}

/// How ids are assigned to entities on first save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Random opaque token.
    #[default]
    Random,
    /// Atomically incremented counter scoped to the model.
    Increment,
}

/// Declaration of one property of a model.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyType,
    pub default: Value,
    /// At most one entity may hold a given value.
    pub unique: bool,
    /// Maintain a value → ids index for equality lookups.
    pub index: bool,
    /// Opt a numeric indexed property out of the scored index.
    pub no_score: bool,
    pub validations: Vec<Validation>,
}

impl PropertyDef {
    /// A property of a built-in type, defaulting to that type's zero value.
    pub fn new(name: &str, ty: BuiltinType) -> Self {
        Self {
            name: name.into(),
            kind: PropertyType::Builtin(ty),
            default: zero_value(ty),
            unique: false,
            index: false,
            no_score: false,
            validations: Vec::new(),
        }
    }

    /// Shorthand for a string property.
    pub fn string(name: &str) -> Self {
        Self::new(name, BuiltinType::String)
    }

    /// Shorthand for a boolean property.
    pub fn boolean(name: &str) -> Self {
        Self::new(name, BuiltinType::Boolean)
    }

    /// Shorthand for an integer property.
    pub fn integer(name: &str) -> Self {
        Self::new(name, BuiltinType::Integer)
    }

    /// Shorthand for a float property.
    pub fn float(name: &str) -> Self {
        Self::new(name, BuiltinType::Float)
    }

    /// Shorthand for a timestamp property.
    pub fn timestamp(name: &str) -> Self {
        Self::new(name, BuiltinType::Timestamp)
    }

    /// Shorthand for an opaque structured (JSON) property.
    pub fn json(name: &str) -> Self {
        Self::new(name, BuiltinType::Json)
    }

    /// A property coerced by a behavior function.
    ///
    /// The function receives sibling access, the new raw value, the property
    /// name and the previous coerced value, and returns the value to store.
    pub fn behavior<F>(name: &str, f: F) -> Self
    where
        F: Fn(&mut Siblings<'_>, Value, &str, &Value) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: PropertyType::Behavior(Behavior::new(f)),
            default: Value::String(String::new()),
            unique: false,
            index: false,
            no_score: false,
            validations: Vec::new(),
        }
    }

    /// Sets the default value.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Marks the property unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the property indexed.
    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    /// Keeps a numeric indexed property out of the scored index.
    pub fn no_score(mut self) -> Self {
        self.no_score = true;
        self
    }

    /// Appends a validation rule.
    pub fn validate(mut self, rule: Validation) -> Self {
        self.validations.push(rule);
        self
    }

    /// Returns the built-in type, if this is not a behavior property.
    #[must_use]
    pub fn builtin(&self) -> Option<BuiltinType> {
        match &self.kind {
            PropertyType::Builtin(ty) => Some(*ty),
            PropertyType::Behavior(_) => None,
        }
    }

    /// True when the property is kept in a scored index.
    #[must_use]
    pub fn is_numeric_indexable(&self) -> bool {
        self.index && !self.no_score && self.builtin().is_some_and(|ty| ty.is_numeric())
    }

    /// The default value as the property's type sees it.
    #[must_use]
    pub fn coerced_default(&self) -> Value {
        match &self.kind {
            PropertyType::Builtin(ty) => coerce(*ty, &self.default),
            PropertyType::Behavior(_) => self.default.clone(),
        }
    }

    fn layout_tag(&self) -> String {
        let ty = self.builtin().map_or("behavior", |ty| ty.tag());
        format!(
            "{}:{}:{}:{}:{};",
            self.name, ty, self.unique as u8, self.index as u8, self.no_score as u8
        )
    }
}

/// A registered model: ordered property declarations plus id strategy.
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    name: String,
    properties: Vec<PropertyDef>,
    id_strategy: IdStrategy,
    publish: Option<bool>,
    version: String,
}

impl ModelDefinition {
    /// Starts a definition for the named model.
    pub fn builder(name: &str) -> ModelDefinitionBuilder {
        ModelDefinitionBuilder {
            name: name.into(),
            properties: Vec::new(),
            id_strategy: IdStrategy::default(),
            publish: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    pub fn id_strategy(&self) -> IdStrategy {
        self.id_strategy
    }

    /// Per-model override of the engine's publish setting.
    pub fn publish(&self) -> Option<bool> {
        self.publish
    }

    /// Hex SHA-256 of the property layout, stored alongside every record.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Looks up a property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Looks up a property, failing with `UnknownProperty`.
    pub fn require_property(&self, name: &str) -> ModelResult<&PropertyDef> {
        self.property(name).ok_or_else(|| ModelError::UnknownProperty {
            model: self.name.clone(),
            property: name.to_string(),
        })
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    /// Properties carrying a unique constraint.
    pub fn unique_properties(&self) -> impl Iterator<Item = &PropertyDef> {
        self.properties.iter().filter(|p| p.unique)
    }

    /// Properties carrying a standard index.
    pub fn indexed_properties(&self) -> impl Iterator<Item = &PropertyDef> {
        self.properties.iter().filter(|p| p.index)
    }
}

/// Builder for [`ModelDefinition`].
pub struct ModelDefinitionBuilder {
    name: String,
    properties: Vec<PropertyDef>,
    id_strategy: IdStrategy,
    publish: Option<bool>,
}

impl ModelDefinitionBuilder {
    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    pub fn publish(mut self, publish: bool) -> Self {
        self.publish = Some(publish);
        self
    }

    /// Validates names and computes the layout version.
    pub fn build(self) -> ModelResult<ModelDefinition> {
        check_name("model", &self.name)?;

        let mut seen = std::collections::HashSet::new();
        for prop in &self.properties {
            check_name("property", &prop.name)?;
            if prop.name.starts_with("__") {
                return Err(ModelError::InvalidDefinition(format!(
                    "property name {} uses the reserved __ prefix",
                    prop.name
                )));
            }
            if !seen.insert(prop.name.as_str()) {
                return Err(ModelError::InvalidDefinition(format!(
                    "duplicate property {} on model {}",
                    prop.name, self.name
                )));
            }
        }

        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        for prop in &self.properties {
            hasher.update(prop.layout_tag().as_bytes());
        }
        let version = hex::encode(hasher.finalize());

        Ok(ModelDefinition {
            name: self.name,
            properties: self.properties,
            id_strategy: self.id_strategy,
            publish: self.publish,
            version,
        })
    }
}

fn check_name(what: &str, name: &str) -> ModelResult<()> {
    if name.is_empty() || name.contains(':') {
        return Err(ModelError::InvalidDefinition(format!(
            "{what} name {name:?} must be non-empty and must not contain ':'"
        )));
    }
    Ok(())
}
