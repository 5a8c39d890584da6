use kvmodel_model::{
    BuiltinType, IdStrategy, ModelDefinition, ModelError, PropertyDef, Validation,
};
use serde_json::json;

fn user() -> ModelDefinition {
    ModelDefinition::builder("user")
        .property(PropertyDef::string("name").unique())
        .property(PropertyDef::integer("number").index())
        .property(PropertyDef::float("ratio").index().no_score())
        .property(PropertyDef::boolean("active").default_value(true))
        .build()
        .unwrap()
}

// ── PropertyDef constructors ─────────────────────────────────────

#[test]
fn shorthand_types() {
    assert_eq!(PropertyDef::string("a").builtin(), Some(BuiltinType::String));
    assert_eq!(PropertyDef::boolean("a").builtin(), Some(BuiltinType::Boolean));
    assert_eq!(PropertyDef::integer("a").builtin(), Some(BuiltinType::Integer));
    assert_eq!(PropertyDef::float("a").builtin(), Some(BuiltinType::Float));
    assert_eq!(PropertyDef::timestamp("a").builtin(), Some(BuiltinType::Timestamp));
    assert_eq!(PropertyDef::json("a").builtin(), Some(BuiltinType::Json));
}

#[test]
fn defaults_are_zero_values() {
    assert_eq!(PropertyDef::string("a").default, json!(""));
    assert_eq!(PropertyDef::boolean("a").default, json!(false));
    assert_eq!(PropertyDef::integer("a").default, json!(0));
    assert_eq!(PropertyDef::json("a").default, json!("{}"));
}

#[test]
fn behavior_has_no_builtin() {
    let p = PropertyDef::behavior("visits", |_, v, _, _| v);
    assert!(p.builtin().is_none());
}

#[test]
fn coerced_default_applies_type() {
    let p = PropertyDef::integer("n").default_value("12abc");
    assert_eq!(p.coerced_default(), json!(12));
}

// ── Numeric indexability ─────────────────────────────────────────

#[test]
fn numeric_indexable_requires_index_and_numeric_type() {
    assert!(PropertyDef::integer("n").index().is_numeric_indexable());
    assert!(PropertyDef::timestamp("t").index().is_numeric_indexable());
    assert!(!PropertyDef::integer("n").is_numeric_indexable());
    assert!(!PropertyDef::string("s").index().is_numeric_indexable());
    assert!(!PropertyDef::float("f").index().no_score().is_numeric_indexable());
}

// ── ModelDefinition ──────────────────────────────────────────────

#[test]
fn properties_keep_declaration_order() {
    let def = user();
    let names: Vec<&str> = def.properties().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["name", "number", "ratio", "active"]);
}

#[test]
fn lookup_by_name() {
    let def = user();
    assert!(def.property("name").unwrap().unique);
    assert!(def.property("missing").is_none());
    assert!(matches!(
        def.require_property("missing"),
        Err(ModelError::UnknownProperty { .. })
    ));
}

#[test]
fn unique_and_indexed_iterators() {
    let def = user();
    let unique: Vec<&str> = def.unique_properties().map(|p| p.name.as_str()).collect();
    let indexed: Vec<&str> = def.indexed_properties().map(|p| p.name.as_str()).collect();
    assert_eq!(unique, vec!["name"]);
    assert_eq!(indexed, vec!["number", "ratio"]);
}

#[test]
fn default_id_strategy_is_random() {
    assert_eq!(user().id_strategy(), IdStrategy::Random);
    let def = ModelDefinition::builder("counter")
        .id_strategy(IdStrategy::Increment)
        .build()
        .unwrap();
    assert_eq!(def.id_strategy(), IdStrategy::Increment);
}

#[test]
fn publish_override() {
    assert_eq!(user().publish(), None);
    let def = ModelDefinition::builder("x").publish(true).build().unwrap();
    assert_eq!(def.publish(), Some(true));
}

// ── Version ──────────────────────────────────────────────────────

#[test]
fn version_is_stable_for_same_layout() {
    assert_eq!(user().version(), user().version());
    assert_eq!(user().version().len(), 64);
}

#[test]
fn version_changes_with_layout() {
    let other = ModelDefinition::builder("user")
        .property(PropertyDef::string("name"))
        .build()
        .unwrap();
    assert_ne!(user().version(), other.version());
}

#[test]
fn version_ignores_validations() {
    let a = ModelDefinition::builder("m")
        .property(PropertyDef::string("s"))
        .build()
        .unwrap();
    let b = ModelDefinition::builder("m")
        .property(PropertyDef::string("s").validate(Validation::not_empty()))
        .build()
        .unwrap();
    assert_eq!(a.version(), b.version());
}

// ── Invalid definitions ──────────────────────────────────────────

#[test]
fn rejects_duplicate_property() {
    let result = ModelDefinition::builder("m")
        .property(PropertyDef::string("a"))
        .property(PropertyDef::integer("a"))
        .build();
    assert!(matches!(result, Err(ModelError::InvalidDefinition(_))));
}

#[test]
fn rejects_separator_in_names() {
    assert!(ModelDefinition::builder("a:b").build().is_err());
    assert!(ModelDefinition::builder("m")
        .property(PropertyDef::string("x:y"))
        .build()
        .is_err());
}

#[test]
fn rejects_reserved_prefix() {
    assert!(ModelDefinition::builder("m")
        .property(PropertyDef::string("__meta_version"))
        .build()
        .is_err());
}

#[test]
fn rejects_empty_model_name() {
    assert!(ModelDefinition::builder("").build().is_err());
}
