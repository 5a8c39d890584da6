//! Index maintenance.
//!
//! Computes the store operations that bring the unique, standard and scored
//! indexes of one entity from its persisted values to its current values.
//! Only changed properties produce operations, and every changed value
//! removes the id from the structure of the old value.

use kvmodel_model::{encode_stored, score_of, Properties};
use kvmodel_store::{Batch, KeySpace};
use serde_json::Value;

/// A unique claim inside a batch, kept to explain a rejected commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClaimRef {
    pub(crate) position: usize,
    pub(crate) property: String,
    pub(crate) value: String,
}

/// The key form of a unique value: stored text, lower-cased.
///
/// `None` for empty values, which are never claimed.
pub(crate) fn unique_value(value: &Value) -> Option<String> {
    let text = encode_stored(value);
    if text.is_empty() {
        None
    } else {
        Some(text.to_lowercase())
    }
}

/// Which indexed properties a [`guard_op`] covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Guard {
    /// Only properties whose index entries this save rewrites.
    Changed,
    /// Every unique or indexed property.
    All,
}

/// Appends an `Expect` op pinning the stored text of indexed properties to
/// their persisted values.
///
/// Index deltas are computed from those values, so if another writer changed
/// them the batch must not apply. Returns the op position, or `None` when
/// nothing needs pinning.
pub(crate) fn guard_op(
    keys: &KeySpace,
    properties: &Properties,
    id: &str,
    guard: Guard,
    batch: &mut Batch,
) -> Option<usize> {
    let fields = properties.persisted_fields(|prop| {
        (prop.unique || prop.index)
            && (guard == Guard::All || properties.is_property_dirty(&prop.name))
    });
    if fields.is_empty() {
        return None;
    }
    let model = properties.definition().name();
    Some(batch.expect(keys.hash(model, id), fields))
}

/// Appends index operations for a save of `properties` under `id`.
///
/// Returns the claims added so a conflict can be traced back to its property.
pub(crate) fn save_ops(
    keys: &KeySpace,
    properties: &Properties,
    id: &str,
    is_new: bool,
    batch: &mut Batch,
) -> Vec<ClaimRef> {
    let model = properties.definition().name();
    let mut claims = Vec::new();

    for (prop, current, persisted) in properties.entries() {
        let previous = if is_new { None } else { persisted };
        if previous == Some(current) {
            continue;
        }

        if prop.unique {
            let old = previous.and_then(unique_value);
            let new = unique_value(current);
            if old != new {
                if let Some(old) = old {
                    batch.release(keys.unique(model, &prop.name, &old), id);
                }
                if let Some(new) = new {
                    let position = batch.claim(keys.unique(model, &prop.name, &new), id);
                    claims.push(ClaimRef {
                        position,
                        property: prop.name.clone(),
                        value: encode_stored(current),
                    });
                }
            }
        }

        if prop.index {
            if let Some(old) = previous {
                batch.srem(keys.index(model, &prop.name, &encode_stored(old)), id);
            }
            batch.sadd(keys.index(model, &prop.name, &encode_stored(current)), id);
        }

        if prop.is_numeric_indexable() {
            let key = keys.scored_index(model, &prop.name);
            match score_of(current) {
                Some(score) => batch.zadd(key, score, id),
                None => batch.zrem(key, id),
            };
        }
    }

    if is_new {
        batch.sadd(keys.idset(model), id);
    }
    claims
}

/// Appends operations removing `id` from every index, using the persisted
/// values in `properties`.
pub(crate) fn remove_ops(keys: &KeySpace, properties: &Properties, id: &str, batch: &mut Batch) {
    let model = properties.definition().name();
    for (prop, current, persisted) in properties.entries() {
        let value = persisted.unwrap_or(current);
        if prop.unique
            && let Some(unique) = unique_value(value)
        {
            batch.release(keys.unique(model, &prop.name, &unique), id);
        }
        if prop.index {
            batch.srem(keys.index(model, &prop.name, &encode_stored(value)), id);
        }
        if prop.is_numeric_indexable() {
            batch.zrem(keys.scored_index(model, &prop.name), id);
        }
    }
    batch.srem(keys.idset(model), id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvmodel_model::{ModelDefinition, PropertyDef};
    use kvmodel_store::Op;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn user() -> Arc<ModelDefinition> {
        Arc::new(
            ModelDefinition::builder("User")
                .property(PropertyDef::string("name").unique())
                .property(PropertyDef::integer("number").index())
                .property(PropertyDef::string("bio"))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn guard_pins_changed_indexed_fields() {
        let keys = KeySpace::default();
        let mut props = Properties::new(user());
        let stored: HashMap<String, String> =
            [("name".to_string(), "ada".to_string()), ("number".to_string(), "3".to_string())]
                .into_iter()
                .collect();
        props.load_stored(&stored);
        props.set("number", 4).unwrap();
        props.set("bio", "hi").unwrap();

        let mut batch = Batch::new();
        assert_eq!(guard_op(&keys, &props, "1", Guard::Changed, &mut batch), Some(0));
        assert_eq!(
            batch.ops()[0],
            Op::Expect {
                key: "kvmodel:hash:User:1".into(),
                fields: vec![("number".into(), Some("3".into()))],
            }
        );

        let mut batch = Batch::new();
        guard_op(&keys, &props, "1", Guard::All, &mut batch);
        let Op::Expect { fields, .. } = &batch.ops()[0] else {
            panic!("expected a guard");
        };
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn nothing_to_guard_for_new_or_unindexed_changes() {
        let keys = KeySpace::default();
        let mut props = Properties::new(user());
        props.set("name", "ada").unwrap();
        let mut batch = Batch::new();
        assert_eq!(guard_op(&keys, &props, "1", Guard::All, &mut batch), None);

        props.mark_clean();
        props.set("bio", "hi").unwrap();
        assert_eq!(guard_op(&keys, &props, "1", Guard::Changed, &mut batch), None);
        assert!(batch.is_empty());
    }

    #[test]
    fn unique_values_are_case_folded() {
        assert_eq!(unique_value(&Value::from("Ada")).as_deref(), Some("ada"));
        assert_eq!(unique_value(&Value::from("")), None);
    }

    #[test]
    fn new_entity_indexes_everything() {
        let keys = KeySpace::default();
        let mut props = Properties::new(user());
        props.set("name", "Ada").unwrap();
        props.set("number", 3).unwrap();
        let mut batch = Batch::new();
        let claims = save_ops(&keys, &props, "1", true, &mut batch);

        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].value, "Ada");
        assert!(batch.ops().contains(&Op::SAdd {
            key: "kvmodel:index:User:number:3".into(),
            member: "1".into(),
        }));
        assert!(batch.ops().contains(&Op::ZAdd {
            key: "kvmodel:scoredindex:User:number".into(),
            score: 3.0,
            member: "1".into(),
        }));
        assert!(batch.ops().contains(&Op::SAdd {
            key: "kvmodel:idsets:User".into(),
            member: "1".into(),
        }));
    }

    #[test]
    fn unchanged_properties_produce_nothing() {
        let keys = KeySpace::default();
        let mut props = Properties::new(user());
        let stored: HashMap<String, String> =
            [("name".to_string(), "ada".to_string()), ("number".to_string(), "3".to_string())]
                .into_iter()
                .collect();
        props.load_stored(&stored);
        props.set("bio", "hi").unwrap();
        let mut batch = Batch::new();
        save_ops(&keys, &props, "1", false, &mut batch);
        assert!(batch.is_empty());
    }

    #[test]
    fn changed_value_leaves_old_index() {
        let keys = KeySpace::default();
        let mut props = Properties::new(user());
        let stored: HashMap<String, String> =
            [("name".to_string(), "ada".to_string()), ("number".to_string(), "3".to_string())]
                .into_iter()
                .collect();
        props.load_stored(&stored);
        props.set("number", 4).unwrap();
        props.set("name", "Grace").unwrap();
        let mut batch = Batch::new();
        save_ops(&keys, &props, "1", false, &mut batch);

        assert!(batch.ops().contains(&Op::SRem {
            key: "kvmodel:index:User:number:3".into(),
            member: "1".into(),
        }));
        assert!(batch.ops().contains(&Op::Release {
            key: "kvmodel:uniques:User:name:ada".into(),
            owner: "1".into(),
        }));
        assert!(batch.ops().contains(&Op::Claim {
            key: "kvmodel:uniques:User:name:grace".into(),
            owner: "1".into(),
        }));
    }
}
