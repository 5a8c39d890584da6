mod common;

use common::{engine, save_user};
use kvmodel_engine::{EngineError, EntityId, Query, SaveOptions, META_VERSION_FIELD};
use kvmodel_model::{ModelDefinition, PropertyDef};
use kvmodel_store::{Batch, Store, StoreError};
use pretty_assertions::assert_eq;
use serde_json::json;

// ── Create & load ───────────────────────────────────────────────

#[tokio::test]
async fn save_assigns_incrementing_ids() {
    let (engine, _) = engine();
    let a = save_user(&engine, "a", 1).await;
    let b = save_user(&engine, "b", 2).await;
    assert_eq!(a.id().unwrap().as_str(), "1");
    assert_eq!(b.id().unwrap().as_str(), "2");
}

#[tokio::test]
async fn random_ids_are_opaque_and_distinct() {
    let (engine, _) = engine();
    let mut first = engine.create("Post").unwrap();
    let mut second = engine.create("Post").unwrap();
    engine.save(&mut first, SaveOptions::default()).await.unwrap();
    engine.save(&mut second, SaveOptions::default()).await.unwrap();
    assert_ne!(first.id(), second.id());
    assert!(!first.id().unwrap().as_str().contains(':'));
}

#[tokio::test]
async fn save_marks_entity_clean() {
    let (engine, _) = engine();
    let mut user = engine.create("User").unwrap();
    user.set("name", "ada").unwrap();
    assert!(user.is_dirty());

    let report = engine.save(&mut user, SaveOptions::default()).await.unwrap();
    assert!(report.created);
    assert!(!user.is_dirty());
    assert!(user.diff().is_empty());
}

#[tokio::test]
async fn load_round_trips_typed_values() {
    let (engine, _) = engine();
    let mut user = engine.create("User").unwrap();
    user.set_many([
        ("name", json!("ada")),
        ("number", json!("42")),
        ("settings", json!({"theme": "dark"})),
    ])
    .unwrap();
    engine.save(&mut user, SaveOptions::default()).await.unwrap();

    let loaded = engine.load("User", user.id().unwrap()).await.unwrap();
    assert_eq!(loaded.get("number"), Some(&json!(42)));
    assert_eq!(loaded.all_properties(), user.all_properties());
    assert!(!loaded.is_dirty());
    assert_eq!(loaded.to_json()["settings"], json!({"theme": "dark"}));
    assert_eq!(loaded.to_json()["id"], json!("1"));
}

#[tokio::test]
async fn load_missing_id_is_not_found() {
    let (engine, _) = engine();
    let err = engine
        .load("User", &EntityId::from_counter(99))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { ref model, ref id } if model == "User" && id == "99"));
}

#[tokio::test]
async fn load_unknown_model_fails() {
    let (engine, _) = engine();
    let err = engine.load("Ghost", &EntityId::from_counter(1)).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownModel(name) if name == "Ghost"));
}

#[tokio::test]
async fn meta_fields_are_stored_but_not_exposed() {
    let (engine, store) = engine();
    let user = save_user(&engine, "ada", 1).await;
    let hash = store.hgetall("kvmodel:hash:User:1").await.unwrap();
    assert_eq!(
        hash.get(META_VERSION_FIELD).map(String::as_str),
        Some(user.definition().version())
    );

    let loaded = engine.load("User", user.id().unwrap()).await.unwrap();
    assert!(loaded.to_json().get(META_VERSION_FIELD).is_none());
}

#[tokio::test]
async fn load_tolerates_other_model_version() {
    let (engine, store) = engine();
    let mut batch = Batch::new();
    batch.hset(
        "kvmodel:hash:User:7",
        vec![
            ("name".into(), "old".into()),
            (META_VERSION_FIELD.into(), "0000".into()),
        ],
    );
    store.exec(batch).await.unwrap();

    let loaded = engine.load("User", &EntityId::from_counter(7)).await.unwrap();
    assert_eq!(loaded.get("name"), Some(&json!("old")));
    assert_eq!(loaded.get("number"), Some(&json!(0)));
}

// ── Updates ─────────────────────────────────────────────────────

#[tokio::test]
async fn update_writes_only_dirty_fields() {
    let (engine, store) = engine();
    let mut user = save_user(&engine, "ada", 1).await;
    user.set("number", 2).unwrap();
    assert_eq!(user.diff().len(), 1);

    let report = engine.save(&mut user, SaveOptions::default()).await.unwrap();
    assert!(!report.created);
    let hash = store.hgetall("kvmodel:hash:User:1").await.unwrap();
    assert_eq!(hash["number"], "2");
    assert_eq!(hash["name"], "ada");
}

#[tokio::test]
async fn saving_clean_entity_is_a_no_op() {
    let (engine, store) = engine();
    let mut user = save_user(&engine, "ada", 1).await;
    let keys_before = store.keys_with_prefix("kvmodel");

    let report = engine.save(&mut user, SaveOptions::default()).await.unwrap();
    assert!(report.unchanged);
    assert_eq!(store.keys_with_prefix("kvmodel"), keys_before);
}

#[tokio::test]
async fn reset_restores_persisted_values() {
    let (engine, _) = engine();
    let mut user = save_user(&engine, "ada", 1).await;
    user.set("number", 9).unwrap();
    user.reset();
    assert_eq!(user.get("number"), Some(&json!(1)));
    assert!(!user.is_dirty());
}

// ── Validation ──────────────────────────────────────────────────

#[tokio::test]
async fn invalid_entity_is_not_written() {
    let (engine, store) = engine();
    let mut user = engine.create("User").unwrap();
    user.set("number", 3).unwrap();

    let err = engine.save(&mut user, SaveOptions::default()).await.unwrap_err();
    let EngineError::Validation(errors) = err else {
        panic!("expected validation failure, got {err:?}");
    };
    assert_eq!(errors.get("name"), Some(&["notEmpty".to_string()][..]));
    assert!(store.keys_with_prefix("kvmodel:hash").is_empty());
    assert!(user.is_new());
}

#[tokio::test]
async fn skip_validation_commits_anyway() {
    let (engine, _) = engine();
    let mut user = engine.create("User").unwrap();
    engine
        .save(&mut user, SaveOptions::default().skip_validation())
        .await
        .unwrap();
    assert!(!user.is_new());
}

#[tokio::test]
async fn validating_twice_gives_same_result() {
    let (engine, _) = engine();
    let user = engine.create("User").unwrap();
    let first = user.validate(None).await.unwrap();
    let second = user.validate(None).await.unwrap();
    assert_eq!(first, second);
    assert!(!user.validate(Some("number")).await.unwrap().errors().is_some());
}

// ── Unique constraints ──────────────────────────────────────────

#[tokio::test]
async fn duplicate_unique_value_is_rejected() {
    let (engine, store) = engine();
    let b = save_user(&engine, "taken", 1).await;

    let mut a = engine.create("User").unwrap();
    a.set("name", "Taken").unwrap();
    let err = engine.save(&mut a, SaveOptions::default()).await.unwrap_err();

    match err {
        EngineError::UniqueConstraint { model, property, value } => {
            assert_eq!(model, "User");
            assert_eq!(property, "name");
            assert_eq!(value, "Taken");
        }
        other => panic!("expected unique constraint failure, got {other:?}"),
    }
    assert!(a.is_new());
    assert!(a.is_dirty());
    assert_eq!(
        store.get("kvmodel:uniques:User:name:taken").await.unwrap().as_deref(),
        Some(b.id().unwrap().as_str())
    );
    assert!(store.keys_with_prefix("kvmodel:hash").len() == 1);
}

#[tokio::test]
async fn changing_unique_value_releases_the_old_one() {
    let (engine, store) = engine();
    let mut user = save_user(&engine, "first", 1).await;
    user.set("name", "second").unwrap();
    engine.save(&mut user, SaveOptions::default()).await.unwrap();

    assert_eq!(store.get("kvmodel:uniques:User:name:first").await.unwrap(), None);
    let reuse = save_user(&engine, "first", 2).await;
    assert!(!reuse.is_new());
}

#[tokio::test]
async fn concurrent_claims_admit_exactly_one() {
    let (engine, _) = engine();
    let mut a = engine.create("User").unwrap();
    let mut b = engine.create("User").unwrap();
    a.set("name", "race").unwrap();
    b.set("name", "race").unwrap();

    let (ra, rb) = tokio::join!(
        engine.save(&mut a, SaveOptions::default()),
        engine.save(&mut b, SaveOptions::default())
    );
    assert_eq!(usize::from(ra.is_ok()) + usize::from(rb.is_ok()), 1);
    let loser = if ra.is_err() { ra } else { rb };
    assert!(matches!(loser, Err(EngineError::UniqueConstraint { .. })));
}

// ── Concurrent updates ──────────────────────────────────────────

#[tokio::test]
async fn update_from_outdated_copy_is_rejected() {
    let (engine, _) = engine();
    let user = save_user(&engine, "a", 3).await;
    let id = user.id().unwrap().clone();
    let mut first = engine.load("User", &id).await.unwrap();
    let mut second = engine.load("User", &id).await.unwrap();

    first.set_many([("name", json!("x")), ("number", json!(4))]).unwrap();
    engine.save(&mut first, SaveOptions::default()).await.unwrap();

    second.set_many([("name", json!("y")), ("number", json!(5))]).unwrap();
    let err = engine.save(&mut second, SaveOptions::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::Stale { .. }));
    assert!(err.is_recoverable());
    assert!(second.is_property_dirty("number"));

    let by_number = |n: i64| Query::new().eq("number", n);
    assert_eq!(engine.find("User", &by_number(4)).await.unwrap(), vec![id.clone()]);
    assert!(engine.find("User", &by_number(5)).await.unwrap().is_empty());

    engine.load_into(&mut second, &id).await.unwrap();
    second.set_many([("name", json!("y")), ("number", json!(5))]).unwrap();
    engine.save(&mut second, SaveOptions::default()).await.unwrap();

    assert!(engine.find("User", &by_number(4)).await.unwrap().is_empty());
    assert_eq!(engine.find("User", &by_number(5)).await.unwrap(), vec![id.clone()]);
    assert!(engine.find("User", &Query::new().eq("name", "x")).await.unwrap().is_empty());
    let reuse = save_user(&engine, "x", 9).await;
    assert!(!reuse.is_new());
}

#[tokio::test]
async fn unindexed_update_from_outdated_copy_wins() {
    let (engine, _) = engine();
    let user = save_user(&engine, "ada", 3).await;
    let id = user.id().unwrap().clone();
    let mut first = engine.load("User", &id).await.unwrap();
    let mut second = engine.load("User", &id).await.unwrap();

    first.set("number", 4).unwrap();
    engine.save(&mut first, SaveOptions::default()).await.unwrap();
    second.set("settings", json!({"theme": "dark"})).unwrap();
    engine.save(&mut second, SaveOptions::default()).await.unwrap();

    let loaded = engine.load("User", &id).await.unwrap();
    assert_eq!(loaded.get("number"), Some(&json!(4)));
    assert_eq!(loaded.to_json()["settings"], json!({"theme": "dark"}));
}

// ── Behavior properties ─────────────────────────────────────────

#[tokio::test]
async fn behavior_values_keep_their_type_through_the_store() {
    let (engine, _) = engine();
    engine.register(
        ModelDefinition::builder("Address")
            .property(PropertyDef::behavior("zip", |_, value, _, _| value))
            .property(PropertyDef::behavior("flag", |_, value, _, _| value))
            .build()
            .unwrap(),
    );
    let mut address = engine.create("Address").unwrap();
    address.set("zip", "02134").unwrap();
    address.set("flag", "true").unwrap();
    engine.save(&mut address, SaveOptions::default()).await.unwrap();

    let loaded = engine.load("Address", address.id().unwrap()).await.unwrap();
    assert_eq!(loaded.get("zip"), Some(&json!("02134")));
    assert_eq!(loaded.get("flag"), Some(&json!("true")));
    assert!(!loaded.is_dirty());
}

// ── Store failures ──────────────────────────────────────────────

#[tokio::test]
async fn store_failure_leaves_entity_dirty() {
    let (engine, store) = engine();
    let mut user = save_user(&engine, "ada", 1).await;
    user.set("number", 5).unwrap();

    store.set_unavailable(true);
    let err = engine.save(&mut user, SaveOptions::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::Connection(_))));
    assert!(!err.is_recoverable());
    assert!(user.is_property_dirty("number"));

    store.set_unavailable(false);
    engine.save(&mut user, SaveOptions::default()).await.unwrap();
    let loaded = engine.load("User", user.id().unwrap()).await.unwrap();
    assert_eq!(loaded.get("number"), Some(&json!(5)));
}

#[tokio::test]
async fn failed_first_save_keeps_entity_new() {
    let (engine, store) = engine();
    let mut post = engine.create("Post").unwrap();
    store.set_unavailable(true);
    assert!(engine.save(&mut post, SaveOptions::default()).await.is_err());
    assert!(post.is_new());
}
