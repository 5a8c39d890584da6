//! Shared test helpers for engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use kvmodel_engine::{Engine, EngineConfig, Entity, SaveOptions};
use kvmodel_model::{IdStrategy, ModelDefinition, PropertyDef, Registry, Validation};
use kvmodel_store::{Batch, BatchReport, MemoryStore, ScoreRange, Store, StoreResult};
use std::collections::HashMap;
use std::sync::{Arc, Once};
use tokio::sync::broadcast;

static TRACING: Once = Once::new();

/// Installs a fmt subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// `User { name: string unique, number: integer indexed, city: string indexed }`.
pub fn user_model() -> ModelDefinition {
    ModelDefinition::builder("User")
        .property(
            PropertyDef::string("name")
                .unique()
                .validate(Validation::not_empty()),
        )
        .property(PropertyDef::integer("number").index())
        .property(PropertyDef::string("city").index())
        .property(PropertyDef::integer("score").index())
        .property(PropertyDef::json("settings"))
        .id_strategy(IdStrategy::Increment)
        .build()
        .unwrap()
}

pub fn post_model() -> ModelDefinition {
    ModelDefinition::builder("Post")
        .property(PropertyDef::string("title"))
        .property(PropertyDef::timestamp("published").index())
        .build()
        .unwrap()
}

/// A memory-backed engine with `User` and `Post` registered.
pub fn engine_with(config: EngineConfig) -> (Engine, Arc<MemoryStore>) {
    init_tracing();
    let store = Arc::new(MemoryStore::with_channel_capacity(config.channel_capacity));
    let engine = Engine::new(store.clone(), Arc::new(Registry::new()), config);
    engine.register(user_model());
    engine.register(post_model());
    (engine, store)
}

pub fn engine() -> (Engine, Arc<MemoryStore>) {
    engine_with(EngineConfig::default())
}

/// Saves a new user with the given name and number.
pub async fn save_user(engine: &Engine, name: &str, number: i64) -> Entity {
    let mut user = engine.create("User").unwrap();
    user.set("name", name).unwrap();
    user.set("number", number).unwrap();
    engine.save(&mut user, SaveOptions::default()).await.unwrap();
    user
}

/// A [`MemoryStore`] that yields to the scheduler before every call, so
/// operations joined on one task interleave between their reads and commits.
pub struct YieldingStore(pub Arc<MemoryStore>);

#[async_trait]
impl Store for YieldingStore {
    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        tokio::task::yield_now().await;
        self.0.hgetall(key).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        tokio::task::yield_now().await;
        self.0.get(key).await
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        tokio::task::yield_now().await;
        self.0.smembers(key).await
    }

    async fn scard(&self, key: &str) -> StoreResult<usize> {
        tokio::task::yield_now().await;
        self.0.scard(key).await
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        tokio::task::yield_now().await;
        self.0.sismember(key, member).await
    }

    async fn zrange_by_score(&self, key: &str, range: &ScoreRange) -> StoreResult<Vec<String>> {
        tokio::task::yield_now().await;
        self.0.zrange_by_score(key, range).await
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> StoreResult<usize> {
        tokio::task::yield_now().await;
        self.0.zcount(key, min, max).await
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        tokio::task::yield_now().await;
        self.0.zscore(key, member).await
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        tokio::task::yield_now().await;
        self.0.incr(key).await
    }

    async fn exec(&self, batch: Batch) -> StoreResult<BatchReport> {
        tokio::task::yield_now().await;
        self.0.exec(batch).await
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<broadcast::Receiver<String>> {
        self.0.subscribe(channel).await
    }
}

/// Like [`engine_with`], but every store call yields first.
pub fn yielding_engine(config: EngineConfig) -> (Engine, Arc<MemoryStore>) {
    init_tracing();
    let memory = Arc::new(MemoryStore::with_channel_capacity(config.channel_capacity));
    let store = Arc::new(YieldingStore(Arc::clone(&memory)));
    let engine = Engine::new(store, Arc::new(Registry::new()), config);
    engine.register(user_model());
    engine.register(post_model());
    (engine, memory)
}
