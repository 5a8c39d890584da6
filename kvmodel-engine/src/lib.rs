//! Persistence engine for kvmodel.
//!
//! Maps typed entities onto a key-value store: each entity is a hash, and
//! unique, standard and scored indexes, relations and change events live in
//! namespaced keys beside it.
//!
//! # Architecture
//!
//! - **Entity**: one model instance with dirty tracking and queued relation changes
//! - **Engine**: save, load and remove, each committed as one atomic batch
//! - **Index**: minimal index deltas between persisted and current values
//! - **Relation**: named, optionally scored links with inverse bookkeeping
//! - **Find**: index-backed queries with early exit on empty criteria
//! - **Notify**: per-model, per-kind change event subscriptions
//!
//! # Example
//!
//! ```
//! use kvmodel_engine::{Engine, EngineConfig, Query, RangeQuery, SaveOptions};
//! use kvmodel_model::{ModelDefinition, PropertyDef};
//!
//! # tokio_test::block_on(async {
//! let engine = Engine::in_memory(EngineConfig::default());
//! engine.register(
//!     ModelDefinition::builder("User")
//!         .property(PropertyDef::string("name").unique())
//!         .property(PropertyDef::integer("number").index())
//!         .build()
//!         .unwrap(),
//! );
//!
//! let mut user = engine.create("User").unwrap();
//! user.set("name", "a").unwrap();
//! user.set("number", 3).unwrap();
//! engine.save(&mut user, SaveOptions::default()).await.unwrap();
//!
//! let ids = engine
//!     .find("User", &Query::new().range("number", RangeQuery::new().min(2.0)))
//!     .await
//!     .unwrap();
//! assert_eq!(ids.len(), 1);
//! # });
//! ```

mod config;
mod engine;
mod entity;
mod error;
mod find;
mod index;
mod notify;
mod relation;

pub use config::{EngineConfig, SaveOptions};
pub use engine::{Engine, SaveReport, META_VERSION_FIELD};
pub use entity::Entity;
pub use error::{EngineError, EngineResult, LinkError};
pub use find::{Criterion, Query, RangeQuery, SortDirection, SortOptions};
pub use notify::Subscription;
pub use relation::{inverse_name, DEFAULT_RELATION};

pub use kvmodel_store::ScoreRange;
pub use kvmodel_types::{ChangeEvent, EntityId, EventKind, EventPayload};
