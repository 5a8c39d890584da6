//! The persistence engine.
//!
//! A save runs `validate → assign id → build batch → commit`. The batch holds
//! the hash write, index deltas, unique claims, relation changes and event
//! publications, and is applied all-or-nothing by the store. Updates and
//! removals also carry a guard on the indexed values the deltas were computed
//! from, so a concurrent writer makes the batch fail instead of leaving stale
//! index entries. The entity is
//! only marked clean after the store reports the batch committed, so any
//! failure leaves it dirty and safe to retry.

use crate::config::{EngineConfig, SaveOptions};
use crate::entity::Entity;
use crate::error::{EngineError, EngineResult, LinkError};
use crate::index::{self, ClaimRef, Guard};
use crate::notify::publish_op;
use crate::relation;
use kvmodel_model::{IdStrategy, ModelDefinition, Properties, Registry};
use kvmodel_store::{Batch, BatchReport, KeySpace, MemoryStore, Store};
use kvmodel_types::{EntityId, EventPayload};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hash field carrying the model layout version of a record.
pub const META_VERSION_FIELD: &str = "__meta_version";

/// Outcome of a successful save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    /// The entity was inserted rather than updated.
    pub created: bool,
    /// Nothing was dirty, so nothing was written.
    pub unchanged: bool,
    /// Relations skipped under `continue_on_link_error`.
    pub link_errors: Vec<LinkError>,
}

/// Persists entities of registered models in a [`Store`].
///
/// Cheap to clone; clones share the store and the registry. The engine holds
/// no lock across operations.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
    config: EngineConfig,
    keys: KeySpace,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("models", &self.registry.names())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, registry: Arc<Registry>, config: EngineConfig) -> Self {
        let keys = KeySpace::new(config.prefix.clone());
        Self {
            store,
            registry,
            config,
            keys,
        }
    }

    /// An engine backed by a fresh [`MemoryStore`] and an empty registry.
    pub fn in_memory(config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::with_channel_capacity(config.channel_capacity));
        Self::new(store, Arc::new(Registry::new()), config)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Registers (or replaces) a model definition.
    pub fn register(&self, definition: ModelDefinition) -> Arc<ModelDefinition> {
        info!(model = definition.name(), version = definition.version(), "registered model");
        self.registry.register(definition)
    }

    /// An empty instance of `model`.
    pub fn create(&self, model: &str) -> EngineResult<Entity> {
        Ok(Entity::new(self.registry.require(model)?))
    }

    fn publishes(&self, definition: &ModelDefinition) -> bool {
        definition.publish().unwrap_or(self.config.publish)
    }

    // ── Save ─────────────────────────────────────────────────────

    /// Validates and commits the entity's changes in one atomic batch.
    ///
    /// Saving an existing entity with no dirty properties and no queued
    /// relation changes writes nothing and publishes nothing.
    pub async fn save(&self, entity: &mut Entity, options: SaveOptions) -> EngineResult<SaveReport> {
        let definition = Arc::clone(entity.definition());
        let model = definition.name();
        let is_new = entity.is_new();

        if !is_new && !entity.is_dirty() && entity.relations.is_empty() {
            debug!(%model, id = ?entity.id, "save skipped, nothing changed");
            return Ok(SaveReport {
                unchanged: true,
                ..SaveReport::default()
            });
        }

        if !options.skip_validation
            && let Err(errors) = entity.validate(None).await?.into_result()
        {
            debug!(%model, %errors, "validation failed");
            return Err(EngineError::Validation(errors));
        }

        let id = match &entity.id {
            Some(id) => id.clone(),
            None => self.generate_id(&definition).await?,
        };

        let mut relations = relation::plan(&self.keys, model, &id, &entity.relations)?;
        let link_errors = std::mem::take(&mut relations.errors);
        if !link_errors.is_empty() {
            let proceed = options
                .continue_on_link_error
                .unwrap_or(self.config.continue_on_link_error);
            if !proceed {
                warn!(%model, %id, count = link_errors.len(), "save aborted by relation errors");
                return Err(EngineError::Relation(link_errors));
            }
            for err in &link_errors {
                warn!(%model, %id, error = %err, "skipping relation");
            }
        }

        let mut batch = Batch::new();
        let guard = if is_new {
            None
        } else {
            index::guard_op(&self.keys, &entity.properties, id.as_str(), Guard::Changed, &mut batch)
        };
        let fields = entity.properties.stored_fields(is_new);
        let changed = !fields.is_empty();
        if changed {
            let mut fields = fields;
            fields.push((META_VERSION_FIELD.to_string(), definition.version().to_string()));
            batch.hset(self.keys.hash(model, id.as_str()), fields);
        }
        let claims = index::save_ops(&self.keys, &entity.properties, id.as_str(), is_new, &mut batch);
        batch.extend(relations.batch);

        if self.publishes(&definition) && !options.silent {
            if is_new {
                let properties = entity.properties.to_json();
                publish_op(&self.keys, model, &id, EventPayload::Created { properties }, &mut batch)?;
            } else if changed {
                let payload = EventPayload::Updated {
                    properties: entity.properties.to_json(),
                    diff: entity.properties.diff(),
                };
                publish_op(&self.keys, model, &id, payload, &mut batch)?;
            }
            for payload in relations.events {
                publish_op(&self.keys, model, &id, payload, &mut batch)?;
            }
        }

        debug!(%model, %id, ops = batch.len(), is_new, "committing save");
        let report = self.store.exec(batch).await?;
        if guard.is_some_and(|g| report.is_mismatch(g)) {
            warn!(%model, %id, "save rejected, record changed since load");
            return Err(EngineError::Stale {
                model: model.to_string(),
                id: id.to_string(),
            });
        }
        self.check_committed(model, &report, &claims)?;

        entity.id = Some(id);
        entity.properties.mark_clean();
        entity.relations.clear();
        debug!(%model, id = ?entity.id, "save committed");

        Ok(SaveReport {
            created: is_new,
            unchanged: false,
            link_errors,
        })
    }

    async fn generate_id(&self, definition: &ModelDefinition) -> EngineResult<EntityId> {
        Ok(match definition.id_strategy() {
            IdStrategy::Random => EntityId::random(),
            IdStrategy::Increment => {
                let next = self.store.incr(&self.keys.id_counter(definition.name())).await?;
                EntityId::from_counter(next)
            }
        })
    }

    fn check_committed(
        &self,
        model: &str,
        report: &BatchReport,
        claims: &[ClaimRef],
    ) -> EngineResult<()> {
        if report.is_committed() {
            return Ok(());
        }
        if let Some((position, holder)) = report.conflicts().next() {
            let claim = claims.iter().find(|c| c.position == position);
            let (property, value) = claim
                .map(|c| (c.property.clone(), c.value.clone()))
                .unwrap_or_default();
            warn!(%model, %property, %holder, "unique constraint violated");
            return Err(EngineError::UniqueConstraint {
                model: model.to_string(),
                property,
                value,
            });
        }
        Err(EngineError::Store(kvmodel_store::StoreError::Protocol(
            "batch was not applied".into(),
        )))
    }

    // ── Load ─────────────────────────────────────────────────────

    /// Loads the entity `id` of `model`.
    pub async fn load(&self, model: &str, id: &EntityId) -> EngineResult<Entity> {
        let mut entity = self.create(model)?;
        self.load_into(&mut entity, id).await?;
        Ok(entity)
    }

    /// Replaces the contents of `entity` with the stored record `id`.
    ///
    /// On failure `entity` is left untouched.
    pub async fn load_into(&self, entity: &mut Entity, id: &EntityId) -> EngineResult<()> {
        let definition = Arc::clone(entity.definition());
        let fields = self.read_record(&definition, id).await?;
        entity.properties.load_stored(&fields);
        entity.id = Some(id.clone());
        entity.relations.clear();
        Ok(())
    }

    async fn read_record(
        &self,
        definition: &ModelDefinition,
        id: &EntityId,
    ) -> EngineResult<HashMap<String, String>> {
        let model = definition.name();
        let mut fields = self.store.hgetall(&self.keys.hash(model, id.as_str())).await?;
        if fields.is_empty() {
            return Err(EngineError::NotFound {
                model: model.to_string(),
                id: id.to_string(),
            });
        }
        if let Some(stored) = fields.get(META_VERSION_FIELD)
            && stored != definition.version()
        {
            warn!(
                %model, %id, stored = %stored, current = definition.version(),
                "record was written under a different model version"
            );
        }
        fields.retain(|name, _| !name.starts_with("__"));
        Ok(fields)
    }

    // ── Remove ───────────────────────────────────────────────────

    /// Removes a persisted entity and everything that references it.
    ///
    /// On success the entity has no id and all its properties are dirty again.
    pub async fn remove(&self, entity: &mut Entity) -> EngineResult<()> {
        let id = entity
            .id
            .clone()
            .ok_or_else(|| EngineError::MissingId(entity.model().to_string()))?;
        let definition = Arc::clone(entity.definition());
        self.remove_record(&definition, &id).await?;
        entity.id = None;
        entity.relations.clear();
        entity.properties.mark_new();
        Ok(())
    }

    /// Removes the entity `id` of `model` without loading it first.
    pub async fn remove_by_id(&self, model: &str, id: &EntityId) -> EngineResult<()> {
        let definition = self.registry.require(model)?;
        self.remove_record(&definition, id).await
    }

    async fn remove_record(&self, definition: &Arc<ModelDefinition>, id: &EntityId) -> EngineResult<()> {
        let model = definition.name();
        let fields = self.read_record(definition, id).await?;
        let mut stored = Properties::new(Arc::clone(definition));
        stored.load_stored(&fields);

        let mut batch = Batch::new();
        let exists = batch.exists(self.keys.hash(model, id.as_str()));
        let guard = index::guard_op(&self.keys, &stored, id.as_str(), Guard::All, &mut batch);
        batch.del(self.keys.hash(model, id.as_str()));
        index::remove_ops(&self.keys, &stored, id.as_str(), &mut batch);
        relation::removal_ops(self.store.as_ref(), &self.keys, model, id.as_str(), &mut batch).await?;

        if self.publishes(definition) {
            let payload = EventPayload::Removed {
                properties: stored.to_json(),
            };
            publish_op(&self.keys, model, id, payload, &mut batch)?;
        }

        debug!(%model, %id, ops = batch.len(), "committing remove");
        let report = self.store.exec(batch).await?;
        if report.is_mismatch(exists) {
            return Err(EngineError::NotFound {
                model: model.to_string(),
                id: id.to_string(),
            });
        }
        if guard.is_some_and(|g| report.is_mismatch(g)) {
            warn!(%model, %id, "remove rejected, record changed since read");
            return Err(EngineError::Stale {
                model: model.to_string(),
                id: id.to_string(),
            });
        }
        self.check_committed(model, &report, &[])?;
        info!(%model, %id, "removed");
        Ok(())
    }
}

/// Converts stored members into ids, dropping malformed entries.
pub(crate) fn parse_ids(members: Vec<String>) -> Vec<EntityId> {
    members
        .into_iter()
        .filter_map(|member| match EntityId::parse(&member) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(%member, error = %e, "skipping malformed id");
                None
            }
        })
        .collect()
}
