//! Named relations between entities.
//!
//! Linking `a` to `b` under name `n` writes two memberships: `b` in `a`'s set
//! `n` and `a` in `b`'s inverse set `nForeign`. Scored links use sorted sets
//! for both directions. Every entity keeps a registry of the relation sets it
//! owns so removal can clean up both sides without scanning the keyspace.

use crate::engine::{parse_ids, Engine};
use crate::entity::Entity;
use crate::error::{EngineError, EngineResult, LinkError};
use kvmodel_store::{Batch, KeySpace, ScoreRange, Store};
use kvmodel_types::{EntityId, EventPayload};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Relation name used when none is given.
pub const DEFAULT_RELATION: &str = "default";

const INVERSE_SUFFIX: &str = "Foreign";

/// Name of the set holding the reverse direction of relation `name`.
pub fn inverse_name(name: &str) -> String {
    format!("{name}{INVERSE_SUFFIX}")
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RelationTarget {
    pub(crate) model: String,
    pub(crate) id: Option<EntityId>,
}

impl RelationTarget {
    pub(crate) fn of(entity: &Entity) -> Self {
        Self {
            model: entity.model().to_string(),
            id: entity.id().cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RelationChange {
    Link {
        name: String,
        target: RelationTarget,
        score: Option<f64>,
    },
    Unlink {
        name: String,
        target: RelationTarget,
    },
}

impl RelationChange {
    fn name(&self) -> &str {
        match self {
            RelationChange::Link { name, .. } | RelationChange::Unlink { name, .. } => name,
        }
    }

    fn target(&self) -> &RelationTarget {
        match self {
            RelationChange::Link { target, .. } | RelationChange::Unlink { target, .. } => target,
        }
    }
}

/// Registry entry: one relation set owned by an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RelationRef {
    name: String,
    target_model: String,
    inverse: String,
    scored: bool,
}

impl RelationRef {
    fn owned_key(&self, keys: &KeySpace, model: &str, id: &str) -> String {
        if self.scored {
            keys.scored_relation(model, &self.name, &self.target_model, id)
        } else {
            keys.relation(model, &self.name, &self.target_model, id)
        }
    }
}

/// Store operations and events for the relation changes of one save.
#[derive(Debug, Default)]
pub(crate) struct RelationPlan {
    pub(crate) batch: Batch,
    pub(crate) events: Vec<EventPayload>,
    pub(crate) errors: Vec<LinkError>,
}

/// Plans the queued relation changes of the entity `(model, id)`.
///
/// Changes whose target has no id are reported in `errors` and contribute no
/// operations.
pub(crate) fn plan(
    keys: &KeySpace,
    model: &str,
    id: &EntityId,
    changes: &[RelationChange],
) -> EngineResult<RelationPlan> {
    let mut plan = RelationPlan::default();
    for change in changes {
        let target = change.target();
        let Some(target_id) = &target.id else {
            plan.errors.push(LinkError {
                relation: change.name().to_string(),
                target_model: target.model.clone(),
                reason: "target entity has no id".into(),
            });
            continue;
        };
        let name = change.name();
        let inverse = inverse_name(name);

        match change {
            RelationChange::Link { score, .. } => {
                let forward = RelationRef {
                    name: name.to_string(),
                    target_model: target.model.clone(),
                    inverse: inverse.clone(),
                    scored: score.is_some(),
                };
                let backward = RelationRef {
                    name: inverse.clone(),
                    target_model: model.to_string(),
                    inverse: name.to_string(),
                    scored: score.is_some(),
                };
                let forward_key = forward.owned_key(keys, model, id.as_str());
                let backward_key = backward.owned_key(keys, &target.model, target_id.as_str());
                match score {
                    Some(score) => {
                        plan.batch.zadd(forward_key, *score, target_id.as_str());
                        plan.batch.zadd(backward_key, *score, id.as_str());
                    }
                    None => {
                        plan.batch.sadd(forward_key, target_id.as_str());
                        plan.batch.sadd(backward_key, id.as_str());
                    }
                }
                plan.batch.sadd(
                    keys.relation_keys(model, id.as_str()),
                    serde_json::to_string(&forward)?,
                );
                plan.batch.sadd(
                    keys.relation_keys(&target.model, target_id.as_str()),
                    serde_json::to_string(&backward)?,
                );
                plan.events.push(EventPayload::Linked {
                    relation: name.to_string(),
                    target_model: target.model.clone(),
                    target_id: target_id.clone(),
                    score: *score,
                });
            }
            RelationChange::Unlink { .. } => {
                let t = target_id.as_str();
                plan.batch.srem(keys.relation(model, name, &target.model, id.as_str()), t);
                plan.batch.zrem(keys.scored_relation(model, name, &target.model, id.as_str()), t);
                plan.batch.srem(keys.relation(&target.model, &inverse, model, t), id.as_str());
                plan.batch.zrem(keys.scored_relation(&target.model, &inverse, model, t), id.as_str());
                plan.events.push(EventPayload::Unlinked {
                    relation: name.to_string(),
                    target_model: target.model.clone(),
                    target_id: target_id.clone(),
                });
            }
        }
    }
    Ok(plan)
}

/// Appends the operations that detach `(model, id)` from every relation, in
/// both directions.
pub(crate) async fn removal_ops(
    store: &dyn Store,
    keys: &KeySpace,
    model: &str,
    id: &str,
    batch: &mut Batch,
) -> EngineResult<()> {
    let registry = keys.relation_keys(model, id);
    for raw in store.smembers(&registry).await? {
        let relation: RelationRef = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(%model, %id, error = %e, "skipping malformed relation registry entry");
                continue;
            }
        };
        let owned = relation.owned_key(keys, model, id);
        let members = if relation.scored {
            store.zrange_by_score(&owned, &ScoreRange::all()).await?
        } else {
            store.smembers(&owned).await?
        };
        for other in members {
            if relation.scored {
                batch.zrem(
                    keys.scored_relation(&relation.target_model, &relation.inverse, model, &other),
                    id,
                );
            } else {
                batch.srem(
                    keys.relation(&relation.target_model, &relation.inverse, model, &other),
                    id,
                );
            }
        }
        batch.del(owned);
    }
    batch.del(registry);
    Ok(())
}

fn require_id<'a>(entity: &'a Entity) -> EngineResult<&'a EntityId> {
    entity
        .id()
        .ok_or_else(|| EngineError::MissingId(entity.model().to_string()))
}

impl Engine {
    /// True when `entity` has a plain or scored relation `name` to `target`.
    pub async fn belongs_to(
        &self,
        entity: &Entity,
        target: &Entity,
        name: Option<&str>,
    ) -> EngineResult<bool> {
        let id = require_id(entity)?;
        let target_id = require_id(target)?;
        let name = name.unwrap_or(DEFAULT_RELATION);
        let plain = self.keys().relation(entity.model(), name, target.model(), id.as_str());
        if self.store().sismember(&plain, target_id.as_str()).await? {
            return Ok(true);
        }
        let scored = self
            .keys()
            .scored_relation(entity.model(), name, target.model(), id.as_str());
        Ok(self.store().zscore(&scored, target_id.as_str()).await?.is_some())
    }

    /// Ids of `target_model` entities related to `entity` under `name`.
    ///
    /// Plain memberships come first, followed by scored ones in score order.
    pub async fn get_all(
        &self,
        entity: &Entity,
        target_model: &str,
        name: Option<&str>,
    ) -> EngineResult<Vec<EntityId>> {
        let id = require_id(entity)?;
        self.registry().require(target_model)?;
        let name = name.unwrap_or(DEFAULT_RELATION);
        let mut members = self
            .store()
            .smembers(&self.keys().relation(entity.model(), name, target_model, id.as_str()))
            .await?;
        let scored = self
            .store()
            .zrange_by_score(
                &self.keys().scored_relation(entity.model(), name, target_model, id.as_str()),
                &ScoreRange::all(),
            )
            .await?;
        for member in scored {
            if !members.contains(&member) {
                members.push(member);
            }
        }
        Ok(parse_ids(members))
    }

    /// Number of `target_model` entities related to `entity` under `name`.
    pub async fn num_links(
        &self,
        entity: &Entity,
        target_model: &str,
        name: Option<&str>,
    ) -> EngineResult<usize> {
        Ok(self.get_all(entity, target_model, name).await?.len())
    }

    /// Ids of scored relations within `range`, ordered by score.
    pub async fn get_all_scored(
        &self,
        entity: &Entity,
        target_model: &str,
        name: Option<&str>,
        range: &ScoreRange,
    ) -> EngineResult<Vec<EntityId>> {
        let id = require_id(entity)?;
        self.registry().require(target_model)?;
        let key = self.keys().scored_relation(
            entity.model(),
            name.unwrap_or(DEFAULT_RELATION),
            target_model,
            id.as_str(),
        );
        Ok(parse_ids(self.store().zrange_by_score(&key, range).await?))
    }
}
