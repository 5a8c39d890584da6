//! Index-backed queries.
//!
//! A query is an ordered list of criteria, each answered by one index: exact
//! values by the unique or standard index, ranges by the scored index. The
//! result is the intersection of all criteria. Cardinalities are read first;
//! any empty criterion ends the query before a single member is fetched, and
//! otherwise the smallest candidate set is materialized and narrowed by the
//! others.
//!
//! Ordering: the first range criterion in query order decides the result
//! order (ascending score, ties by id). Without a range criterion the result
//! keeps the order of the smallest candidate set as the store returns it.

use crate::engine::{parse_ids, Engine};
use crate::entity::Entity;
use crate::error::{EngineError, EngineResult};
use crate::index::unique_value;
use futures::future::try_join_all;
use kvmodel_model::{coerce, encode_stored, PropertyDef, PropertyType};
use kvmodel_store::ScoreRange;
use kvmodel_types::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Score bounds and an optional cap for a scored-index criterion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// At most this many ids, lowest scores first.
    pub limit: Option<usize>,
}

impl RangeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn bounds(&self) -> (f64, f64) {
        (
            self.min.unwrap_or(f64::NEG_INFINITY),
            self.max.unwrap_or(f64::INFINITY),
        )
    }

    fn contains(&self, score: f64) -> bool {
        let (min, max) = self.bounds();
        score >= min && score <= max
    }

    fn score_range(&self) -> ScoreRange {
        let (min, max) = self.bounds();
        ScoreRange {
            min,
            max,
            offset: 0,
            limit: self.limit,
            reverse: false,
        }
    }
}

/// One condition of a [`Query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// Property equals the value after coercion.
    Exact(Value),
    /// Numeric property lies within the range.
    Range(RangeQuery),
}

/// Criteria combined by intersection, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    criteria: Vec<(String, Criterion)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an exact-value criterion.
    pub fn eq(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.criteria
            .push((property.to_string(), Criterion::Exact(value.into())));
        self
    }

    /// Adds a range criterion.
    pub fn range(mut self, property: &str, range: RangeQuery) -> Self {
        self.criteria.push((property.to_string(), Criterion::Range(range)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn criteria(&self) -> &[(String, Criterion)] {
        &self.criteria
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Paging and direction for [`Engine::sort`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortOptions {
    pub direction: SortDirection,
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Debug)]
enum Source {
    /// The id holding the unique value, if any.
    Unique(Option<String>),
    Set(String),
    Range { key: String, range: RangeQuery },
}

#[derive(Debug)]
struct Candidate {
    source: Source,
    size: usize,
}

fn query_value(prop: &PropertyDef, raw: &Value) -> Value {
    match &prop.kind {
        PropertyType::Builtin(ty) => coerce(*ty, raw),
        PropertyType::Behavior(_) => raw.clone(),
    }
}

impl Engine {
    /// Ids of `model` entities matching every criterion of `query`.
    ///
    /// An empty query returns every saved id.
    pub async fn find(&self, model: &str, query: &Query) -> EngineResult<Vec<EntityId>> {
        let definition = self.registry().require(model)?;
        if query.is_empty() {
            let ids = self.store().smembers(&self.keys().idset(model)).await?;
            return Ok(parse_ids(ids));
        }

        let mut candidates = Vec::with_capacity(query.criteria.len());
        for (name, criterion) in &query.criteria {
            let prop = definition
                .property(name)
                .ok_or_else(|| EngineError::UnknownProperty {
                    model: model.to_string(),
                    property: name.clone(),
                })?;
            let candidate = self.candidate(model, prop, criterion).await?;
            if candidate.size == 0 {
                debug!(%model, property = %name, "criterion matches nothing");
                return Ok(Vec::new());
            }
            candidates.push(candidate);
        }

        let order_by = candidates
            .iter()
            .position(|c| matches!(c.source, Source::Range { .. }));
        let mut by_size: Vec<usize> = (0..candidates.len()).collect();
        by_size.sort_by_key(|&i| candidates[i].size);

        let driver = by_size[0];
        let mut ids = self.materialize(&candidates[driver]).await?;
        for &i in &by_size[1..] {
            if ids.is_empty() {
                break;
            }
            ids = self.narrow(ids, &candidates[i]).await?;
        }

        if let Some(order_by) = order_by
            && order_by != driver
            && let Source::Range { key, .. } = &candidates[order_by].source
        {
            ids = self.order_by_score(key, ids).await?;
        }

        Ok(parse_ids(ids))
    }

    async fn candidate(
        &self,
        model: &str,
        prop: &PropertyDef,
        criterion: &Criterion,
    ) -> EngineResult<Candidate> {
        match criterion {
            Criterion::Exact(raw) => {
                let value = query_value(prop, raw);
                let unique = if prop.unique { unique_value(&value) } else { None };
                if let Some(unique) = unique {
                    let key = self.keys().unique(model, &prop.name, &unique);
                    let holder = self.store().get(&key).await?;
                    Ok(Candidate {
                        size: usize::from(holder.is_some()),
                        source: Source::Unique(holder),
                    })
                } else if prop.index {
                    let key = self.keys().index(model, &prop.name, &encode_stored(&value));
                    let size = self.store().scard(&key).await?;
                    Ok(Candidate {
                        source: Source::Set(key),
                        size,
                    })
                } else if prop.unique {
                    Ok(Candidate {
                        source: Source::Unique(None),
                        size: 0,
                    })
                } else {
                    Err(EngineError::InvalidQuery(format!(
                        "{model}.{} is neither unique nor indexed",
                        prop.name
                    )))
                }
            }
            Criterion::Range(range) => {
                if !prop.is_numeric_indexable() {
                    return Err(EngineError::InvalidQuery(format!(
                        "{model}.{} has no scored index",
                        prop.name
                    )));
                }
                let key = self.keys().scored_index(model, &prop.name);
                let (min, max) = range.bounds();
                let count = self.store().zcount(&key, min, max).await?;
                Ok(Candidate {
                    size: range.limit.map_or(count, |limit| count.min(limit)),
                    source: Source::Range { key, range: *range },
                })
            }
        }
    }

    async fn materialize(&self, candidate: &Candidate) -> EngineResult<Vec<String>> {
        Ok(match &candidate.source {
            Source::Unique(holder) => holder.iter().cloned().collect(),
            Source::Set(key) => self.store().smembers(key).await?,
            Source::Range { key, range } => {
                self.store()
                    .zrange_by_score(key, &range.score_range())
                    .await?
            }
        })
    }

    async fn narrow(&self, ids: Vec<String>, candidate: &Candidate) -> EngineResult<Vec<String>> {
        match &candidate.source {
            Source::Unique(holder) => Ok(ids
                .into_iter()
                .filter(|id| holder.as_deref() == Some(id.as_str()))
                .collect()),
            Source::Set(key) => {
                let member = try_join_all(ids.iter().map(|id| self.store().sismember(key, id))).await?;
                Ok(ids
                    .into_iter()
                    .zip(member)
                    .filter_map(|(id, keep)| keep.then_some(id))
                    .collect())
            }
            Source::Range { key, range } if range.limit.is_some() => {
                let allowed: HashSet<String> = self
                    .store()
                    .zrange_by_score(key, &range.score_range())
                    .await?
                    .into_iter()
                    .collect();
                Ok(ids.into_iter().filter(|id| allowed.contains(id)).collect())
            }
            Source::Range { key, range } => {
                let scores = try_join_all(ids.iter().map(|id| self.store().zscore(key, id))).await?;
                Ok(ids
                    .into_iter()
                    .zip(scores)
                    .filter_map(|(id, score)| score.filter(|s| range.contains(*s)).map(|_| id))
                    .collect())
            }
        }
    }

    async fn order_by_score(&self, key: &str, ids: Vec<String>) -> EngineResult<Vec<String>> {
        let scores = try_join_all(ids.iter().map(|id| self.store().zscore(key, id))).await?;
        let mut scored: Vec<(f64, String)> = scores
            .into_iter()
            .zip(ids)
            .map(|(score, id)| (score.unwrap_or(f64::INFINITY), id))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        Ok(scored.into_iter().map(|(_, id)| id).collect())
    }

    /// Finds matching ids and loads each entity.
    ///
    /// Entities removed between the lookup and the load are skipped.
    pub async fn find_and_load(&self, model: &str, query: &Query) -> EngineResult<Vec<Entity>> {
        let ids = self.find(model, query).await?;
        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load(model, &id).await {
                Ok(entity) => entities.push(entity),
                Err(EngineError::NotFound { .. }) => {
                    debug!(%model, %id, "found id vanished before load");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(entities)
    }

    /// Ids of `model` ordered by a scored property.
    pub async fn sort(
        &self,
        model: &str,
        property: &str,
        options: SortOptions,
    ) -> EngineResult<Vec<EntityId>> {
        let definition = self.registry().require(model)?;
        let prop = definition.require_property(property)?;
        if !prop.is_numeric_indexable() {
            return Err(EngineError::InvalidQuery(format!(
                "{model}.{property} has no scored index"
            )));
        }
        let range = ScoreRange {
            offset: options.offset,
            limit: options.limit,
            reverse: options.direction == SortDirection::Desc,
            ..ScoreRange::all()
        };
        let ids = self
            .store()
            .zrange_by_score(&self.keys().scored_index(model, property), &range)
            .await?;
        Ok(parse_ids(ids))
    }
}
