//! The store abstraction consumed by the engine.

use crate::batch::{Batch, BatchReport};
use crate::error::StoreResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// A score window over a sorted set, with optional paging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    /// Inclusive lower bound.
    #[serde(default = "neg_infinity")]
    pub min: f64,
    /// Inclusive upper bound.
    #[serde(default = "infinity")]
    pub max: f64,
    /// Members to skip after filtering by score.
    #[serde(default)]
    pub offset: usize,
    /// Maximum members returned after the offset.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Highest scores first.
    #[serde(default)]
    pub reverse: bool,
}

fn neg_infinity() -> f64 {
    f64::NEG_INFINITY
}

fn infinity() -> f64 {
    f64::INFINITY
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            offset: 0,
            limit: None,
            reverse: false,
        }
    }
}

impl ScoreRange {
    /// Every score.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = min;
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = max;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// True when `score` lies within the bounds.
    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }

    /// True when paging can drop members that lie within the bounds.
    pub fn is_paged(&self) -> bool {
        self.offset > 0 || self.limit.is_some()
    }
}

/// Primitives of a key-value store with hashes, sets, sorted sets, counters,
/// pub/sub and atomic batches.
///
/// Implementations must apply a [`Batch`] all-or-nothing: either every
/// operation is applied or none is, and claim conflicts are detected inside
/// the same atomic step that applies the batch.
#[async_trait]
pub trait Store: Send + Sync {
    /// All fields of a hash. Absent keys yield an empty map.
    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// The value of a string key.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Members of a set, in a stable order for a given store state.
    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Cardinality of a set.
    async fn scard(&self, key: &str) -> StoreResult<usize>;

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Members of a sorted set within `range`, ordered by score then member.
    async fn zrange_by_score(&self, key: &str, range: &ScoreRange) -> StoreResult<Vec<String>>;

    /// Number of members with a score within `[min, max]`.
    async fn zcount(&self, key: &str, min: f64, max: f64) -> StoreResult<usize>;

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>>;

    /// Atomically increments a counter and returns the new value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Applies a batch all-or-nothing.
    async fn exec(&self, batch: Batch) -> StoreResult<BatchReport>;

    /// Subscribes to a pub/sub channel.
    async fn subscribe(&self, channel: &str) -> StoreResult<broadcast::Receiver<String>>;
}
