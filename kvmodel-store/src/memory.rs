//! In-process [`Store`] backend.
//!
//! Everything lives behind one mutex, so a batch is applied in a single
//! critical section: claims and guards are checked, every operation is applied (or the
//! touched keys are restored) and publications go out before the lock is
//! released. Subscribers therefore observe events in commit order.

use crate::batch::{Batch, BatchReport, Op, OpOutcome};
use crate::error::{StoreError, StoreResult};
use crate::store::{ScoreRange, Store};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, trace};

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Score wrapper giving `f64` a total order.
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Default)]
struct SortedSet {
    scores: HashMap<String, f64>,
    order: BTreeSet<(Score, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: String, score: f64) {
        if let Some(old) = self.scores.insert(member.clone(), score) {
            self.order.remove(&(Score(old), member.clone()));
        }
        self.order.insert((Score(score), member));
    }

    fn remove(&mut self, member: &str) {
        if let Some(old) = self.scores.remove(member) {
            self.order.remove(&(Score(old), member.to_string()));
        }
    }

    /// Members scored within `[min, max]`, walking only that part of the order.
    fn in_range(&self, min: f64, max: f64) -> impl DoubleEndedIterator<Item = &String> {
        fn member(entry: &(Score, String)) -> &String {
            &entry.1
        }
        // -0.0 sorts before 0.0 under total_cmp but compares equal to it.
        let min = if min == 0.0 { -0.0 } else { min };
        let lower = (Score(min), String::new());
        if min.is_nan() || max.is_nan() || min > max {
            return self
                .order
                .range((Bound::Included(lower.clone()), Bound::Excluded(lower)))
                .map(member);
        }
        let upper = if max == f64::INFINITY {
            Bound::Unbounded
        } else {
            let max = if max == 0.0 { 0.0 } else { max };
            Bound::Excluded((Score(max.next_up()), String::new()))
        };
        self.order.range((Bound::Included(lower), upper)).map(member)
    }

    fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Str(String),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
    ZSet(SortedSet),
}

impl Entry {
    fn is_empty(&self) -> bool {
        match self {
            Entry::Str(_) => false,
            Entry::Hash(h) => h.is_empty(),
            Entry::Set(s) => s.is_empty(),
            Entry::ZSet(z) => z.is_empty(),
        }
    }
}

fn wrong_type(key: &str, expected: &'static str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
    }
}

#[derive(Debug, Default)]
struct Inner {
    data: HashMap<String, Entry>,
    channels: HashMap<String, broadcast::Sender<String>>,
}

impl Inner {
    fn hash(&self, key: &str) -> StoreResult<Option<&HashMap<String, String>>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::Hash(h)) => Ok(Some(h)),
            Some(_) => Err(wrong_type(key, "hash")),
        }
    }

    fn set(&self, key: &str) -> StoreResult<Option<&BTreeSet<String>>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::Set(s)) => Ok(Some(s)),
            Some(_) => Err(wrong_type(key, "set")),
        }
    }

    fn zset(&self, key: &str) -> StoreResult<Option<&SortedSet>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::ZSet(z)) => Ok(Some(z)),
            Some(_) => Err(wrong_type(key, "sorted set")),
        }
    }

    fn string(&self, key: &str) -> StoreResult<Option<&String>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::Str(s)) => Ok(Some(s)),
            Some(_) => Err(wrong_type(key, "string")),
        }
    }

    /// Holder of a claim key, if any.
    fn holder(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.string(key)?.cloned())
    }

    /// Whether every expected hash field holds its expected text.
    fn fields_match(&self, key: &str, fields: &[(String, Option<String>)]) -> StoreResult<bool> {
        let hash = self.hash(key)?;
        Ok(fields.iter().all(|(field, expected)| {
            hash.and_then(|h| h.get(field)).map(String::as_str) == expected.as_deref()
        }))
    }

    /// Finds rejected claims and failed guards without mutating anything.
    fn check_guards(&self, ops: &[Op]) -> StoreResult<Vec<OpOutcome>> {
        let mut pending: HashMap<&str, &str> = HashMap::new();
        let mut outcomes = Vec::with_capacity(ops.len());
        for op in ops {
            let outcome = match op {
                Op::Claim { key, owner } => {
                    let holder = match pending.get(key.as_str()) {
                        Some(h) => Some((*h).to_string()),
                        None => self.holder(key)?,
                    };
                    match holder {
                        Some(holder) if holder != *owner => OpOutcome::Conflict { holder },
                        _ => {
                            pending.insert(key, owner);
                            OpOutcome::Applied
                        }
                    }
                }
                Op::Release { key, owner } => {
                    if pending.get(key.as_str()) == Some(&owner.as_str()) {
                        pending.remove(key.as_str());
                    }
                    OpOutcome::Applied
                }
                Op::Expect { key, fields } => {
                    if self.fields_match(key, fields)? {
                        OpOutcome::Applied
                    } else {
                        OpOutcome::Mismatch
                    }
                }
                Op::Exists { key } => {
                    if self.data.contains_key(key) {
                        OpOutcome::Applied
                    } else {
                        OpOutcome::Mismatch
                    }
                }
                _ => OpOutcome::Applied,
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn apply(&mut self, op: &Op) -> StoreResult<()> {
        match op {
            Op::HSet { key, fields } => {
                let entry = self
                    .data
                    .entry(key.clone())
                    .or_insert_with(|| Entry::Hash(HashMap::new()));
                let Entry::Hash(hash) = entry else {
                    return Err(wrong_type(key, "hash"));
                };
                for (field, value) in fields {
                    hash.insert(field.clone(), value.clone());
                }
            }
            Op::Del { key } => {
                self.data.remove(key);
            }
            Op::SAdd { key, member } => {
                let entry = self
                    .data
                    .entry(key.clone())
                    .or_insert_with(|| Entry::Set(BTreeSet::new()));
                let Entry::Set(set) = entry else {
                    return Err(wrong_type(key, "set"));
                };
                set.insert(member.clone());
            }
            Op::SRem { key, member } => match self.data.get_mut(key) {
                None => {}
                Some(Entry::Set(set)) => {
                    set.remove(member);
                }
                Some(_) => return Err(wrong_type(key, "set")),
            },
            Op::ZAdd { key, score, member } => {
                let entry = self
                    .data
                    .entry(key.clone())
                    .or_insert_with(|| Entry::ZSet(SortedSet::default()));
                let Entry::ZSet(zset) = entry else {
                    return Err(wrong_type(key, "sorted set"));
                };
                zset.insert(member.clone(), *score);
            }
            Op::ZRem { key, member } => match self.data.get_mut(key) {
                None => {}
                Some(Entry::ZSet(zset)) => zset.remove(member),
                Some(_) => return Err(wrong_type(key, "sorted set")),
            },
            Op::Claim { key, owner } => {
                if let Some(existing) = self.data.get(key)
                    && !matches!(existing, Entry::Str(_))
                {
                    return Err(wrong_type(key, "string"));
                }
                self.data.insert(key.clone(), Entry::Str(owner.clone()));
            }
            Op::Release { key, owner } => {
                if self.holder(key)?.as_deref() == Some(owner.as_str()) {
                    self.data.remove(key);
                }
            }
            Op::Publish { .. } | Op::Expect { .. } | Op::Exists { .. } => {}
        }
        if self.data.get(op.key()).is_some_and(Entry::is_empty) {
            self.data.remove(op.key());
        }
        Ok(())
    }

    fn sender(&mut self, channel: &str, capacity: usize) -> &broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
    }
}

/// A complete [`Store`] kept in process memory.
///
/// Useful for tests and single-process deployments. Sets enumerate their
/// members in lexicographic order.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    channel_capacity: usize,
    unavailable: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a store whose pub/sub channels buffer up to `capacity` messages
    /// per lagging subscriber.
    pub fn with_channel_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            channel_capacity: capacity.max(1),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulates an unreachable backend: while set, every call fails with
    /// [`StoreError::Connection`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// All keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let inner = self.lock();
        let mut keys: Vec<String> = inner
            .data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().data.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn available(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Connection("memory store marked unavailable".into()));
        }
        Ok(self.lock())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let inner = self.available()?;
        Ok(inner.hash(key)?.cloned().unwrap_or_default())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let inner = self.available()?;
        Ok(inner.string(key)?.cloned())
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let inner = self.available()?;
        Ok(inner
            .set(key)?
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> StoreResult<usize> {
        let inner = self.available()?;
        Ok(inner.set(key)?.map_or(0, BTreeSet::len))
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        let inner = self.available()?;
        Ok(inner.set(key)?.is_some_and(|s| s.contains(member)))
    }

    async fn zrange_by_score(&self, key: &str, range: &ScoreRange) -> StoreResult<Vec<String>> {
        let inner = self.available()?;
        let Some(zset) = inner.zset(key)? else {
            return Ok(Vec::new());
        };
        let limit = range.limit.unwrap_or(usize::MAX);
        let members = zset.in_range(range.min, range.max);
        let page: Vec<String> = if range.reverse {
            members.rev().skip(range.offset).take(limit).cloned().collect()
        } else {
            members.skip(range.offset).take(limit).cloned().collect()
        };
        Ok(page)
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> StoreResult<usize> {
        let inner = self.available()?;
        Ok(inner.zset(key)?.map_or(0, |z| z.in_range(min, max).count()))
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        let inner = self.available()?;
        Ok(inner.zset(key)?.and_then(|z| z.scores.get(member).copied()))
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut inner = self.available()?;
        let current = match inner.string(key)? {
            None => 0,
            Some(text) => text
                .parse::<i64>()
                .map_err(|_| StoreError::Protocol(format!("value at {key} is not an integer")))?,
        };
        let next = current + 1;
        inner.data.insert(key.to_string(), Entry::Str(next.to_string()));
        Ok(next)
    }

    async fn exec(&self, batch: Batch) -> StoreResult<BatchReport> {
        let mut inner = self.available()?;
        let ops = batch.into_ops();

        let outcomes = inner.check_guards(&ops)?;
        if outcomes.iter().any(|o| *o != OpOutcome::Applied) {
            debug!(ops = ops.len(), "batch rejected by claim conflict or failed guard");
            let outcomes = outcomes
                .into_iter()
                .map(|o| match o {
                    OpOutcome::Applied => OpOutcome::Aborted,
                    other => other,
                })
                .collect();
            return Ok(BatchReport::new(outcomes));
        }

        let mut backup: HashMap<String, Option<Entry>> = HashMap::new();
        for op in &ops {
            if matches!(op, Op::Publish { .. } | Op::Expect { .. } | Op::Exists { .. }) {
                continue;
            }
            backup
                .entry(op.key().to_string())
                .or_insert_with(|| inner.data.get(op.key()).cloned());
            if let Err(e) = inner.apply(op) {
                for (key, entry) in backup {
                    match entry {
                        Some(entry) => inner.data.insert(key, entry),
                        None => inner.data.remove(&key),
                    };
                }
                return Err(e);
            }
        }

        let capacity = self.channel_capacity;
        for op in &ops {
            if let Op::Publish { channel, message } = op {
                let receivers = inner.sender(channel, capacity).send(message.clone()).unwrap_or(0);
                trace!(%channel, receivers, "published");
            }
        }

        Ok(BatchReport::applied(ops.len()))
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<broadcast::Receiver<String>> {
        let mut inner = self.available()?;
        let capacity = self.channel_capacity;
        Ok(inner.sender(channel, capacity).subscribe())
    }
}
