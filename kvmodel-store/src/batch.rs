//! All-or-nothing batches of store mutations.

/// One mutation inside a [`Batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Write hash fields, keeping fields not mentioned.
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Delete a key of any kind.
    Del { key: String },
    SAdd { key: String, member: String },
    SRem { key: String, member: String },
    ZAdd {
        key: String,
        score: f64,
        member: String,
    },
    ZRem { key: String, member: String },
    /// Claim `key` for `owner`. Rejects the whole batch when another owner holds it.
    Claim { key: String, owner: String },
    /// Release `key` if `owner` holds it; a no-op otherwise.
    Release { key: String, owner: String },
    /// Publish `message` on `channel` once the batch has applied.
    Publish { channel: String, message: String },
    /// Rejects the whole batch unless each hash field holds the given text.
    /// `None` expects the field to be absent.
    Expect {
        key: String,
        fields: Vec<(String, Option<String>)>,
    },
    /// Rejects the whole batch unless `key` exists.
    Exists { key: String },
}

impl Op {
    /// The key (or channel) this operation addresses.
    pub fn key(&self) -> &str {
        match self {
            Op::HSet { key, .. }
            | Op::Del { key }
            | Op::SAdd { key, .. }
            | Op::SRem { key, .. }
            | Op::ZAdd { key, .. }
            | Op::ZRem { key, .. }
            | Op::Claim { key, .. }
            | Op::Release { key, .. }
            | Op::Expect { key, .. }
            | Op::Exists { key } => key,
            Op::Publish { channel, .. } => channel,
        }
    }
}

/// An ordered list of operations submitted atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    ops: Vec<Op>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation and returns its position.
    pub fn push(&mut self, op: Op) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    pub fn hset(&mut self, key: impl Into<String>, fields: Vec<(String, String)>) -> usize {
        self.push(Op::HSet {
            key: key.into(),
            fields,
        })
    }

    pub fn del(&mut self, key: impl Into<String>) -> usize {
        self.push(Op::Del { key: key.into() })
    }

    pub fn sadd(&mut self, key: impl Into<String>, member: impl Into<String>) -> usize {
        self.push(Op::SAdd {
            key: key.into(),
            member: member.into(),
        })
    }

    pub fn srem(&mut self, key: impl Into<String>, member: impl Into<String>) -> usize {
        self.push(Op::SRem {
            key: key.into(),
            member: member.into(),
        })
    }

    pub fn zadd(&mut self, key: impl Into<String>, score: f64, member: impl Into<String>) -> usize {
        self.push(Op::ZAdd {
            key: key.into(),
            score,
            member: member.into(),
        })
    }

    pub fn zrem(&mut self, key: impl Into<String>, member: impl Into<String>) -> usize {
        self.push(Op::ZRem {
            key: key.into(),
            member: member.into(),
        })
    }

    pub fn claim(&mut self, key: impl Into<String>, owner: impl Into<String>) -> usize {
        self.push(Op::Claim {
            key: key.into(),
            owner: owner.into(),
        })
    }

    pub fn release(&mut self, key: impl Into<String>, owner: impl Into<String>) -> usize {
        self.push(Op::Release {
            key: key.into(),
            owner: owner.into(),
        })
    }

    pub fn publish(&mut self, channel: impl Into<String>, message: impl Into<String>) -> usize {
        self.push(Op::Publish {
            channel: channel.into(),
            message: message.into(),
        })
    }

    pub fn expect(&mut self, key: impl Into<String>, fields: Vec<(String, Option<String>)>) -> usize {
        self.push(Op::Expect {
            key: key.into(),
            fields,
        })
    }

    pub fn exists(&mut self, key: impl Into<String>) -> usize {
        self.push(Op::Exists { key: key.into() })
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<Op> {
        self.ops
    }

    /// Appends every operation of `other`.
    pub fn extend(&mut self, other: Batch) {
        self.ops.extend(other.ops);
    }
}

/// What happened to one operation of a submitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    Applied,
    /// A claim found the key held by `holder`.
    Conflict { holder: String },
    /// An `Expect` or `Exists` guard did not hold.
    Mismatch,
    /// The batch was rejected because of another operation.
    Aborted,
}

/// Per-operation outcome of a submitted batch, index-aligned with its ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    outcomes: Vec<OpOutcome>,
}

impl BatchReport {
    pub fn new(outcomes: Vec<OpOutcome>) -> Self {
        Self { outcomes }
    }

    /// A report for a batch whose every operation applied.
    pub fn applied(len: usize) -> Self {
        Self::new(vec![OpOutcome::Applied; len])
    }

    /// True when every operation applied.
    pub fn is_committed(&self) -> bool {
        self.outcomes.iter().all(|o| *o == OpOutcome::Applied)
    }

    pub fn outcome(&self, index: usize) -> Option<&OpOutcome> {
        self.outcomes.get(index)
    }

    pub fn outcomes(&self) -> &[OpOutcome] {
        &self.outcomes
    }

    /// Positions and holders of rejected claims.
    pub fn conflicts(&self) -> impl Iterator<Item = (usize, &str)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| match o {
                OpOutcome::Conflict { holder } => Some((i, holder.as_str())),
                _ => None,
            })
    }

    /// True when the guard at `index` rejected the batch.
    pub fn is_mismatch(&self, index: usize) -> bool {
        self.outcome(index) == Some(&OpOutcome::Mismatch)
    }
}
