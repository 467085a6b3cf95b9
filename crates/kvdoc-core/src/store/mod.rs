pub mod memory;

use crate::{ATOMIC_OPERATION_LIMIT, key::Key};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// StoreError
/// (backend boundary)
///
/// Store failures propagate verbatim; the core never retries them.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum StoreError {
    #[error("sum target at {key} is not a 64-bit counter")]
    SumTypeMismatch { key: String },

    #[error("atomic batch checks the same key twice: {key}")]
    DuplicateCheck { key: String },

    #[error("store backend failure: {0}")]
    Backend(String),
}

///
/// Versionstamp
///
/// Opaque monotonic token the store assigns per committed batch; the CAS
/// primitive for checks.
///

#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[display("{_0:020x}")]
pub struct Versionstamp(u64);

impl Versionstamp {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

///
/// StoreValue
///
/// The store's value universe. `U64` is the native counter type targeted by
/// `sum`; `Text` carries large-document segments; `Bytes` carries serialized
/// documents.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreValue {
    Bytes(Vec<u8>),
    Text(String),
    U64(u64),
}

impl StoreValue {
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Text(_) | Self::U64(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Bytes(_) | Self::U64(_) => None,
        }
    }

    #[must_use]
    pub const fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(value) => Some(*value),
            Self::Bytes(_) | Self::Text(_) => None,
        }
    }
}

///
/// Entry
///
/// The result of a point read: both fields present for a live key, both
/// absent otherwise.
///

#[derive(Clone, Debug, Default)]
pub struct Entry {
    pub value: Option<StoreValue>,
    pub versionstamp: Option<Versionstamp>,
}

impl Entry {
    #[must_use]
    pub const fn absent() -> Self {
        Self {
            value: None,
            versionstamp: None,
        }
    }

    #[must_use]
    pub const fn present(value: StoreValue, versionstamp: Versionstamp) -> Self {
        Self {
            value: Some(value),
            versionstamp: Some(versionstamp),
        }
    }

    /// Split into `(value, versionstamp)` when the key is live.
    #[must_use]
    pub fn into_present(self) -> Option<(StoreValue, Versionstamp)> {
        match (self.value, self.versionstamp) {
            (Some(value), Some(versionstamp)) => Some((value, versionstamp)),
            _ => None,
        }
    }
}

///
/// Check
///
/// A per-key version gate. `versionstamp: None` asserts the key is absent.
///

#[derive(Clone, Debug)]
pub struct Check {
    pub key: Key,
    pub versionstamp: Option<Versionstamp>,
}

///
/// Mutation
///

#[derive(Clone, Debug)]
pub enum Mutation {
    Set { key: Key, value: StoreValue },
    Delete { key: Key },
    Sum { key: Key, delta: u64 },
}

impl Mutation {
    #[must_use]
    pub const fn key(&self) -> &Key {
        match self {
            Self::Set { key, .. } | Self::Delete { key } | Self::Sum { key, .. } => key,
        }
    }
}

///
/// CommitOutcome
///
/// Result of one atomic batch. A failed check yields `Conflict` with no side
/// effects; the store reports no further distinction.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[must_use]
pub enum CommitOutcome {
    Committed { versionstamp: Versionstamp },
    Conflict,
}

impl CommitOutcome {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    #[must_use]
    pub const fn versionstamp(&self) -> Option<Versionstamp> {
        match self {
            Self::Committed { versionstamp } => Some(*versionstamp),
            Self::Conflict => None,
        }
    }
}

///
/// AtomicBatch
///
/// A command list committed all-or-nothing: every check must pass for any
/// mutation to apply, and all mutations land at a single store version.
///

#[derive(Clone, Debug, Default)]
#[must_use]
pub struct AtomicBatch {
    checks: Vec<Check>,
    mutations: Vec<Mutation>,
}

impl AtomicBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn set(mut self, key: Key, value: StoreValue) -> Self {
        self.mutations.push(Mutation::Set { key, value });
        self
    }

    pub fn delete(mut self, key: Key) -> Self {
        self.mutations.push(Mutation::Delete { key });
        self
    }

    pub fn sum(mut self, key: Key, delta: u64) -> Self {
        self.mutations.push(Mutation::Sum { key, delta });
        self
    }

    pub fn mutate<I>(mut self, mutations: I) -> Self
    where
        I: IntoIterator<Item = Mutation>,
    {
        self.mutations.extend(mutations);
        self
    }

    #[must_use]
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    #[must_use]
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty() && self.mutations.is_empty()
    }

    pub fn commit<S: Store + ?Sized>(self, store: &S) -> Result<CommitOutcome, StoreError> {
        store.commit(self)
    }
}

///
/// Consistency
///
/// Forwarded to the store on read paths; backends without replication
/// ignore it.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Consistency {
    #[default]
    Strong,
    Eventual,
}

///
/// ListSelector
///
/// A prefix scan with optional inclusive `start` / exclusive `end` cursors.
///

#[derive(Clone, Debug)]
pub struct ListSelector {
    pub prefix: Key,
    pub start: Option<Key>,
    pub end: Option<Key>,
}

impl ListSelector {
    #[must_use]
    pub const fn prefix(prefix: Key) -> Self {
        Self {
            prefix,
            start: None,
            end: None,
        }
    }
}

///
/// ListOptions
///

#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    pub limit: Option<usize>,
    pub reverse: bool,
    pub batch_size: Option<usize>,
    pub consistency: Consistency,
}

///
/// Store
///
/// The contract the core requires from the underlying ordered KV store:
/// point and batched reads, ordered prefix enumeration, and all-or-nothing
/// atomic batches gated by per-key version checks.
///

pub trait Store {
    fn get(&self, key: &Key) -> Result<Entry, StoreError>;

    /// Batched point reads; output order matches `keys`.
    fn get_many(&self, keys: &[Key]) -> Result<Vec<Entry>, StoreError>;

    fn list(
        &self,
        selector: &ListSelector,
        options: &ListOptions,
    ) -> Result<Vec<(Key, Entry)>, StoreError>;

    fn delete(&self, key: &Key) -> Result<(), StoreError>;

    fn commit(&self, batch: AtomicBatch) -> Result<CommitOutcome, StoreError>;
}

/// Commit a long mutation list across as many atomic batches as needed.
///
/// Chunks by [`ATOMIC_OPERATION_LIMIT`] and returns one outcome per batch,
/// in submission order.
pub fn commit_in_batches<S: Store + ?Sized>(
    store: &S,
    mutations: Vec<Mutation>,
) -> Result<Vec<CommitOutcome>, StoreError> {
    let mut outcomes = Vec::new();
    let mut remaining = mutations;

    while !remaining.is_empty() {
        let tail = if remaining.len() > ATOMIC_OPERATION_LIMIT {
            remaining.split_off(ATOMIC_OPERATION_LIMIT)
        } else {
            Vec::new()
        };
        outcomes.push(AtomicBatch::new().mutate(remaining).commit(store)?);
        remaining = tail;
    }

    Ok(outcomes)
}

///
/// TESTS
///
