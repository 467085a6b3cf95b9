use crate::{
    collection::{
        Collection,
        indexable::{IndexableCollection, index_delete_keys, index_insert_ops},
    },
    document::DocumentId,
    error::Error,
    key::Key,
    serialize::SerializeError,
    store::{
        AtomicBatch, Check, CommitOutcome, Mutation, Store, StoreValue, Versionstamp,
        commit_in_batches,
    },
};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::{debug, warn};

///
/// AtomicCheck
///
/// A raw optimistic-concurrency gate on a document of the active
/// collection; `versionstamp: None` asserts absence.
///

#[derive(Clone, Debug)]
pub struct AtomicCheck {
    pub id: DocumentId,
    pub versionstamp: Option<Versionstamp>,
}

///
/// AtomicMutation
///
/// Lower-level mutation surface. `Set` carries the implicit absence check
/// and index fragments of `add`/`set`; `Delete` registers the prepare step
/// of `delete`; `Sum` targets counter documents only.
///

#[derive(Clone, Debug)]
pub enum AtomicMutation<T> {
    Set { id: DocumentId, value: T },
    Delete { id: DocumentId },
    Sum { id: DocumentId, delta: u64 },
}

///
/// AtomicCommand
///
/// The builder's accumulator is a tagged command queue; a single lowering
/// pass folds it into the store's atomic batch.
///

#[derive(Clone, Debug)]
enum AtomicCommand {
    Check {
        key: Key,
        versionstamp: Option<Versionstamp>,
    },
    Set {
        key: Key,
        value: StoreValue,
    },
    Delete {
        key: Key,
    },
    Sum {
        key: Key,
        delta: u64,
    },
}

fn lower(commands: Vec<AtomicCommand>) -> AtomicBatch {
    let mut batch = AtomicBatch::new();
    for command in commands {
        batch = match command {
            AtomicCommand::Check { key, versionstamp } => {
                batch.check(Check { key, versionstamp })
            }
            AtomicCommand::Set { key, value } => batch.set(key, value),
            AtomicCommand::Delete { key } => batch.delete(key),
            AtomicCommand::Sum { key, delta } => batch.sum(key, delta),
        };
    }
    batch
}

///
/// PrepareDelete
///
/// Descriptor for a pre-commit read: captures everything needed to derive
/// the index keys an indexable delete must sweep after the main commit.
///

struct PrepareDelete {
    id_key: Key,
    collection_key: Key,
    id: DocumentId,
    primary_fields: Vec<String>,
    secondary_fields: Vec<String>,
    to_json: Arc<dyn Fn(&StoreValue) -> Result<serde_json::Value, Error> + Send + Sync>,
}

struct DeletePlan {
    index_keys: Vec<Key>,
}

///
/// AtomicSelectable
///
/// Collections the builder can operate on. Large collections are excluded:
/// their writes span multiple batches and cannot join a single commit.
///

pub trait AtomicSelectable<T, S> {
    fn base(&self) -> &Collection<T, S>;
    /// `(primary, secondary)` field lists for indexable collections.
    fn index_lists(&self) -> Option<(&[String], &[String])>;
}

impl<T, S> AtomicSelectable<T, S> for Collection<T, S> {
    fn base(&self) -> &Collection<T, S> {
        self
    }

    fn index_lists(&self) -> Option<(&[String], &[String])> {
        None
    }
}

impl<T, S> AtomicSelectable<T, S> for IndexableCollection<T, S> {
    fn base(&self) -> &Collection<T, S> {
        IndexableCollection::base(self)
    }

    fn index_lists(&self) -> Option<(&[String], &[String])> {
        Some((self.primary_index_list(), self.secondary_index_list()))
    }
}

#[derive(Default)]
struct AtomicState {
    commands: Vec<AtomicCommand>,
    prepares: Vec<PrepareDelete>,
    index_add_keys: Vec<Key>,
    index_delete_keys: Vec<Key>,
}

impl AtomicState {
    /// A commit may not both create and delete index entries in one
    /// indexable collection: the prepare reads pre-delete state while the
    /// batch writes post-add state, so the cleanup could sweep fresh
    /// entries.
    fn has_overlap(&self) -> bool {
        self.index_add_keys
            .iter()
            .any(|added| self.index_delete_keys.iter().any(|deleted| deleted == added))
    }
}

///
/// AtomicBuilder
///
/// Fluent accumulator for one cross-collection commit. `select` re-types
/// the builder onto another collection while sharing the accumulated
/// operations; `commit` runs prepare reads, submits one atomic batch, and
/// issues best-effort index cleanups.
///

#[must_use]
pub struct AtomicBuilder<'a, T, S> {
    collection: &'a dyn AtomicSelectable<T, S>,
    state: AtomicState,
}

impl<'a, T, S> AtomicBuilder<'a, T, S>
where
    T: Serialize + DeserializeOwned + 'static,
    S: Store,
{
    pub fn new<C>(collection: &'a C) -> Self
    where
        C: AtomicSelectable<T, S>,
    {
        Self {
            collection,
            state: AtomicState::default(),
        }
    }

    /// Continue the same commit against another collection.
    pub fn select<U, C>(self, collection: &'a C) -> AtomicBuilder<'a, U, S>
    where
        U: Serialize + DeserializeOwned + 'static,
        C: AtomicSelectable<U, S>,
    {
        AtomicBuilder {
            collection,
            state: self.state,
        }
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Enqueue an insert under a fresh generated id.
    pub fn add(mut self, value: T) -> Result<Self, Error> {
        let base = self.collection.base();
        let value = base.model().parse(value)?;
        let id = base.generate_document_id(&value);
        self.push_set(&id, &value)?;

        Ok(self)
    }

    /// Enqueue an insert under a caller id; conflicts if the id exists.
    pub fn set(mut self, id: &DocumentId, value: T) -> Result<Self, Error> {
        let value = self.collection.base().model().parse(value)?;
        self.push_set(id, &value)?;

        Ok(self)
    }

    /// Enqueue a document delete; indexable collections register the
    /// prepare read for post-commit index cleanup.
    pub fn delete(mut self, id: &DocumentId) -> Self {
        self.push_delete(id);
        self
    }

    /// Enqueue a raw version check.
    pub fn check(mut self, check: AtomicCheck) -> Self {
        let key = self.collection.base().id_key(&check.id);
        self.state.commands.push(AtomicCommand::Check {
            key,
            versionstamp: check.versionstamp,
        });
        self
    }

    /// Enqueue a counter addition; non-counter targets fail the batch at
    /// the store layer.
    pub fn sum(mut self, id: &DocumentId, delta: u64) -> Self {
        let key = self.collection.base().id_key(id);
        self.state.commands.push(AtomicCommand::Sum { key, delta });
        self
    }

    /// Enqueue lower-level mutations with the same side effects as the
    /// typed operations.
    pub fn mutate<I>(mut self, mutations: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = AtomicMutation<T>>,
    {
        for mutation in mutations {
            match mutation {
                AtomicMutation::Set { id, value } => {
                    let value = self.collection.base().model().parse(value)?;
                    self.push_set(&id, &value)?;
                }
                AtomicMutation::Delete { id } => self.push_delete(&id),
                AtomicMutation::Sum { id, delta } => {
                    let key = self.collection.base().id_key(&id);
                    self.state.commands.push(AtomicCommand::Sum { key, delta });
                }
            }
        }

        Ok(self)
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// Prepare, commit, clean up.
    ///
    /// Phases: reject add/delete overlap before any I/O; evaluate prepare
    /// reads against the live store; submit the single atomic batch; on
    /// success, sweep captured index keys in follow-up batches whose
    /// outcomes are discarded.
    pub fn commit(self) -> Result<CommitOutcome, Error> {
        if self.state.has_overlap() {
            warn!("atomic commit mixes index adds and deletes in one collection");
            return Ok(CommitOutcome::Conflict);
        }

        let store = self.collection.base().store();

        let mut plans = Vec::with_capacity(self.state.prepares.len());
        for prepare in &self.state.prepares {
            let entry = store.get(&prepare.id_key)?;
            let Some(value) = entry.value else {
                continue;
            };
            let json = (prepare.to_json)(&value)?;
            plans.push(DeletePlan {
                index_keys: index_delete_keys(
                    &prepare.collection_key,
                    &prepare.primary_fields,
                    &prepare.secondary_fields,
                    &prepare.id,
                    &json,
                ),
            });
        }

        debug!(
            commands = self.state.commands.len(),
            cleanups = plans.len(),
            "committing atomic batch"
        );
        let outcome = store.commit(lower(self.state.commands))?;

        if outcome.is_committed() {
            for plan in plans {
                let mutations: Vec<Mutation> = plan
                    .index_keys
                    .into_iter()
                    .map(|key| Mutation::Delete { key })
                    .collect();
                // Best-effort: the main commit already succeeded and readers
                // tolerate stale index entries until the next write.
                match commit_in_batches(store, mutations) {
                    Ok(outcomes) if outcomes.iter().all(CommitOutcome::is_committed) => {}
                    Ok(_) => warn!("index cleanup batch conflicted; stale entries remain"),
                    Err(err) => warn!(%err, "index cleanup failed; stale entries remain"),
                }
            }
        }

        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn push_set(&mut self, id: &DocumentId, value: &T) -> Result<(), Error> {
        let base = self.collection.base();
        let id_key = base.id_key(id);
        let bytes = base.codec().serialize(value)?;

        self.state.commands.push(AtomicCommand::Check {
            key: id_key.clone(),
            versionstamp: None,
        });
        self.state.commands.push(AtomicCommand::Set {
            key: id_key,
            value: StoreValue::Bytes(bytes.clone()),
        });

        if let Some((primary, secondary)) = self.collection.index_lists() {
            let json = serde_json::to_value(value).map_err(SerializeError::encode)?;
            let (checks, mutations) =
                index_insert_ops(base.key(), primary, secondary, id, &json, &bytes)?;
            for check in checks {
                self.state.commands.push(AtomicCommand::Check {
                    key: check.key,
                    versionstamp: check.versionstamp,
                });
            }
            for mutation in mutations {
                match mutation {
                    Mutation::Set { key, value } => {
                        self.state.commands.push(AtomicCommand::Set { key, value });
                    }
                    Mutation::Delete { key } => {
                        self.state.commands.push(AtomicCommand::Delete { key });
                    }
                    Mutation::Sum { key, delta } => {
                        self.state.commands.push(AtomicCommand::Sum { key, delta });
                    }
                }
            }
            self.state.index_add_keys.push(base.key().clone());
        }

        Ok(())
    }

    fn push_delete(&mut self, id: &DocumentId) {
        let base = self.collection.base();
        let id_key = base.id_key(id);
        self.state.commands.push(AtomicCommand::Delete {
            key: id_key.clone(),
        });

        if let Some((primary, secondary)) = self.collection.index_lists() {
            self.state.index_delete_keys.push(base.key().clone());

            let codec = Arc::clone(base.codec());
            let to_json: Arc<
                dyn Fn(&StoreValue) -> Result<serde_json::Value, Error> + Send + Sync,
            > = Arc::new(move |stored: &StoreValue| {
                let bytes = stored.as_bytes().ok_or_else(|| {
                    SerializeError::decode("stored document is not a serialized value")
                })?;
                let value: T = codec.deserialize(bytes)?;
                serde_json::to_value(&value)
                    .map_err(|err| Error::from(SerializeError::encode(err)))
            });

            self.state.prepares.push(PrepareDelete {
                id_key,
                collection_key: base.key().clone(),
                id: id.clone(),
                primary_fields: primary.to_vec(),
                secondary_fields: secondary.to_vec(),
                to_json,
            });
        }
    }
}

impl<T, S> Collection<T, S>
where
    T: Serialize + DeserializeOwned + 'static,
    S: Store,
{
    /// Open an atomic builder with this collection active.
    pub fn atomic(&self) -> AtomicBuilder<'_, T, S> {
        AtomicBuilder::new(self)
    }
}

impl<T, S> IndexableCollection<T, S>
where
    T: Serialize + DeserializeOwned + 'static,
    S: Store,
{
    /// Open an atomic builder with this collection active.
    pub fn atomic(&self) -> AtomicBuilder<'_, T, S> {
        AtomicBuilder::new(self)
    }
}

///
/// TESTS
///
