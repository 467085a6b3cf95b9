pub mod cursor;
pub mod indexable;
pub mod large;

use crate::{
    ID_KEY_PREFIX, KVDOC_KEY_PREFIX,
    document::{CommitResult, Document, DocumentId},
    error::Error,
    key::{Key, KeyPart},
    model::{IdGenerator, Model, PassthroughModel, generate_id},
    serialize::{DocumentCodec, JsonCodec, SerializeError},
    store::{
        AtomicBatch, Check, CommitOutcome, Consistency, ListOptions as StoreListOptions,
        ListSelector, Mutation, Store, StoreValue, Versionstamp, commit_in_batches,
    },
};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

///
/// CollectionOptions
///

pub struct CollectionOptions<T> {
    pub model: Arc<dyn Model<T>>,
    pub id_generator: IdGenerator<T>,
    pub codec: Arc<dyn DocumentCodec<T>>,
}

impl<T> Default for CollectionOptions<T>
where
    T: Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self {
            model: Arc::new(PassthroughModel),
            id_generator: Arc::new(|_| generate_id()),
            codec: Arc::new(JsonCodec),
        }
    }
}

impl<T> Clone for CollectionOptions<T> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            id_generator: Arc::clone(&self.id_generator),
            codec: Arc::clone(&self.codec),
        }
    }
}

///
/// SetOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct SetOptions {
    /// Replace an existing document (and its indexes / segments) instead of
    /// conflicting on it.
    pub overwrite: bool,
    /// Bounded retries for large-collection segment writes; ignored by
    /// single-key collections.
    pub retry: u32,
}

/// Client-side document predicate applied after materialization.
pub type DocumentFilter<T> = Arc<dyn Fn(&Document<T>) -> bool + Send + Sync>;

///
/// ListOptions
///
/// Shapes every prefix-enumeration surface: id range, pagination cursor,
/// limit, direction, and the client-side filter.
///

pub struct ListOptions<T> {
    pub start_id: Option<DocumentId>,
    pub end_id: Option<DocumentId>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
    pub reverse: bool,
    pub batch_size: Option<usize>,
    pub consistency: Consistency,
    pub filter: Option<DocumentFilter<T>>,
}

impl<T> Default for ListOptions<T> {
    fn default() -> Self {
        Self {
            start_id: None,
            end_id: None,
            cursor: None,
            limit: None,
            reverse: false,
            batch_size: None,
            consistency: Consistency::Strong,
            filter: None,
        }
    }
}

impl<T> Clone for ListOptions<T> {
    fn clone(&self) -> Self {
        Self {
            start_id: self.start_id.clone(),
            end_id: self.end_id.clone(),
            cursor: self.cursor.clone(),
            limit: self.limit,
            reverse: self.reverse,
            batch_size: self.batch_size,
            consistency: self.consistency,
            filter: self.filter.as_ref().map(Arc::clone),
        }
    }
}

impl<T> ListOptions<T> {
    pub(crate) fn matches(&self, document: &Document<T>) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(document))
    }
}

///
/// ListResult
///

#[derive(Clone, Debug)]
pub struct ListResult<T> {
    pub documents: Vec<Document<T>>,
    /// Continuation token; present when the page filled its limit.
    pub cursor: Option<String>,
}

///
/// RawListPage
/// (internal pagination plumbing shared by every enumeration surface)
///

pub(crate) struct RawListPage {
    pub entries: Vec<(Key, StoreValue, Versionstamp)>,
    pub cursor: Option<String>,
}

/// One paged, cursor-aware prefix scan over `prefix`.
///
/// `start_id` / `end_id` bound the trailing part; the cursor resumes after
/// (forward) or before (reverse) the encoded part.
pub(crate) fn list_raw<T, S: Store>(
    store: &S,
    prefix: Key,
    options: &ListOptions<T>,
) -> Result<RawListPage, Error> {
    let mut start = options
        .start_id
        .as_ref()
        .map(|id| prefix.extend([id.clone()]));
    let mut end = options.end_id.as_ref().map(|id| prefix.extend([id.clone()]));

    if let Some(token) = &options.cursor {
        let part = cursor::decode_cursor(token)?;
        if options.reverse {
            // exclusive end: the cursor entry itself was already returned
            end = Some(prefix.extend([part]));
        } else {
            // smallest possible extension; skips the cursor entry, keeps
            // every later sibling
            start = Some(prefix.extend([part]).extend([KeyPart::Bytes(Vec::new())]));
        }
    }

    let selector = ListSelector {
        prefix,
        start,
        end,
    };
    let store_options = StoreListOptions {
        limit: options.limit,
        reverse: options.reverse,
        batch_size: options.batch_size,
        consistency: options.consistency,
    };
    let entries = store.list(&selector, &store_options)?;

    let cursor = match (options.limit, entries.last()) {
        (Some(limit), Some((key, _))) if entries.len() == limit => {
            key.last().map(cursor::encode_cursor)
        }
        _ => None,
    };

    let entries = entries
        .into_iter()
        .filter_map(|(key, entry)| {
            entry
                .into_present()
                .map(|(value, versionstamp)| (key, value, versionstamp))
        })
        .collect();

    Ok(RawListPage { entries, cursor })
}

///
/// Collection
///
/// CRUD plus ordered enumeration for ordinary single-key documents. Rooted
/// at `[root, ...path]`; document entries live under the `"id"` marker.
///

pub struct Collection<T, S> {
    store: Arc<S>,
    key: Key,
    options: CollectionOptions<T>,
}

impl<T, S> Clone for Collection<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            options: self.options.clone(),
        }
    }
}

impl<T, S> Collection<T, S> {
    pub fn new(store: Arc<S>, path: &[&str], options: CollectionOptions<T>) -> Self {
        let key = std::iter::once(KVDOC_KEY_PREFIX)
            .chain(path.iter().copied())
            .map(KeyPart::from)
            .collect();

        Self {
            store,
            key,
            options,
        }
    }

    /// The collection's root key; the namespace of everything it stores.
    #[must_use]
    pub const fn key(&self) -> &Key {
        &self.key
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn model(&self) -> &dyn Model<T> {
        &*self.options.model
    }

    pub(crate) fn codec(&self) -> &Arc<dyn DocumentCodec<T>> {
        &self.options.codec
    }

    pub(crate) fn generate_document_id(&self, value: &T) -> DocumentId {
        (self.options.id_generator)(value)
    }

    pub(crate) fn id_key(&self, id: &DocumentId) -> Key {
        self.key
            .extend([KeyPart::from(ID_KEY_PREFIX), id.clone()])
    }

    pub(crate) fn id_prefix(&self) -> Key {
        self.key.extend([KeyPart::from(ID_KEY_PREFIX)])
    }
}

impl<T, S> Collection<T, S>
where
    T: Serialize + DeserializeOwned,
    S: Store,
{
    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn find(&self, id: &DocumentId) -> Result<Option<Document<T>>, Error> {
        let entry = self.store.get(&self.id_key(id))?;

        let Some((value, versionstamp)) = entry.into_present() else {
            return Ok(None);
        };

        Ok(Some(Document {
            id: id.clone(),
            versionstamp,
            value: self.decode_value(&value)?,
        }))
    }

    /// Batched point reads; absent ids are skipped, order follows `ids`.
    pub fn find_many(&self, ids: &[DocumentId]) -> Result<Vec<Document<T>>, Error> {
        let keys: Vec<Key> = ids.iter().map(|id| self.id_key(id)).collect();
        let entries = self.store.get_many(&keys)?;

        let mut documents = Vec::with_capacity(entries.len());
        for (id, entry) in ids.iter().zip(entries) {
            let Some((value, versionstamp)) = entry.into_present() else {
                continue;
            };
            documents.push(Document {
                id: id.clone(),
                versionstamp,
                value: self.decode_value(&value)?,
            });
        }

        Ok(documents)
    }

    pub fn list(&self, options: &ListOptions<T>) -> Result<ListResult<T>, Error> {
        let page = list_raw(self.store(), self.id_prefix(), options)?;

        let mut documents = Vec::with_capacity(page.entries.len());
        for (key, value, versionstamp) in page.entries {
            let Some(id) = key.trailing_id() else {
                continue;
            };
            let document = Document {
                id: id.clone(),
                versionstamp,
                value: self.decode_value(&value)?,
            };
            if options.matches(&document) {
                documents.push(document);
            }
        }

        Ok(ListResult {
            documents,
            cursor: page.cursor,
        })
    }

    pub fn count(&self, options: &ListOptions<T>) -> Result<usize, Error> {
        let mut options = options.clone();
        options.limit = None;
        options.cursor = None;

        if options.filter.is_none() {
            let page = list_raw(self.store(), self.id_prefix(), &options)?;
            return Ok(page.entries.len());
        }

        Ok(self.list(&options)?.documents.len())
    }

    /// Visit each document of one page; returns the continuation cursor.
    pub fn for_each(
        &self,
        options: &ListOptions<T>,
        mut visit: impl FnMut(&Document<T>),
    ) -> Result<Option<String>, Error> {
        let result = self.list(options)?;
        for document in &result.documents {
            visit(document);
        }

        Ok(result.cursor)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert under a fresh generated id; conflicts only on id collision.
    pub fn add(&self, value: T) -> Result<CommitResult, Error> {
        let value = self.model().parse(value)?;
        let id = self.generate_document_id(&value);

        self.insert(&id, &value)
    }

    /// Insert under a caller-supplied id. Without `overwrite` an existing
    /// document conflicts; with it, the prior entry is deleted first.
    pub fn set(
        &self,
        id: &DocumentId,
        value: T,
        options: &SetOptions,
    ) -> Result<CommitResult, Error> {
        let value = self.model().parse(value)?;
        if options.overwrite {
            self.delete(std::slice::from_ref(id))?;
        }

        self.insert(id, &value)
    }

    /// Replace an existing document under its current versionstamp;
    /// `Conflict` when absent or concurrently modified.
    pub fn update(&self, id: &DocumentId, value: T) -> Result<CommitResult, Error> {
        let Some(current) = self.find(id)? else {
            return Ok(CommitResult::Conflict);
        };
        let value = self.model().parse(value)?;

        let key = self.id_key(id);
        let bytes = self.codec().serialize(&value)?;
        let outcome = AtomicBatch::new()
            .check(Check {
                key: key.clone(),
                versionstamp: Some(current.versionstamp),
            })
            .set(key, StoreValue::Bytes(bytes))
            .commit(self.store())?;

        Ok(self.commit_result(id, outcome))
    }

    pub fn delete(&self, ids: &[DocumentId]) -> Result<(), Error> {
        let mutations: Vec<Mutation> = ids
            .iter()
            .map(|id| Mutation::Delete {
                key: self.id_key(id),
            })
            .collect();
        commit_in_batches(self.store(), mutations)?;

        Ok(())
    }

    /// Delete one page of documents; returns the continuation cursor.
    pub fn delete_many(&self, options: &ListOptions<T>) -> Result<Option<String>, Error> {
        let result = self.list(options)?;
        let ids: Vec<DocumentId> = result.documents.iter().map(|doc| doc.id.clone()).collect();
        self.delete(&ids)?;

        Ok(result.cursor)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn insert(&self, id: &DocumentId, value: &T) -> Result<CommitResult, Error> {
        let key = self.id_key(id);
        let bytes = self.codec().serialize(value)?;

        let outcome = AtomicBatch::new()
            .check(Check {
                key: key.clone(),
                versionstamp: None,
            })
            .set(key, StoreValue::Bytes(bytes))
            .commit(self.store())?;

        Ok(self.commit_result(id, outcome))
    }

    pub(crate) fn commit_result(&self, id: &DocumentId, outcome: CommitOutcome) -> CommitResult {
        match outcome {
            CommitOutcome::Committed { versionstamp } => CommitResult::Committed {
                id: id.clone(),
                versionstamp,
            },
            CommitOutcome::Conflict => CommitResult::Conflict,
        }
    }

    /// Decode a stored value into `T`.
    ///
    /// Counter documents created by `sum` live as native `U64` values and
    /// decode through their JSON number form.
    pub(crate) fn decode_value(&self, value: &StoreValue) -> Result<T, Error> {
        let decoded = match value {
            StoreValue::Bytes(bytes) => self.codec().deserialize(bytes)?,
            StoreValue::Text(text) => self.codec().deserialize(text.as_bytes())?,
            StoreValue::U64(number) => serde_json::from_value(serde_json::Value::from(*number))
                .map_err(SerializeError::decode)?,
        };

        Ok(decoded)
    }
}
