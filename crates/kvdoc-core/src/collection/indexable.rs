use crate::{
    DOCUMENT_ID_FIELD, PRIMARY_INDEX_KEY_PREFIX, SECONDARY_INDEX_KEY_PREFIX,
    collection::{Collection, CollectionOptions, ListOptions, ListResult, SetOptions, list_raw},
    document::{CommitResult, Document, DocumentId},
    error::Error,
    key::{Key, KeyPart},
    serialize::SerializeError,
    store::{AtomicBatch, Check, Mutation, StoreValue, Store},
};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

///
/// IndexKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexKind {
    /// Unique; a duplicate field value fails the whole commit.
    Primary,
    /// Non-unique; one entry per matching document.
    Secondary,
}

///
/// IndexableCollection
///
/// A collection that maintains primary (unique) and secondary (non-unique)
/// index entries synchronously with every document write. Index entries are
/// created and destroyed in the same atomic batch as the owning document.
///
/// Deliberately not `Deref` to [`Collection`]: the base write paths skip
/// index maintenance and must stay unreachable here.
///

pub struct IndexableCollection<T, S> {
    inner: Collection<T, S>,
    primary_index_list: Vec<String>,
    secondary_index_list: Vec<String>,
}

impl<T, S> Clone for IndexableCollection<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            primary_index_list: self.primary_index_list.clone(),
            secondary_index_list: self.secondary_index_list.clone(),
        }
    }
}

impl<T, S> IndexableCollection<T, S> {
    pub fn new(
        store: Arc<S>,
        path: &[&str],
        options: CollectionOptions<T>,
        indices: &[(&str, IndexKind)],
    ) -> Self {
        let mut primary_index_list = Vec::new();
        let mut secondary_index_list = Vec::new();
        for (field, kind) in indices {
            match kind {
                IndexKind::Primary => primary_index_list.push((*field).to_string()),
                IndexKind::Secondary => secondary_index_list.push((*field).to_string()),
            }
        }

        Self {
            inner: Collection::new(store, path, options),
            primary_index_list,
            secondary_index_list,
        }
    }

    #[must_use]
    pub const fn key(&self) -> &Key {
        self.inner.key()
    }

    #[must_use]
    pub fn primary_index_list(&self) -> &[String] {
        &self.primary_index_list
    }

    #[must_use]
    pub fn secondary_index_list(&self) -> &[String] {
        &self.secondary_index_list
    }

    pub(crate) const fn base(&self) -> &Collection<T, S> {
        &self.inner
    }
}

impl<T, S> IndexableCollection<T, S>
where
    T: Serialize + DeserializeOwned,
    S: Store,
{
    // ------------------------------------------------------------------
    // Reads (index-agnostic; delegated)
    // ------------------------------------------------------------------

    pub fn find(&self, id: &DocumentId) -> Result<Option<Document<T>>, Error> {
        self.inner.find(id)
    }

    pub fn find_many(&self, ids: &[DocumentId]) -> Result<Vec<Document<T>>, Error> {
        self.inner.find_many(ids)
    }

    pub fn list(&self, options: &ListOptions<T>) -> Result<ListResult<T>, Error> {
        self.inner.list(options)
    }

    pub fn count(&self, options: &ListOptions<T>) -> Result<usize, Error> {
        self.inner.count(options)
    }

    pub fn for_each(
        &self,
        options: &ListOptions<T>,
        visit: impl FnMut(&Document<T>),
    ) -> Result<Option<String>, Error> {
        self.inner.for_each(options, visit)
    }

    // ------------------------------------------------------------------
    // Index lookups
    // ------------------------------------------------------------------

    /// Unique lookup via the primary index.
    ///
    /// The index entry embeds the owning document, so no second fetch is
    /// issued. After a crash between a delete commit and its index cleanup
    /// the entry may be stale; callers needing certainty re-`find` the id.
    pub fn find_by_primary_index(
        &self,
        field: &str,
        value: &KeyPart,
    ) -> Result<Option<Document<T>>, Error> {
        let key = primary_index_key(self.inner.key(), field, value);
        let entry = self.inner.store().get(&key)?;

        let Some((stored, versionstamp)) = entry.into_present() else {
            return Ok(None);
        };

        let (id, value) = decode_primary_entry(&stored)?;
        Ok(Some(Document {
            id,
            versionstamp,
            value,
        }))
    }

    /// Enumerate every document whose `field` equals `value`, ordered by id.
    pub fn find_by_secondary_index(
        &self,
        field: &str,
        value: &KeyPart,
        options: &ListOptions<T>,
    ) -> Result<ListResult<T>, Error> {
        let prefix = secondary_index_prefix(self.inner.key(), field, value);
        let page = list_raw(self.inner.store(), prefix, options)?;

        let mut documents = Vec::with_capacity(page.entries.len());
        for (key, stored, versionstamp) in page.entries {
            let Some(id) = key.last() else {
                continue;
            };
            let document = Document {
                id: id.clone(),
                versionstamp,
                value: self.inner.decode_value(&stored)?,
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

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub fn add(&self, value: T) -> Result<CommitResult, Error> {
        let value = self.inner.model().parse(value)?;
        let id = self.inner.generate_document_id(&value);

        self.insert(&id, &value)
    }

    pub fn set(
        &self,
        id: &DocumentId,
        value: T,
        options: &SetOptions,
    ) -> Result<CommitResult, Error> {
        let value = self.inner.model().parse(value)?;
        if options.overwrite {
            self.delete(std::slice::from_ref(id))?;
        }

        self.insert(id, &value)
    }

    /// Replace an existing document and its index entries.
    ///
    /// Index entries are keyed by field value, so the prior entries are
    /// removed first and the replacement lands in a second batch.
    pub fn update(&self, id: &DocumentId, value: T) -> Result<CommitResult, Error> {
        if self.inner.find(id)?.is_none() {
            return Ok(CommitResult::Conflict);
        }
        let value = self.inner.model().parse(value)?;

        self.delete(std::slice::from_ref(id))?;
        self.insert(id, &value)
    }

    /// Delete documents together with their index entries, one batch per id.
    pub fn delete(&self, ids: &[DocumentId]) -> Result<(), Error> {
        for id in ids {
            let id_key = self.inner.id_key(id);
            let entry = self.inner.store().get(&id_key)?;
            let Some((stored, _)) = entry.into_present() else {
                continue;
            };

            let json = self.document_json(&stored)?;
            let mut batch = AtomicBatch::new().delete(id_key);
            for key in index_delete_keys(
                self.inner.key(),
                &self.primary_index_list,
                &self.secondary_index_list,
                id,
                &json,
            ) {
                batch = batch.delete(key);
            }
            let _ = batch.commit(self.inner.store())?;
        }

        Ok(())
    }

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
        let bytes = self.inner.codec().serialize(value)?;
        let json = document_to_json(value)?;
        let (checks, mutations) = index_insert_ops(
            self.inner.key(),
            &self.primary_index_list,
            &self.secondary_index_list,
            id,
            &json,
            &bytes,
        )?;

        let id_key = self.inner.id_key(id);
        let mut batch = AtomicBatch::new()
            .check(Check {
                key: id_key.clone(),
                versionstamp: None,
            })
            .set(id_key, StoreValue::Bytes(bytes));
        for check in checks {
            batch = batch.check(check);
        }
        let outcome = batch.mutate(mutations).commit(self.inner.store())?;

        Ok(self.inner.commit_result(id, outcome))
    }

    /// Decode a stored document into its JSON form for index-key
    /// computation; codec-independent.
    pub(crate) fn document_json(&self, stored: &StoreValue) -> Result<serde_json::Value, Error> {
        let value = self.inner.decode_value(stored)?;
        document_to_json(&value)
    }
}

// ----------------------------------------------------------------------
// Index key layout and fragment computation
//
// Free functions so the atomic builder can synthesize the same fragments
// and cleanup keys without a typed collection handle.
// ----------------------------------------------------------------------

pub(crate) fn primary_index_key(collection_key: &Key, field: &str, value: &KeyPart) -> Key {
    collection_key.extend([
        KeyPart::from(PRIMARY_INDEX_KEY_PREFIX),
        KeyPart::from(field),
        value.clone(),
    ])
}

pub(crate) fn secondary_index_prefix(collection_key: &Key, field: &str, value: &KeyPart) -> Key {
    collection_key.extend([
        KeyPart::from(SECONDARY_INDEX_KEY_PREFIX),
        KeyPart::from(field),
        value.clone(),
    ])
}

pub(crate) fn secondary_index_key(
    collection_key: &Key,
    field: &str,
    value: &KeyPart,
    id: &DocumentId,
) -> Key {
    secondary_index_prefix(collection_key, field, value).extend([id.clone()])
}

pub(crate) fn document_to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|err| SerializeError::encode(err).into())
}

fn indexed_part(
    fields: Option<&serde_json::Map<String, serde_json::Value>>,
    field: &str,
) -> Result<Option<KeyPart>, Error> {
    let Some(value) = fields.and_then(|map| map.get(field)) else {
        return Ok(None);
    };

    KeyPart::from_json(value).map_err(|source| Error::IndexValue {
        field: field.to_string(),
        source,
    })
}

/// Index fragments for one document write: a `None`-versionstamp check plus
/// a `set` per defined indexed field. The primary check is the uniqueness
/// gate; the secondary check is a guard against corrupted state.
pub(crate) fn index_insert_ops(
    collection_key: &Key,
    primary: &[String],
    secondary: &[String],
    id: &DocumentId,
    doc_json: &serde_json::Value,
    doc_bytes: &[u8],
) -> Result<(Vec<Check>, Vec<Mutation>), Error> {
    let fields = doc_json.as_object();
    let mut checks = Vec::new();
    let mut mutations = Vec::new();

    for field in primary {
        let Some(part) = indexed_part(fields, field)? else {
            continue;
        };
        let key = primary_index_key(collection_key, field, &part);
        let entry = primary_entry_bytes(doc_json, id)?;
        checks.push(Check {
            key: key.clone(),
            versionstamp: None,
        });
        mutations.push(Mutation::Set {
            key,
            value: StoreValue::Bytes(entry),
        });
    }

    for field in secondary {
        let Some(part) = indexed_part(fields, field)? else {
            continue;
        };
        let key = secondary_index_key(collection_key, field, &part, id);
        checks.push(Check {
            key: key.clone(),
            versionstamp: None,
        });
        mutations.push(Mutation::Set {
            key,
            value: StoreValue::Bytes(doc_bytes.to_vec()),
        });
    }

    Ok((checks, mutations))
}

/// Every index key a stored document owns, derived from its captured JSON.
///
/// Fields that never produced an entry (absent, null) contribute nothing;
/// the document passed write-time validation, so scalar extraction cannot
/// fail here.
pub(crate) fn index_delete_keys(
    collection_key: &Key,
    primary: &[String],
    secondary: &[String],
    id: &DocumentId,
    doc_json: &serde_json::Value,
) -> Vec<Key> {
    let fields = doc_json.as_object();
    let mut keys = Vec::new();

    for field in primary {
        if let Ok(Some(part)) = indexed_part(fields, field) {
            keys.push(primary_index_key(collection_key, field, &part));
        }
    }
    for field in secondary {
        if let Ok(Some(part)) = indexed_part(fields, field) {
            keys.push(secondary_index_key(collection_key, field, &part, id));
        }
    }

    keys
}

/// A primary-index entry: the document's own fields plus the embedded owner
/// id. Always JSON, independent of the collection codec.
fn primary_entry_bytes(doc_json: &serde_json::Value, id: &DocumentId) -> Result<Vec<u8>, Error> {
    let mut object = doc_json.as_object().cloned().unwrap_or_default();
    let id_value = serde_json::to_value(id).map_err(SerializeError::encode)?;
    object.insert(DOCUMENT_ID_FIELD.to_string(), id_value);

    serde_json::to_vec(&serde_json::Value::Object(object))
        .map_err(|err| SerializeError::encode(err).into())
}

fn decode_primary_entry<T: DeserializeOwned>(stored: &StoreValue) -> Result<(DocumentId, T), Error> {
    let bytes = stored
        .as_bytes()
        .ok_or_else(|| SerializeError::decode("primary index entry is not a serialized document"))?;
    let mut object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(bytes).map_err(SerializeError::decode)?;

    let id_value = object
        .remove(DOCUMENT_ID_FIELD)
        .ok_or_else(|| SerializeError::decode("primary index entry missing owner id"))?;
    let id: DocumentId = serde_json::from_value(id_value).map_err(SerializeError::decode)?;
    let value: T = serde_json::from_value(serde_json::Value::Object(object))
        .map_err(SerializeError::decode)?;

    Ok((id, value))
}

///
/// TESTS
///
