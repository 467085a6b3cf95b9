use crate::{
    LARGE_COLLECTION_STRING_LIMIT, SEGMENT_KEY_PREFIX,
    collection::{Collection, CollectionOptions, ListOptions, ListResult, SetOptions, list_raw},
    document::{CommitResult, Document, DocumentId},
    error::Error,
    key::{Key, KeyPart},
    store::{AtomicBatch, Check, Mutation, Store, StoreValue, commit_in_batches},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use thiserror::Error as ThisError;
use tracing::{debug, warn};

///
/// CorruptedDocumentDataError
/// (read boundary; fatal)
///
/// A manifest that cannot be honored is corruption, never "not found":
/// absence of the manifest itself is the only shape of absence.
///

#[derive(Debug, ThisError)]
pub enum CorruptedDocumentDataError {
    #[error("document {id} is missing segment {index}")]
    MissingSegment { id: String, index: u64 },

    #[error("document {id} segment {index} holds a non-text value")]
    SegmentNotText { id: String, index: u64 },

    #[error("document {id} manifest is invalid: {message}")]
    InvalidManifest { id: String, message: String },

    #[error("document {id} payload failed to decode: {message}")]
    Decode { id: String, message: String },
}

///
/// SegmentManifest
///
/// The id-key value of a large document: segment indices in insertion
/// order. The payload is the ordered concatenation of the segment strings.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct SegmentManifest {
    ids: Vec<u64>,
}

///
/// LargeCollection
///
/// Documents whose serialized form may exceed the store's per-value limit.
/// The JSON encoding is sliced into bounded segments; the manifest at the
/// id-key is written last so readers observe either the prior document (or
/// absence) or the new one, never a partial payload.
///

pub struct LargeCollection<T, S> {
    inner: Collection<T, S>,
}

impl<T, S> Clone for LargeCollection<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, S> LargeCollection<T, S> {
    pub fn new(store: Arc<S>, path: &[&str], options: CollectionOptions<T>) -> Self {
        Self {
            inner: Collection::new(store, path, options),
        }
    }

    #[must_use]
    pub const fn key(&self) -> &Key {
        self.inner.key()
    }

    fn segment_key(&self, id: &DocumentId, index: u64) -> Key {
        self.inner.key().extend([
            KeyPart::from(SEGMENT_KEY_PREFIX),
            id.clone(),
            KeyPart::BigInt(i128::from(index)),
        ])
    }
}

impl<T, S> LargeCollection<T, S>
where
    T: Serialize + DeserializeOwned,
    S: Store,
{
    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn find(&self, id: &DocumentId) -> Result<Option<Document<T>>, Error> {
        let entry = self.inner.store().get(&self.inner.id_key(id))?;

        let Some((stored, versionstamp)) = entry.into_present() else {
            return Ok(None);
        };

        let manifest = decode_manifest(id, &stored)?;
        let value = self.reconstruct(id, &manifest)?;

        Ok(Some(Document {
            id: id.clone(),
            versionstamp,
            value,
        }))
    }

    pub fn find_many(&self, ids: &[DocumentId]) -> Result<Vec<Document<T>>, Error> {
        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(document) = self.find(id)? {
                documents.push(document);
            }
        }

        Ok(documents)
    }

    pub fn list(&self, options: &ListOptions<T>) -> Result<ListResult<T>, Error> {
        let page = list_raw(self.inner.store(), self.inner.id_prefix(), options)?;

        let mut documents = Vec::with_capacity(page.entries.len());
        for (key, stored, versionstamp) in page.entries {
            let Some(id) = key.trailing_id() else {
                continue;
            };
            let manifest = decode_manifest(id, &stored)?;
            let document = Document {
                id: id.clone(),
                versionstamp,
                value: self.reconstruct(id, &manifest)?,
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
            let page = list_raw(self.inner.store(), self.inner.id_prefix(), &options)?;
            return Ok(page.entries.len());
        }

        Ok(self.list(&options)?.documents.len())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub fn add(&self, value: T, options: &SetOptions) -> Result<CommitResult, Error> {
        let value = self.inner.model().parse(value)?;
        let id = self.inner.generate_document_id(&value);

        self.set_document(&id, &value, false, options.retry)
    }

    pub fn set(
        &self,
        id: &DocumentId,
        value: T,
        options: &SetOptions,
    ) -> Result<CommitResult, Error> {
        let value = self.inner.model().parse(value)?;

        self.set_document(id, &value, options.overwrite, options.retry)
    }

    /// Remove manifests first, then their segments; a reader racing a
    /// delete sees plain absence, never corruption.
    pub fn delete(&self, ids: &[DocumentId]) -> Result<(), Error> {
        for id in ids {
            let id_key = self.inner.id_key(id);
            let entry = self.inner.store().get(&id_key)?;
            let Some((stored, _)) = entry.into_present() else {
                continue;
            };
            let manifest = decode_manifest(id, &stored)?;

            self.inner.store().delete(&id_key)?;
            self.remove_segments(id, &manifest.ids)?;
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

    fn set_document(
        &self,
        id: &DocumentId,
        value: &T,
        overwrite: bool,
        retry: u32,
    ) -> Result<CommitResult, Error> {
        let id_key = self.inner.id_key(id);

        // Probe the identity key before paying for segment writes.
        let probe = AtomicBatch::new()
            .check(Check {
                key: id_key.clone(),
                versionstamp: None,
            })
            .commit(self.inner.store())?;
        if !probe.is_committed() {
            if !overwrite {
                return Ok(CommitResult::Conflict);
            }
            self.delete(std::slice::from_ref(id))?;
        }

        let payload =
            serde_json::to_string(value).map_err(crate::serialize::SerializeError::encode)?;
        let segments = chunk_utf8(&payload, LARGE_COLLECTION_STRING_LIMIT);
        debug!(id = %id, segments = segments.len(), "writing large document");

        let mut attempts_left = retry;
        loop {
            let result = self.write_once(id, &id_key, &segments)?;
            if result.is_committed() {
                return Ok(result);
            }

            // Tear down whatever landed before deciding on a retry.
            self.remove_segment_range(id, segments.len() as u64)?;
            if attempts_left == 0 {
                return Ok(CommitResult::Conflict);
            }
            attempts_left -= 1;
            warn!(id = %id, attempts_left, "large document write failed; retrying");
        }
    }

    /// One attempt: all segment batches, then the manifest.
    fn write_once(
        &self,
        id: &DocumentId,
        id_key: &Key,
        segments: &[String],
    ) -> Result<CommitResult, Error> {
        let mutations: Vec<Mutation> = segments
            .iter()
            .enumerate()
            .map(|(index, text)| Mutation::Set {
                key: self.segment_key(id, index as u64),
                value: StoreValue::Text(text.clone()),
            })
            .collect();

        let outcomes = commit_in_batches(self.inner.store(), mutations)?;
        if outcomes.iter().any(|outcome| !outcome.is_committed()) {
            return Ok(CommitResult::Conflict);
        }

        let manifest = SegmentManifest {
            ids: (0..segments.len() as u64).collect(),
        };
        let bytes =
            serde_json::to_vec(&manifest).map_err(crate::serialize::SerializeError::encode)?;

        let outcome = AtomicBatch::new()
            .check(Check {
                key: id_key.clone(),
                versionstamp: None,
            })
            .set(id_key.clone(), StoreValue::Bytes(bytes))
            .commit(self.inner.store())?;

        Ok(self.inner.commit_result(id, outcome))
    }

    fn reconstruct(&self, id: &DocumentId, manifest: &SegmentManifest) -> Result<T, Error> {
        let keys: Vec<Key> = manifest
            .ids
            .iter()
            .map(|index| self.segment_key(id, *index))
            .collect();
        let entries = self.inner.store().get_many(&keys)?;

        let mut payload = String::new();
        for (index, entry) in manifest.ids.iter().zip(entries) {
            let Some(value) = entry.value else {
                return Err(CorruptedDocumentDataError::MissingSegment {
                    id: id.to_string(),
                    index: *index,
                }
                .into());
            };
            let Some(text) = value.as_text() else {
                return Err(CorruptedDocumentDataError::SegmentNotText {
                    id: id.to_string(),
                    index: *index,
                }
                .into());
            };
            payload.push_str(text);
        }

        serde_json::from_str(&payload).map_err(|err| {
            CorruptedDocumentDataError::Decode {
                id: id.to_string(),
                message: err.to_string(),
            }
            .into()
        })
    }

    fn remove_segments(&self, id: &DocumentId, indices: &[u64]) -> Result<(), Error> {
        let mutations: Vec<Mutation> = indices
            .iter()
            .map(|index| Mutation::Delete {
                key: self.segment_key(id, *index),
            })
            .collect();
        commit_in_batches(self.inner.store(), mutations)?;

        Ok(())
    }

    fn remove_segment_range(&self, id: &DocumentId, count: u64) -> Result<(), Error> {
        let indices: Vec<u64> = (0..count).collect();
        self.remove_segments(id, &indices)
    }
}

fn decode_manifest(id: &DocumentId, stored: &StoreValue) -> Result<SegmentManifest, Error> {
    let bytes = stored
        .as_bytes()
        .ok_or_else(|| CorruptedDocumentDataError::InvalidManifest {
            id: id.to_string(),
            message: "manifest is not a serialized value".to_string(),
        })?;

    serde_json::from_slice(bytes).map_err(|err| {
        CorruptedDocumentDataError::InvalidManifest {
            id: id.to_string(),
            message: err.to_string(),
        }
        .into()
    })
}

/// Slice a payload into chunks of at most `limit` bytes on char boundaries.
fn chunk_utf8(payload: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = payload;

    while !rest.is_empty() {
        let mut end = limit.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // limit smaller than one char: emit the char whole
            end = rest
                .char_indices()
                .nth(1)
                .map_or(rest.len(), |(offset, _)| offset);
        }

        let (head, tail) = rest.split_at(end);
        chunks.push(head.to_string());
        rest = tail;
    }

    chunks
}

///
/// TESTS
///
