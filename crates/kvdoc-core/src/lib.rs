//! Core runtime for kvdoc: composite keys, the store contract, document
//! collections, index maintenance, and the atomic builder exported via the
//! `prelude`.
pub mod atomic;
pub mod collection;
pub mod document;
pub mod error;
pub mod key;
pub mod model;
pub mod serialize;
pub mod store;
pub mod types;

///
/// CONSTANTS
///

/// Reserved root segment under which all kvdoc data lives.
///
/// Stable across versions; changing it orphans every existing key.
pub const KVDOC_KEY_PREFIX: &str = "__kvdoc__";

/// Marker segment for canonical document entries.
pub const ID_KEY_PREFIX: &str = "id";

/// Marker segment for large-document chunk shards.
pub const SEGMENT_KEY_PREFIX: &str = "segment";

/// Marker segment for unique index entries.
pub const PRIMARY_INDEX_KEY_PREFIX: &str = "primary_index";

/// Marker segment for non-unique index entries.
pub const SECONDARY_INDEX_KEY_PREFIX: &str = "secondary_index";

/// Field embedded in a primary-index entry naming the owning document.
pub const DOCUMENT_ID_FIELD: &str = "__id__";

/// Maximum UTF-8 bytes stored per large-document segment.
///
/// Segments must stay inside the store's per-value limit; the payload is
/// sliced on char boundaries so every segment is valid UTF-8.
pub const LARGE_COLLECTION_STRING_LIMIT: usize = 48 * 1024;

/// Maximum mutations per atomic batch.
///
/// [`store::commit_in_batches`] splits longer mutation lists across as many
/// batches as needed.
pub const ATOMIC_OPERATION_LIMIT: usize = 1000;

///
/// Prelude
///
/// Prelude contains the public vocabulary of the crate: collections,
/// documents, keys, the store contract, and the atomic builder.
///

pub mod prelude {
    pub use crate::{
        atomic::{AtomicBuilder, AtomicCheck, AtomicMutation},
        collection::{
            Collection, CollectionOptions, ListOptions, ListResult, SetOptions,
            indexable::{IndexKind, IndexableCollection},
            large::{CorruptedDocumentDataError, LargeCollection},
        },
        document::{CommitResult, Document, DocumentId},
        error::Error,
        key::{Key, KeyPart},
        model::{Model, PassthroughModel, ValidationError},
        store::{
            AtomicBatch, Check, CommitOutcome, Consistency, Entry, ListSelector, Mutation, Store,
            StoreValue, Versionstamp, memory::MemoryStore,
        },
    };
}
