use crate::{
    collection::large::CorruptedDocumentDataError, key::InvalidKeyPart, model::ValidationError,
    serialize::SerializeError, store::StoreError,
};
use thiserror::Error as ThisError;

///
/// Error
///
/// Crate-level aggregation of the per-boundary errors. Transactional
/// conflicts are never errors; they surface as `Conflict` result values.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Corrupted(#[from] CorruptedDocumentDataError),

    #[error("field {field} cannot be indexed: {source}")]
    IndexValue {
        field: String,
        source: InvalidKeyPart,
    },

    #[error("invalid cursor token: {0}")]
    InvalidCursor(String),
}
