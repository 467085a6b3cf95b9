use crate::{document::DocumentId, key::KeyPart, types::Ulid};
use std::sync::Arc;
use thiserror::Error as ThisError;

///
/// ValidationError
///
/// Raised by a model's `parse`; aborts the enclosing operation before any
/// store I/O.
///

#[derive(Debug, ThisError)]
#[error("validation failed: {0}")]
pub struct ValidationError(String);

impl ValidationError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

///
/// Model
///
/// Validates and normalizes a candidate value before it is written.
///

pub trait Model<T>: Send + Sync {
    fn parse(&self, value: T) -> Result<T, ValidationError>;
}

///
/// PassthroughModel
///

#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughModel;

impl<T> Model<T> for PassthroughModel {
    fn parse(&self, value: T) -> Result<T, ValidationError> {
        Ok(value)
    }
}

/// Per-collection id factory; receives the parsed value.
pub type IdGenerator<T> = Arc<dyn Fn(&T) -> DocumentId + Send + Sync>;

/// The default id: a time-ordered ULID string.
#[must_use]
pub fn generate_id() -> DocumentId {
    KeyPart::String(Ulid::generate().to_string())
}

///
/// TESTS
///
