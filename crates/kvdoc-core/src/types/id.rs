use derive_more::{Deref, Display};
use serde::{Deserialize, Serialize};
use std::sync::{LazyLock, Mutex};
use thiserror::Error as ThisError;
use ulid::Ulid as WrappedUlid;

///
/// GENERATOR is lazily initiated with a Mutex
/// it has to keep state so that generated ids stay time-ordered
///

static GENERATOR: LazyLock<Mutex<ulid::Generator>> =
    LazyLock::new(|| Mutex::new(ulid::Generator::new()));

///
/// UlidError
///

#[derive(Debug, ThisError)]
pub enum UlidError {
    #[error("invalid ulid string")]
    InvalidString,

    #[error("monotonic error - overflow")]
    GeneratorOverflow,
}

///
/// Ulid
///
/// Time-ordered identifier; the default document id. Ids generated within
/// the same millisecond increment monotonically so key order follows
/// creation order.
///

#[derive(
    Clone, Copy, Debug, Deref, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Ulid(WrappedUlid);

impl Ulid {
    #[must_use]
    pub const fn nil() -> Self {
        Self(WrappedUlid::nil())
    }

    #[must_use]
    pub const fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        Self(WrappedUlid::from_parts(timestamp_ms, random))
    }

    /// Generate a ULID from the global monotonic generator.
    ///
    /// Falls back to nil on generator overflow.
    #[must_use]
    pub fn generate() -> Self {
        Self::try_generate().unwrap_or_else(|_| Self::nil())
    }

    /// Monotonic generation; increments within the same millisecond.
    pub fn try_generate() -> Result<Self, UlidError> {
        let mut generator = GENERATOR.lock().expect("ulid generator mutex poisoned");

        generator
            .generate()
            .map(Self)
            .map_err(|_| UlidError::GeneratorOverflow)
    }

    pub fn try_from_str(text: &str) -> Result<Self, UlidError> {
        WrappedUlid::from_string(text)
            .map(Self)
            .map_err(|_| UlidError::InvalidString)
    }
}

impl From<WrappedUlid> for Ulid {
    fn from(value: WrappedUlid) -> Self {
        Self(value)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_monotonic() {
        let a = Ulid::generate();
        let b = Ulid::generate();

        assert!(a < b);
    }

    #[test]
    fn string_roundtrip() {
        let id = Ulid::generate();
        let parsed = Ulid::try_from_str(&id.to_string()).unwrap();

        assert_eq!(id, parsed);
    }

    #[test]
    fn invalid_strings_are_rejected() {
        assert!(matches!(
            Ulid::try_from_str("not-a-ulid"),
            Err(UlidError::InvalidString)
        ));
    }
}
