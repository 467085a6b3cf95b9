use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Display;
use thiserror::Error as ThisError;

///
/// SerializeError
/// (codec boundary)
///

#[derive(Debug, ThisError)]
pub enum SerializeError {
    #[error("value could not be encoded: {0}")]
    Encode(String),

    #[error("stored bytes could not be decoded: {0}")]
    Decode(String),
}

impl SerializeError {
    pub(crate) fn encode(reason: impl Display) -> Self {
        Self::Encode(reason.to_string())
    }

    pub(crate) fn decode(reason: impl Display) -> Self {
        Self::Decode(reason.to_string())
    }
}

/// Encode a value in the crate's wire format.
///
/// Documents, manifests, index entries, and cursor payloads all pass
/// through here unless a collection installs its own codec.
pub fn serialize<T>(value: &T) -> Result<Vec<u8>, SerializeError>
where
    T: Serialize,
{
    serde_json::to_vec(value).map_err(SerializeError::encode)
}

/// Decode bytes written by [`serialize`].
pub fn deserialize<T>(bytes: &[u8]) -> Result<T, SerializeError>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(bytes).map_err(SerializeError::decode)
}

///
/// DocumentCodec
///
/// Per-collection override for how id-key values are stored. Anything that
/// must stay readable across collections (index entries, manifests) ignores
/// the override and uses the wire format above.
///

pub trait DocumentCodec<T>: Send + Sync {
    fn serialize(&self, value: &T) -> Result<Vec<u8>, SerializeError>;
    fn deserialize(&self, bytes: &[u8]) -> Result<T, SerializeError>;
}

///
/// JsonCodec
///

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl<T> DocumentCodec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T) -> Result<Vec<u8>, SerializeError> {
        serialize(value)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T, SerializeError> {
        deserialize(bytes)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_roundtrips() {
        let value = vec![1u32, 2, 3];
        let bytes = serialize(&value).unwrap();
        let decoded: Vec<u32> = deserialize(&bytes).unwrap();

        assert_eq!(value, decoded);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = deserialize::<Vec<u32>>(b"not json").unwrap_err();

        assert!(matches!(err, SerializeError::Decode(_)));
    }
}
