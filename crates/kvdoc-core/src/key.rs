use crate::ID_KEY_PREFIX;
use derive_more::Deref;
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt::{self, Display},
    hash::{Hash, Hasher},
};
use thiserror::Error as ThisError;

///
/// InvalidKeyPart
/// (extraction boundary)
///

#[derive(Debug, ThisError)]
#[error("{kind} values are not valid key parts")]
pub struct InvalidKeyPart {
    pub kind: &'static str,
}

///
/// KeyPart
///
/// A single scalar segment of a composite key. Parts order by variant rank
/// first, then by natural ordering inside a variant; floats compare by
/// `total_cmp`, so every part participates in a total order.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum KeyPart {
    Bytes(Vec<u8>),
    String(String),
    Int(i64),
    Float(f64),
    BigInt(i128),
    Bool(bool),
}

impl KeyPart {
    const fn rank(&self) -> u8 {
        match self {
            Self::Bytes(_) => 0,
            Self::String(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::BigInt(_) => 4,
            Self::Bool(_) => 5,
        }
    }

    /// Extract a key part from a JSON scalar.
    ///
    /// `Null` maps to `None` (indexes are sparse over absent values);
    /// arrays and objects are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Option<Self>, InvalidKeyPart> {
        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Bool(flag) => Ok(Some(Self::Bool(*flag))),
            serde_json::Value::Number(number) => {
                let part = if let Some(int) = number.as_i64() {
                    Self::Int(int)
                } else if let Some(uint) = number.as_u64() {
                    Self::BigInt(i128::from(uint))
                } else {
                    Self::Float(number.as_f64().unwrap_or(f64::NAN))
                };
                Ok(Some(part))
            }
            serde_json::Value::String(text) => Ok(Some(Self::String(text.clone()))),
            serde_json::Value::Array(_) => Err(InvalidKeyPart { kind: "array" }),
            serde_json::Value::Object(_) => Err(InvalidKeyPart { kind: "object" }),
        }
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::BigInt(a), Self::BigInt(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl Hash for KeyPart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.rank());
        match self {
            Self::Bytes(bytes) => bytes.hash(state),
            Self::String(text) => text.hash(state),
            Self::Int(int) => int.hash(state),
            // consistent with `total_cmp` equality
            Self::Float(float) => float.to_bits().hash(state),
            Self::BigInt(int) => int.hash(state),
            Self::Bool(flag) => flag.hash(state),
        }
    }
}

impl Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "0x{}", hex(bytes)),
            Self::String(text) => write!(f, "{text}"),
            Self::Int(int) => write!(f, "{int}"),
            Self::Float(float) => write!(f, "{float}"),
            Self::BigInt(int) => write!(f, "{int}"),
            Self::Bool(flag) => write!(f, "{flag}"),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i128> for KeyPart {
    fn from(value: i128) -> Self {
        Self::BigInt(value)
    }
}

impl From<f64> for KeyPart {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<u8>> for KeyPart {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

///
/// Key
///
/// An ordered sequence of parts. Keys compare lexicographically part-wise
/// and are the sole namespace mechanism; they are immutable values and are
/// never mutated in place.
///

#[derive(
    Clone, Debug, Default, Deref, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct Key(Vec<KeyPart>);

impl Key {
    #[must_use]
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Return a new key with `parts` appended.
    #[must_use]
    pub fn extend<I>(&self, parts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<KeyPart>,
    {
        let mut out = self.0.clone();
        out.extend(parts.into_iter().map(Into::into));
        Self(out)
    }

    /// The last part of a key whose penultimate part is the `"id"` marker.
    #[must_use]
    pub fn trailing_id(&self) -> Option<&KeyPart> {
        let [.., marker, id] = self.0.as_slice() else {
            return None;
        };

        (*marker == KeyPart::from(ID_KEY_PREFIX)).then_some(id)
    }

    /// Part-wise prefix test.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl FromIterator<KeyPart> for Key {
    fn from_iter<I: IntoIterator<Item = KeyPart>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.0 {
            if !first {
                write!(f, "/")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

///
/// TESTS
///
