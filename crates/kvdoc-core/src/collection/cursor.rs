//! Continuation tokens for paged enumeration.
//!
//! A token names the trailing key part of the last entry a page returned,
//! serialized and spelled as lowercase hex. Callers hand tokens back
//! verbatim; nothing else in the crate inspects them.

use crate::{error::Error, key::KeyPart, serialize};

/// Build a continuation token from a trailing key part.
#[must_use]
pub fn encode_cursor(part: &KeyPart) -> String {
    serialize::serialize(part)
        .unwrap_or_default()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Recover the key part a continuation token names.
///
/// Surrounding whitespace is tolerated; anything else that is not the hex
/// spelling of a serialized key part is rejected.
pub fn decode_cursor(token: &str) -> Result<KeyPart, Error> {
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::InvalidCursor(
            "continuation token is empty".to_string(),
        ));
    }
    if !token.is_ascii() || !token.len().is_multiple_of(2) {
        return Err(Error::InvalidCursor(
            "continuation token is not a hex-spelled key part".to_string(),
        ));
    }

    let bytes = (0..token.len())
        .step_by(2)
        .map(|at| u8::from_str_radix(&token[at..at + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| {
            Error::InvalidCursor("continuation token is not a hex-spelled key part".to_string())
        })?;

    serialize::deserialize(&bytes).map_err(|err| {
        Error::InvalidCursor(format!("continuation token names no key part: {err}"))
    })
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrip() {
        let part = KeyPart::from("01J0ABCDEF");
        let token = encode_cursor(&part);
        let decoded = decode_cursor(&token).unwrap();

        assert_eq!(part, decoded);
    }

    #[test]
    fn whitespace_is_tolerated() {
        let token = format!("  {}  ", encode_cursor(&KeyPart::Int(7)));

        assert_eq!(decode_cursor(&token).unwrap(), KeyPart::Int(7));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(decode_cursor("").is_err());
        assert!(decode_cursor("abc").is_err());
        assert!(decode_cursor("zz").is_err());
        assert!(decode_cursor("猫猫").is_err());
    }
}
