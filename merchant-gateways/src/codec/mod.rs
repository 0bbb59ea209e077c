//! Wire encodings shared by the adapters.
//!
//! - [`form`]: `application/x-www-form-urlencoded` bodies and query-string replies
//! - [`xml`]: a small XML writer and a reader producing an element tree
//!
//! JSON needs no helpers beyond `serde_json`.

pub mod form;
pub mod xml;

use thiserror::Error;

/// A gateway body could not be decoded.
///
/// Adapters turn this into [`Response::unparsable`](crate::response::Response::unparsable)
/// rather than failing the call.
#[derive(Debug, Error)]
#[error("could not decode {format} body: {message}")]
pub struct DecodeError {
    /// Encoding that failed.
    pub format: &'static str,
    /// Decoder message.
    pub message: String,
}

impl DecodeError {
    pub(crate) fn new(format: &'static str, message: impl ToString) -> Self {
        Self { format, message: message.to_string() }
    }
}

/// Parses a JSON body, mapping failures to [`DecodeError`].
///
/// # Errors
///
/// Returns [`DecodeError`] if the body is not valid JSON.
pub fn json(body: &[u8]) -> Result<serde_json::Value, DecodeError> {
    serde_json::from_slice(body).map_err(|e| DecodeError::new("json", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_decode() {
        assert_eq!(json(br#"{"a":1}"#).unwrap()["a"], 1);
        let err = json(b"<html>").unwrap_err();
        assert_eq!(err.format, "json");
        assert!(err.to_string().starts_with("could not decode json body"));
    }
}
