//! Card verification value (CVV/CVC) result codes.

use serde::{Deserialize, Serialize};

/// Description of a CVV result letter.
#[must_use]
pub fn cvv_message(code: char) -> Option<&'static str> {
    match code {
        'D' => Some("CVV check flagged transaction as suspicious"),
        'I' => Some("CVV failed data validation check"),
        'M' => Some("CVV matches"),
        'N' => Some("CVV does not match"),
        'P' => Some("CVV not processed"),
        'S' => Some("CVV should have been present"),
        'U' => Some("CVV request unable to be processed by issuer"),
        'X' => Some("Card does not support verification"),
        _ => None,
    }
}

/// Decoded CVV answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvvResult {
    /// Upper-cased result letter.
    pub code: Option<String>,
    /// Description.
    pub message: Option<String>,
}

impl CvvResult {
    /// Decodes a CVV letter; blank input yields an empty result.
    #[must_use]
    pub fn new(code: &str) -> Self {
        let code = code.trim().to_ascii_uppercase();
        match code.chars().next() {
            Some(letter) if code.len() == 1 => {
                Self { message: cvv_message(letter).map(str::to_owned), code: Some(code) }
            }
            _ => Self::empty(),
        }
    }

    /// No CVV data.
    #[must_use]
    pub const fn empty() -> Self {
        Self { code: None, message: None }
    }

    /// True when the issuer confirmed the value.
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.code.as_deref() == Some("M")
    }
}
