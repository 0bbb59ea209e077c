//! Address verification (AVS) result codes.
//!
//! Card networks answer an address check with a single letter. The table
//! below follows the Visa/Mastercard/Amex union most processors pass through.

use serde::{Deserialize, Serialize};

/// Whether one part of the address matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchCode {
    /// Matched.
    #[serde(rename = "Y")]
    Yes,
    /// Did not match.
    #[serde(rename = "N")]
    No,
    /// Issuer does not support the check.
    #[serde(rename = "X")]
    NotSupported,
}

const STREET_MATCH: &[(MatchCode, &str)] = &[
    (MatchCode::Yes, "ABDHJMOQTVXY"),
    (MatchCode::No, "CKLNWZ"),
    (MatchCode::NotSupported, "GS"),
];

const POSTAL_MATCH: &[(MatchCode, &str)] = &[
    (MatchCode::Yes, "DHFJLMPQVWXYZ"),
    (MatchCode::No, "ACKNO"),
    (MatchCode::NotSupported, "GS"),
];

fn lookup(table: &[(MatchCode, &str)], code: char) -> Option<MatchCode> {
    table.iter().find(|(_, codes)| codes.contains(code)).map(|(m, _)| *m)
}

/// Human description of an AVS letter.
#[must_use]
pub fn avs_message(code: char) -> Option<&'static str> {
    let message = match code {
        'A' => "Street address matches, but postal code does not match.",
        'B' => "Street address matches, but postal code not verified.",
        'C' => "Street address and postal code do not match.",
        'D' | 'M' => "Street address and postal code match.",
        'E' => "AVS data is invalid or AVS is not allowed for this card type.",
        'F' => "Card member's name does not match, but billing postal code matches.",
        'G' => "Non-U.S. issuing bank does not support AVS.",
        'H' => "Card member's name does not match. Street address and postal code match.",
        'I' => "Address not verified.",
        'J' => {
            "Card member's name, billing address, and postal code match. Shipping information \
             verified and chargeback protection guaranteed through the Fraud Protection Program."
        }
        'K' => {
            "Card member's name matches but billing address and billing postal code do not match."
        }
        'L' => {
            "Card member's name and billing postal code match, but billing address does not match."
        }
        'N' => "Street address and postal code do not match.",
        'O' => {
            "Card member's name and billing address match, but billing postal code does not match."
        }
        'P' => "Postal code matches, but street address not verified.",
        'Q' => {
            "Card member's name, billing address, and postal code match. Shipping information \
             verified but chargeback protection not guaranteed."
        }
        'R' => "System unavailable.",
        'S' => "U.S.-issuing bank does not support AVS.",
        'T' => "Card member's name does not match, but street address matches.",
        'U' => "Address information unavailable.",
        'V' => "Card member's name, billing address, and billing postal code match.",
        'W' => "Street address does not match, but 9-digit postal code matches.",
        'X' => "Street address and 9-digit postal code match.",
        'Y' => "Street address and 5-digit postal code match.",
        'Z' => "Street address does not match, but 5-digit postal code matches.",
        _ => return None,
    };
    Some(message)
}

/// Decoded AVS answer.
///
/// # Examples
///
/// ```
/// use merchant_gateways::response::{AvsResult, MatchCode};
///
/// let avs = AvsResult::new("a");
/// assert_eq!(avs.code.as_deref(), Some("A"));
/// assert_eq!(avs.street_match, Some(MatchCode::Yes));
/// assert_eq!(avs.postal_match, Some(MatchCode::No));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvsResult {
    /// Upper-cased AVS letter, `None` when the gateway sent nothing.
    pub code: Option<String>,
    /// Description of the code.
    pub message: Option<String>,
    /// Street line outcome.
    pub street_match: Option<MatchCode>,
    /// Postal code outcome.
    pub postal_match: Option<MatchCode>,
}

impl AvsResult {
    /// Decodes an AVS letter. Blank input yields an empty result.
    #[must_use]
    pub fn new(code: &str) -> Self {
        let code = code.trim().to_ascii_uppercase();
        let Some(letter) = code.chars().next().filter(|_| code.len() == 1) else {
            return Self::empty();
        };
        Self {
            message: avs_message(letter).map(str::to_owned),
            street_match: lookup(STREET_MATCH, letter),
            postal_match: lookup(POSTAL_MATCH, letter),
            code: Some(code),
        }
    }

    /// Builds a result from separate street/postal flags, as returned by
    /// gateways that report the two checks independently.
    #[must_use]
    pub fn from_matches(street: Option<MatchCode>, postal: Option<MatchCode>) -> Self {
        let code = match (street, postal) {
            (Some(MatchCode::Yes), Some(MatchCode::Yes)) => "Y",
            (Some(MatchCode::Yes), Some(MatchCode::No)) => "A",
            (Some(MatchCode::Yes), None) => "B",
            (Some(MatchCode::No), Some(MatchCode::Yes)) => "Z",
            (Some(MatchCode::No), Some(MatchCode::No)) => "N",
            (None, Some(MatchCode::Yes)) => "P",
            (Some(MatchCode::NotSupported), _) | (_, Some(MatchCode::NotSupported)) => "S",
            _ => "I",
        };
        Self::new(code)
    }

    /// Result for a gateway that returned no AVS data.
    #[must_use]
    pub const fn empty() -> Self {
        Self { code: None, message: None, street_match: None, postal_match: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_match() {
        let avs = AvsResult::new("Y");
        assert_eq!(avs.street_match, Some(MatchCode::Yes));
        assert_eq!(avs.postal_match, Some(MatchCode::Yes));
        assert_eq!(avs.message.as_deref(), Some("Street address and 5-digit postal code match."));
    }

    #[test]
    fn test_no_match() {
        let avs = AvsResult::new("N");
        assert_eq!(avs.street_match, Some(MatchCode::No));
        assert_eq!(avs.postal_match, Some(MatchCode::No));
    }

    #[test]
    fn test_unverified_codes_have_no_match_flags() {
        for code in ["E", "I", "R", "U"] {
            let avs = AvsResult::new(code);
            assert_eq!(avs.street_match, None, "{code}");
            assert_eq!(avs.postal_match, None, "{code}");
            assert!(avs.message.is_some());
        }
    }

    #[test]
    fn test_not_supported() {
        let avs = AvsResult::new("G");
        assert_eq!(avs.street_match, Some(MatchCode::NotSupported));
        assert_eq!(avs.postal_match, Some(MatchCode::NotSupported));
    }

    #[test]
    fn test_every_letter_has_message() {
        for letter in 'A'..='Z' {
            assert!(avs_message(letter).is_some(), "{letter}");
        }
    }

    #[test]
    fn test_blank_and_unknown() {
        assert_eq!(AvsResult::new(""), AvsResult::empty());
        assert_eq!(AvsResult::new("YY"), AvsResult::empty());
        let avs = AvsResult::new("1");
        assert_eq!(avs.code.as_deref(), Some("1"));
        assert!(avs.message.is_none());
    }

    #[test]
    fn test_from_matches() {
        let code = |street, postal| AvsResult::from_matches(street, postal).code;
        assert_eq!(code(Some(MatchCode::Yes), Some(MatchCode::No)).as_deref(), Some("A"));
        assert_eq!(code(Some(MatchCode::No), Some(MatchCode::Yes)).as_deref(), Some("Z"));
        assert_eq!(code(None, None).as_deref(), Some("I"));
    }
}
