//! Gateway-independent decline/error vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized reason for a failed transaction.
///
/// Every adapter maps its vendor codes onto this set. Codes that have no
/// better fit become [`ProcessingError`](Self::ProcessingError) or
/// [`CardDeclined`](Self::CardDeclined).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandardErrorCode {
    /// Card number is wrong.
    IncorrectNumber,
    /// Card number is not a valid card number.
    InvalidNumber,
    /// Expiry date is malformed or in the past.
    InvalidExpiryDate,
    /// CVC is malformed.
    InvalidCvc,
    /// Card has expired.
    ExpiredCard,
    /// CVC check failed.
    IncorrectCvc,
    /// Postal code check failed.
    IncorrectZip,
    /// Address check failed.
    IncorrectAddress,
    /// PIN is wrong.
    IncorrectPin,
    /// Generic decline.
    CardDeclined,
    /// Gateway or processor failure.
    ProcessingError,
    /// Issuer asks the merchant to call.
    CallIssuer,
    /// Issuer asks the merchant to retain the card.
    PickupCard,
    /// Merchant account is misconfigured.
    ConfigError,
    /// Live card used against a test account.
    TestModeLiveCard,
    /// Account does not have the feature enabled.
    UnsupportedFeature,
    /// Amount rejected.
    InvalidAmount,
}

impl StandardErrorCode {
    /// Snake-case wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IncorrectNumber => "incorrect_number",
            Self::InvalidNumber => "invalid_number",
            Self::InvalidExpiryDate => "invalid_expiry_date",
            Self::InvalidCvc => "invalid_cvc",
            Self::ExpiredCard => "expired_card",
            Self::IncorrectCvc => "incorrect_cvc",
            Self::IncorrectZip => "incorrect_zip",
            Self::IncorrectAddress => "incorrect_address",
            Self::IncorrectPin => "incorrect_pin",
            Self::CardDeclined => "card_declined",
            Self::ProcessingError => "processing_error",
            Self::CallIssuer => "call_issuer",
            Self::PickupCard => "pickup_card",
            Self::ConfigError => "config_error",
            Self::TestModeLiveCard => "test_mode_live_card",
            Self::UnsupportedFeature => "unsupported_feature",
            Self::InvalidAmount => "invalid_amount",
        }
    }
}

impl fmt::Display for StandardErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
