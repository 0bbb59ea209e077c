//! Payment instruments and per-call options.

mod address;
mod card;
mod check;
mod options;

use serde::{Deserialize, Serialize};

pub use address::Address;
pub use card::{CardBrand, CreditCard, luhn_valid};
pub use check::{AccountHolderType, AccountType, Check};
pub use options::TransactionOptions;

/// What is being charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentSource {
    /// Card details.
    Card(CreditCard),
    /// Bank account.
    Check(Check),
    /// Vault reference returned by a previous `store`.
    Token {
        /// The opaque reference.
        token: String,
    },
}

impl PaymentSource {
    /// Wraps a vault reference.
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token { token: token.into() }
    }

    /// Short kind name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Card(_) => "card",
            Self::Check(_) => "check",
            Self::Token { .. } => "token",
        }
    }

    /// Validates card or check data; tokens are passed through.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidInput`](crate::error::GatewayError::InvalidInput)
    /// for an invalid card, check or empty token.
    pub fn ensure_valid(&self) -> crate::error::Result<()> {
        match self {
            Self::Card(card) => card.ensure_valid(),
            Self::Check(check) => check.ensure_valid(),
            Self::Token { token } if token.trim().is_empty() => Err(
                crate::error::GatewayError::InvalidInput("token must not be empty".to_owned()),
            ),
            Self::Token { .. } => Ok(()),
        }
    }
}

impl From<CreditCard> for PaymentSource {
    fn from(card: CreditCard) -> Self {
        Self::Card(card)
    }
}

impl From<Check> for PaymentSource {
    fn from(check: Check) -> Self {
        Self::Check(check)
    }
}
