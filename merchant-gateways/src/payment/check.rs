//! Bank account (ACH / eCheck) payment source.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Who owns the account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountHolderType {
    /// Individual consumer.
    #[default]
    Personal,
    /// Company account.
    Business,
}

/// Kind of bank account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Checking account.
    #[default]
    Checking,
    /// Savings account.
    Savings,
}

impl AccountType {
    /// Lower-case name used by most gateways.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Savings => "savings",
        }
    }
}

/// A bank account debited through ACH.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    /// Account holder name.
    pub name: String,
    /// Nine-digit ABA routing number.
    pub routing_number: String,
    /// Account number.
    pub account_number: String,
    /// Personal or business.
    #[serde(default)]
    pub account_holder_type: AccountHolderType,
    /// Checking or savings.
    #[serde(default)]
    pub account_type: AccountType,
}

impl Check {
    /// Creates a personal checking account.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        routing_number: impl Into<String>,
        account_number: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            routing_number: routing_number.into(),
            account_number: account_number.into(),
            account_holder_type: AccountHolderType::default(),
            account_type: AccountType::default(),
        }
    }

    /// Last four digits of the account number.
    #[must_use]
    pub fn last_digits(&self) -> &str {
        let n = self.account_number.len();
        &self.account_number[n.saturating_sub(4)..]
    }

    /// Checks the routing number checksum (weights 3, 7, 1).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidInput`] for a malformed routing number
    /// or an empty account number.
    pub fn ensure_valid(&self) -> Result<()> {
        let digits: Vec<u32> = self.routing_number.chars().filter_map(|c| c.to_digit(10)).collect();
        if digits.len() != 9 || self.routing_number.len() != 9 {
            return Err(GatewayError::InvalidInput(
                "routing number must be nine digits".to_owned(),
            ));
        }
        let checksum: u32 = digits
            .iter()
            .zip([3, 7, 1].iter().cycle())
            .map(|(d, w)| d * w)
            .sum();
        if checksum % 10 != 0 {
            return Err(GatewayError::InvalidInput("routing number checksum failed".to_owned()));
        }
        if self.account_number.is_empty() {
            return Err(GatewayError::InvalidInput("account number is required".to_owned()));
        }
        Ok(())
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check")
            .field("name", &self.name)
            .field("routing_number", &self.routing_number)
            .field("account_number", &format_args!("XXXX{}", self.last_digits()))
            .field("account_holder_type", &self.account_holder_type)
            .field("account_type", &self.account_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_routing_number() {
        let check = Check::new("Jim Smith", "244183602", "15378535");
        assert!(check.ensure_valid().is_ok());
    }

    #[test]
    fn test_bad_routing_checksum() {
        let check = Check::new("Jim Smith", "244183603", "15378535");
        assert!(check.ensure_valid().is_err());
    }

    #[test]
    fn test_short_routing_number() {
        let check = Check::new("Jim Smith", "12345", "15378535");
        assert!(check.ensure_valid().is_err());
    }

    #[test]
    fn test_debug_hides_account_number() {
        let check = Check::new("Jim Smith", "244183602", "15378535");
        let debug = format!("{check:?}");
        assert!(!debug.contains("15378535"));
        assert!(debug.contains("XXXX8535"));
    }
}
