//! Monetary amounts in minor units.
//!
//! Gateways disagree on how amounts travel on the wire: some want integer
//! cents (`"1000"`), others a decimal string in major units (`"10.00"`).
//! [`Money`] keeps the amount as an integer count of minor units and formats
//! it on demand according to the gateway's [`MoneyFormat`].

use std::{fmt, str::FromStr};

use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// How a gateway expects amounts to be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoneyFormat {
    /// Integer minor units, e.g. `1000` for 10.00 USD.
    Cents,
    /// Decimal major units with the currency's exponent, e.g. `10.00`.
    Dollars,
}

/// Currencies without a minor unit.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "ISK", "JPY", "KMF", "KRW", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

/// Currencies with three decimal places.
const THREE_DECIMAL_CURRENCIES: &[&str] = &["BHD", "IQD", "JOD", "KWD", "LYD", "OMR", "TND"];

/// ISO 4217 alphabetic currency code.
///
/// # Examples
///
/// ```
/// use merchant_gateways::money::Currency;
///
/// let jpy: Currency = "jpy".parse().unwrap();
/// assert_eq!(jpy.code(), "JPY");
/// assert_eq!(jpy.exponent(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Creates a currency from a three-letter code (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidInput`] if the code is not three ASCII letters.
    pub fn new(code: &str) -> Result<Self> {
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(GatewayError::InvalidInput(format!(
                "currency must be a three-letter ISO 4217 code, got '{code}'"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// US dollars, the default currency of most adapters.
    #[must_use]
    pub fn usd() -> Self {
        Self("USD".to_owned())
    }

    /// Upper-case ISO code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Number of minor-unit digits.
    #[must_use]
    pub fn exponent(&self) -> u32 {
        if ZERO_DECIMAL_CURRENCIES.contains(&self.0.as_str()) {
            0
        } else if THREE_DECIMAL_CURRENCIES.contains(&self.0.as_str()) {
            3
        } else {
            2
        }
    }
}

impl FromStr for Currency {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount of money in minor units.
///
/// # Examples
///
/// ```
/// use merchant_gateways::money::{Currency, Money, MoneyFormat};
///
/// let money = Money::from_major("10.5", Currency::usd()).unwrap();
/// assert_eq!(money.cents(), 1050);
/// assert_eq!(money.format(MoneyFormat::Dollars), "10.50");
/// assert_eq!(money.format(MoneyFormat::Cents), "1050");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMoney")]
pub struct Money {
    cents: i64,
    currency: Currency,
}

/// Unchecked wire form of [`Money`]; deserialization goes through [`Money::new`].
#[derive(Deserialize)]
struct RawMoney {
    cents: i64,
    currency: Currency,
}

impl TryFrom<RawMoney> for Money {
    type Error = GatewayError;

    fn try_from(raw: RawMoney) -> Result<Self> {
        Self::new(raw.cents, raw.currency)
    }
}

impl Money {
    /// Creates an amount from minor units.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidInput`] for negative amounts.
    pub fn new(cents: i64, currency: Currency) -> Result<Self> {
        if cents < 0 {
            return Err(GatewayError::InvalidInput(format!(
                "amount must not be negative, got {cents}"
            )));
        }
        Ok(Self { cents, currency })
    }

    /// Parses a decimal amount in major units (e.g. `"10.00"`).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidInput`] if the string is not a decimal,
    /// is negative, or has more fractional digits than the currency allows.
    pub fn from_major(amount: &str, currency: Currency) -> Result<Self> {
        let decimal = Decimal::from_str(amount.trim()).map_err(|e| {
            GatewayError::InvalidInput(format!("invalid amount '{amount}': {e}"))
        })?;
        let exponent = currency.exponent();
        if decimal.normalize().scale() > exponent {
            return Err(GatewayError::InvalidInput(format!(
                "amount '{amount}' has more than {exponent} decimal places for {currency}"
            )));
        }
        let too_large = || GatewayError::InvalidInput(format!("amount '{amount}' is too large"));
        let cents = decimal
            .checked_mul(Decimal::from(10_i64.pow(exponent)))
            .ok_or_else(too_large)?
            .trunc()
            .to_i64()
            .ok_or_else(too_large)?;
        Self::new(cents, currency)
    }

    /// Amount in minor units.
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.cents
    }

    /// Currency of this amount.
    #[must_use]
    pub const fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Amount in major units as a decimal with the currency's scale.
    #[must_use]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.cents, self.currency.exponent())
    }

    /// Formats the amount for the wire.
    #[must_use]
    pub fn format(&self, format: MoneyFormat) -> String {
        match format {
            MoneyFormat::Cents => self.cents.to_string(),
            MoneyFormat::Dollars => self.to_decimal().to_string(),
        }
    }

    /// Returns a copy with a different amount in the same currency.
    #[must_use]
    pub fn with_cents(&self, cents: i64) -> Self {
        Self { cents: cents.max(0), currency: self.currency.clone() }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.currency)
    }
}
