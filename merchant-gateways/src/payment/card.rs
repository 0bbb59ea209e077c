//! Credit card model, brand detection and validation.

use std::fmt;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Card network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    /// Visa.
    Visa,
    /// Mastercard.
    Master,
    /// American Express.
    AmericanExpress,
    /// Discover.
    Discover,
    /// JCB.
    Jcb,
    /// Diners Club.
    DinersClub,
    /// Maestro.
    Maestro,
}

impl CardBrand {
    /// Detects the brand from the card number's issuer identification prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use merchant_gateways::payment::CardBrand;
    ///
    /// assert_eq!(CardBrand::detect("4111111111111111"), Some(CardBrand::Visa));
    /// assert_eq!(CardBrand::detect("378282246310005"), Some(CardBrand::AmericanExpress));
    /// assert_eq!(CardBrand::detect("9999"), None);
    /// ```
    #[must_use]
    pub fn detect(number: &str) -> Option<Self> {
        let digits: String = number.chars().filter(char::is_ascii_digit).collect();
        let len = digits.len();
        let prefix = |n: usize| digits.get(..n).and_then(|p| p.parse::<u32>().ok());

        if digits.starts_with('4') && matches!(len, 13 | 16 | 19) {
            return Some(Self::Visa);
        }
        if len == 16
            && (prefix(2).is_some_and(|p| (51..=55).contains(&p))
                || prefix(4).is_some_and(|p| (2221..=2720).contains(&p)))
        {
            return Some(Self::Master);
        }
        if len == 15 && prefix(2).is_some_and(|p| p == 34 || p == 37) {
            return Some(Self::AmericanExpress);
        }
        if (16..=19).contains(&len)
            && (digits.starts_with("6011")
                || digits.starts_with("65")
                || prefix(3).is_some_and(|p| (644..=649).contains(&p)))
        {
            return Some(Self::Discover);
        }
        if (16..=19).contains(&len) && prefix(4).is_some_and(|p| (3528..=3589).contains(&p)) {
            return Some(Self::Jcb);
        }
        if (14..=19).contains(&len)
            && (prefix(3).is_some_and(|p| (300..=305).contains(&p))
                || digits.starts_with("36")
                || digits.starts_with("38")
                || digits.starts_with("39"))
        {
            return Some(Self::DinersClub);
        }
        if (12..=19).contains(&len)
            && ["5018", "5020", "5038", "5893", "6304", "6759", "6761", "6762", "6763"]
                .iter()
                .any(|p| digits.starts_with(p))
        {
            return Some(Self::Maestro);
        }
        None
    }

    /// Snake-case brand name as used in configuration and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Visa => "visa",
            Self::Master => "master",
            Self::AmericanExpress => "american_express",
            Self::Discover => "discover",
            Self::Jcb => "jcb",
            Self::DinersClub => "diners_club",
            Self::Maestro => "maestro",
        }
    }

    /// Expected length of the card verification value.
    #[must_use]
    pub const fn cvv_length(&self) -> usize {
        match self {
            Self::AmericanExpress => 4,
            _ => 3,
        }
    }
}

impl fmt::Display for CardBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if the digit string passes the Luhn (mod 10) checksum.
///
/// # Examples
///
/// ```
/// use merchant_gateways::payment::luhn_valid;
///
/// assert!(luhn_valid("4242424242424242"));
/// assert!(!luhn_valid("4242424242424241"));
/// ```
#[must_use]
pub fn luhn_valid(number: &str) -> bool {
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let sum: u32 = number
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// A payment card.
///
/// `Debug` masks the number and hides the verification value, so cards can be
/// logged safely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCard {
    /// Primary account number (digits, separators are stripped on use).
    pub number: String,
    /// Expiry month, 1-12.
    pub month: u32,
    /// Four-digit expiry year.
    pub year: i32,
    /// CVV/CVC, if collected.
    #[serde(default)]
    pub verification_value: Option<String>,
    /// Cardholder first name.
    #[serde(default)]
    pub first_name: String,
    /// Cardholder last name.
    #[serde(default)]
    pub last_name: String,
    /// Explicit brand; detected from the number when absent.
    #[serde(default)]
    pub brand: Option<CardBrand>,
}

impl CreditCard {
    /// Creates a card with the minimum required fields.
    #[must_use]
    pub fn new(number: impl Into<String>, month: u32, year: i32) -> Self {
        Self {
            number: number.into(),
            month,
            year,
            verification_value: None,
            first_name: String::new(),
            last_name: String::new(),
            brand: None,
        }
    }

    /// Sets the verification value.
    #[must_use]
    pub fn with_cvv(mut self, cvv: impl Into<String>) -> Self {
        self.verification_value = Some(cvv.into());
        self
    }

    /// Sets the cardholder name.
    #[must_use]
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    /// Card number with separators removed.
    #[must_use]
    pub fn digits(&self) -> String {
        self.number.chars().filter(char::is_ascii_digit).collect()
    }

    /// Brand, explicit or detected.
    #[must_use]
    pub fn brand(&self) -> Option<CardBrand> {
        self.brand.or_else(|| CardBrand::detect(&self.number))
    }

    /// Cardholder full name.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_owned()
    }

    /// Last four digits.
    #[must_use]
    pub fn last_digits(&self) -> String {
        let digits = self.digits();
        digits[digits.len().saturating_sub(4)..].to_owned()
    }

    /// First six digits (the BIN).
    #[must_use]
    pub fn first_digits(&self) -> String {
        self.digits().chars().take(6).collect()
    }

    /// Number with everything but the last four digits replaced by `X`.
    #[must_use]
    pub fn display_number(&self) -> String {
        let digits = self.digits();
        let visible = digits.len().saturating_sub(4);
        format!("{}{}", "X".repeat(visible), &digits[visible..])
    }

    /// Expiry as `MMYY`.
    #[must_use]
    pub fn expiry_mmyy(&self) -> String {
        format!("{:02}{:02}", self.month, self.year.rem_euclid(100))
    }

    /// Expiry as `YYYY-MM`.
    #[must_use]
    pub fn expiry_yyyy_mm(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// Two-digit month.
    #[must_use]
    pub fn month_padded(&self) -> String {
        format!("{:02}", self.month)
    }

    /// True if the card's expiry month has fully passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let today = Utc::now().date_naive();
        let (next_year, next_month) =
            if self.month >= 12 { (self.year + 1, 1) } else { (self.year, self.month + 1) };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .is_none_or(|first_of_next| today >= first_of_next)
    }

    /// Returns every validation problem with this card.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let digits = self.digits();

        if !(12..=19).contains(&digits.len()) {
            errors.push(format!("number has {} digits, expected 12-19", digits.len()));
        } else if !luhn_valid(&digits) {
            errors.push("number failed the Luhn check".to_owned());
        }

        if !(1..=12).contains(&self.month) {
            errors.push(format!("month {} is not between 1 and 12", self.month));
        } else if !(1000..=9999).contains(&self.year) {
            errors.push(format!("year {} is not a four-digit year", self.year));
        } else if self.is_expired() {
            errors.push(format!("card expired in {}", self.expiry_yyyy_mm()));
        }

        if let Some(cvv) = &self.verification_value {
            let expected = self.brand().map_or(3, |b| b.cvv_length());
            if cvv.len() != expected || !cvv.chars().all(|c| c.is_ascii_digit()) {
                errors.push(format!("verification value must be {expected} digits"));
            }
        }

        errors
    }

    /// Fails with the first validation problem.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidInput`] if [`validate`](Self::validate)
    /// reports anything.
    pub fn ensure_valid(&self) -> Result<()> {
        match self.validate().into_iter().next() {
            Some(problem) => Err(GatewayError::InvalidInput(format!("invalid card: {problem}"))),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for CreditCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreditCard")
            .field("number", &self.display_number())
            .field("month", &self.month)
            .field("year", &self.year)
            .field("verification_value", &self.verification_value.as_ref().map(|_| "[FILTERED]"))
            .field("name", &self.name())
            .field("brand", &self.brand())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Datelike;
    use proptest::prelude::*;

    use super::*;

    fn future_year() -> i32 {
        Utc::now().year() + 3
    }

    #[test]
    fn test_brand_detection() {
        assert_eq!(CardBrand::detect("4111 1111 1111 1111"), Some(CardBrand::Visa));
        assert_eq!(CardBrand::detect("5555555555554444"), Some(CardBrand::Master));
        assert_eq!(CardBrand::detect("2223003122003222"), Some(CardBrand::Master));
        assert_eq!(CardBrand::detect("371449635398431"), Some(CardBrand::AmericanExpress));
        assert_eq!(CardBrand::detect("6011111111111117"), Some(CardBrand::Discover));
        assert_eq!(CardBrand::detect("3530111333300000"), Some(CardBrand::Jcb));
        assert_eq!(CardBrand::detect("30569309025904"), Some(CardBrand::DinersClub));
        assert_eq!(CardBrand::detect("6759649826438453"), Some(CardBrand::Maestro));
        assert_eq!(CardBrand::detect("1"), None);
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("378282246310005"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid(""));
        assert!(!luhn_valid("4111-1111"));
    }

    #[test]
    fn test_valid_card_has_no_errors() {
        let card = CreditCard::new("4242424242424242", 9, future_year()).with_cvv("123");
        assert!(card.validate().is_empty());
        assert!(card.ensure_valid().is_ok());
    }

    #[test]
    fn test_expired_card() {
        let card = CreditCard::new("4242424242424242", 1, 2001);
        let errors = card.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("expired"));
    }

    #[test]
    fn test_bad_month() {
        let card = CreditCard::new("4242424242424242", 13, future_year());
        assert!(card.validate().iter().any(|e| e.contains("month")));
    }

    #[test]
    fn test_amex_requires_four_digit_cvv() {
        let card = CreditCard::new("378282246310005", 9, future_year()).with_cvv("123");
        assert!(card.validate().iter().any(|e| e.contains("4 digits")));
        let card = card.with_cvv("1234");
        assert!(card.validate().is_empty());
    }

    #[test]
    fn test_ensure_valid_reports_luhn_failure() {
        let card = CreditCard::new("4242424242424241", 9, future_year());
        let err = card.ensure_valid().unwrap_err();
        assert!(err.to_string().contains("Luhn"));
    }

    #[test]
    fn test_display_helpers() {
        let card = CreditCard::new("4111-1111-1111-1234", 3, 2031).with_name("Longbob", "Longsen");
        assert_eq!(card.last_digits(), "1234");
        assert_eq!(card.first_digits(), "411111");
        assert_eq!(card.display_number(), "XXXXXXXXXXXX1234");
        assert_eq!(card.expiry_mmyy(), "0331");
        assert_eq!(card.expiry_yyyy_mm(), "2031-03");
        assert_eq!(card.name(), "Longbob Longsen");
    }

    #[test]
    fn test_debug_masks_sensitive_fields() {
        let card = CreditCard::new("4111111111111111", 3, 2031).with_cvv("987");
        let debug = format!("{card:?}");
        assert!(!debug.contains("4111111111111111"));
        assert!(!debug.contains("987"));
        assert!(debug.contains("XXXXXXXXXXXX1111"));
    }

    #[test]
    fn test_december_expiry_rolls_year() {
        let card = CreditCard::new("4242424242424242", 12, future_year());
        assert!(!card.is_expired());
    }

    proptest! {
        #[test]
        fn prop_single_digit_change_breaks_luhn(
            body in "[0-9]{15}",
            position in 0usize..15,
            delta in 1u32..10,
        ) {
            // Append the check digit that makes the number valid.
            let check = (0..10u32)
                .find(|d| luhn_valid(&format!("{body}{d}")))
                .unwrap();
            let valid = format!("{body}{check}");
            prop_assert!(luhn_valid(&valid));

            let mut digits: Vec<u32> = valid.chars().filter_map(|c| c.to_digit(10)).collect();
            digits[position] = (digits[position] + delta) % 10;
            let corrupted: String = digits.iter().map(u32::to_string).collect();
            prop_assert!(!luhn_valid(&corrupted));
        }
    }
}
