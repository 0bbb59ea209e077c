//! Postal address.

use serde::{Deserialize, Serialize};

/// Billing or shipping address. Every field is optional on the wire, adapters
/// skip empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    /// Full name of the addressee.
    pub name: Option<String>,
    /// Company.
    pub company: Option<String>,
    /// Street line 1.
    pub address1: Option<String>,
    /// Street line 2.
    pub address2: Option<String>,
    /// City.
    pub city: Option<String>,
    /// State or province.
    pub state: Option<String>,
    /// Postal code.
    pub zip: Option<String>,
    /// ISO 3166 alpha-2 country.
    pub country: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
}

impl Address {
    /// Splits `name` into first and last name at the last space.
    #[must_use]
    pub fn split_name(&self) -> (String, String) {
        let name = self.name.as_deref().unwrap_or_default().trim();
        match name.rsplit_once(' ') {
            Some((first, last)) => (first.trim().to_owned(), last.to_owned()),
            None => (String::new(), name.to_owned()),
        }
    }
}
