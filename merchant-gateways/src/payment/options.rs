//! Per-call options shared by all operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{money::Currency, payment::Address};

/// Optional data attached to a gateway call.
///
/// Adapters read the fields they understand and ignore the rest. Vendor-only
/// knobs go through [`extra`](Self::extra).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    /// Merchant order / invoice reference.
    pub order_id: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Customer email.
    pub email: Option<String>,
    /// Customer IP address.
    pub ip: Option<String>,
    /// Merchant-side customer id.
    pub customer: Option<String>,
    /// Currency override for operations that take no [`Money`](crate::money::Money).
    pub currency: Option<Currency>,
    /// Billing address.
    pub billing_address: Option<Address>,
    /// Shipping address.
    pub shipping_address: Option<Address>,
    /// Idempotency key; adapters that need one generate it when absent.
    pub idempotency_key: Option<String>,
    /// Vendor-specific parameters.
    pub extra: BTreeMap<String, String>,
}

impl TransactionOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the order id.
    #[must_use]
    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the billing address.
    #[must_use]
    pub fn with_billing_address(mut self, address: Address) -> Self {
        self.billing_address = Some(address);
        self
    }

    /// Sets the customer email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets a vendor-specific parameter.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Looks up a vendor-specific parameter.
    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    /// Billing address, falling back to the shipping address.
    #[must_use]
    pub fn address(&self) -> Option<&Address> {
        self.billing_address.as_ref().or(self.shipping_address.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_extra() {
        let options = TransactionOptions::new()
            .with_order_id("1")
            .with_extra("pm_type", "us_visa_card");
        assert_eq!(options.order_id.as_deref(), Some("1"));
        assert_eq!(options.extra("pm_type"), Some("us_visa_card"));
        assert_eq!(options.extra("missing"), None);
    }

    #[test]
    fn test_address_falls_back_to_shipping() {
        let shipping = Address { zip: Some("K1C2N6".into()), ..Address::default() };
        let options =
            TransactionOptions { shipping_address: Some(shipping.clone()), ..Default::default() };
        assert_eq!(options.address(), Some(&shipping));
    }

    #[test]
    fn test_deserialize_partial() {
        let options: TransactionOptions =
            serde_json::from_str(r#"{"order_id":"42","extra":{"a":"b"}}"#).unwrap();
        assert_eq!(options.order_id.as_deref(), Some("42"));
        assert_eq!(options.extra("a"), Some("b"));
        assert!(options.billing_address.is_none());
    }
}
