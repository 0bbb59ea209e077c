//! Gateway adapters, one per processor.
//!
//! | Id | Wire format | Authentication |
//! |----|-------------|----------------|
//! | [`bogus`] | none, answers in-process | none |
//! | [`stripe`] | form POST, JSON reply | HTTP Basic |
//! | [`authorize_net`] | XML | login and transaction key in the body |
//! | [`checkout`] | JSON | secret key header, public key for tokens |
//! | [`nmi`] | form POST, query-string reply | `security_key` field |
//! | [`rapyd`] | JSON | HMAC-SHA256 signature headers |
//! | [`cybersource`] | SOAP | WS-Security username token |
//! | [`global_payments`] | JSON | access token, then Bearer |

pub mod authorize_net;
pub mod bogus;
pub mod checkout;
pub mod cybersource;
pub mod global_payments;
pub mod nmi;
pub mod rapyd;
pub mod stripe;

pub use authorize_net::AuthorizeNetGateway;
pub use bogus::BogusGateway;
pub use checkout::CheckoutGateway;
pub use cybersource::CybersourceGateway;
pub use global_payments::GlobalPaymentsGateway;
pub use nmi::NmiGateway;
pub use rapyd::RapydGateway;
pub use stripe::StripeGateway;

use uuid::Uuid;

use crate::payment::TransactionOptions;

/// Merchant reference for a call: the order id, or a fresh UUID.
pub(crate) fn order_reference(options: &TransactionOptions) -> String {
    options.order_id.clone().unwrap_or_else(|| Uuid::new_v4().simple().to_string())
}
