//! The gateway contract every adapter implements.
//!
//! A [`Gateway`] maps the uniform operation set onto one processor's API.
//! Adapters are constructed from [`Credentials`] and a [`Connection`], usually
//! through [`registry::build_gateway`].
//!
//! # Outcomes
//!
//! | Situation | Result |
//! |-----------|--------|
//! | Approved | `Ok(Response { success: true, .. })` |
//! | Declined, rejected by the gateway, undecodable reply | `Ok(Response { success: false, .. })` |
//! | Bad input, missing credentials, unsupported operation, network failure | `Err(GatewayError)` |

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{GatewayError, Result},
    money::{Currency, Money, MoneyFormat},
    payment::{CardBrand, CreditCard, PaymentSource, TransactionOptions},
    response::{MultiResponse, Response},
    security::redact_sensitive,
};

pub mod config;
mod connection;
mod credentials;
pub mod registry;

pub use config::{CredentialSource, GatewayConfig};
pub use connection::{Call, Connection, path_segment};
pub use credentials::Credentials;

/// Amount authorized by the default [`Gateway::verify`], in minor units.
pub const VERIFY_AMOUNT_CENTS: i64 = 100;

/// The uniform operation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Authorize and capture in one step.
    Purchase,
    /// Reserve funds.
    Authorize,
    /// Settle a previous authorization.
    Capture,
    /// Return settled funds.
    Refund,
    /// Cancel an unsettled transaction.
    Void,
    /// Save a payment source in the gateway vault.
    Store,
    /// Remove a vaulted payment source.
    Unstore,
    /// Check that a card is valid without charging it.
    Verify,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Purchase,
        Self::Authorize,
        Self::Capture,
        Self::Refund,
        Self::Void,
        Self::Store,
        Self::Unstore,
        Self::Verify,
    ];

    /// Lower-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Authorize => "authorize",
            Self::Capture => "capture",
            Self::Refund => "refund",
            Self::Void => "void",
            Self::Store => "store",
            Self::Unstore => "unstore",
            Self::Verify => "verify",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of an adapter.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayInfo {
    /// Registry id, e.g. `"stripe"`.
    pub id: &'static str,
    /// Human name.
    pub display_name: &'static str,
    /// Vendor homepage.
    pub homepage: &'static str,
    /// Sandbox base URL.
    pub test_url: &'static str,
    /// Production base URL.
    pub live_url: &'static str,
    /// ISO country codes the vendor serves.
    pub supported_countries: &'static [&'static str],
    /// Card brands the vendor accepts.
    pub supported_brands: &'static [CardBrand],
    /// Currency used when neither the amount nor the options carry one.
    pub default_currency: &'static str,
    /// Wire encoding of amounts.
    pub money_format: MoneyFormat,
    /// Operations the adapter implements.
    pub operations: &'static [Operation],
}

impl GatewayInfo {
    /// True if the adapter implements `operation`.
    #[must_use]
    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    /// Currency from the options, or the gateway default.
    #[must_use]
    pub fn currency(&self, options: &TransactionOptions) -> Currency {
        options
            .currency
            .clone()
            .or_else(|| Currency::new(self.default_currency).ok())
            .unwrap_or_else(Currency::usd)
    }

    /// Formats an amount the way the gateway expects.
    #[must_use]
    pub fn amount(&self, money: &Money) -> String {
        money.format(self.money_format)
    }
}

/// A payment gateway adapter.
///
/// Only [`purchase`](Self::purchase) is mandatory. Every other operation
/// defaults to [`GatewayError::UnsupportedOperation`], except
/// [`verify`](Self::verify), which defaults to an authorize of one major unit
/// followed by a void.
#[async_trait]
pub trait Gateway: Send + Sync + fmt::Debug {
    /// Static adapter metadata.
    fn info(&self) -> &'static GatewayInfo;

    /// True when the adapter talks to the vendor sandbox.
    fn test_mode(&self) -> bool;

    /// True if the adapter implements `operation`.
    fn supports(&self, operation: Operation) -> bool {
        self.info().supports(operation)
    }

    /// Authorizes and captures in one step.
    async fn purchase(
        &self,
        money: &Money,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response>;

    /// Reserves funds for a later [`capture`](Self::capture).
    async fn authorize(
        &self,
        _money: &Money,
        _source: &PaymentSource,
        _options: &TransactionOptions,
    ) -> Result<Response> {
        Err(GatewayError::unsupported(self.info().id, Operation::Authorize))
    }

    /// Settles an authorization, fully or partially.
    async fn capture(
        &self,
        _money: &Money,
        _authorization: &str,
        _options: &TransactionOptions,
    ) -> Result<Response> {
        Err(GatewayError::unsupported(self.info().id, Operation::Capture))
    }

    /// Refunds a settled transaction, fully or partially.
    async fn refund(
        &self,
        _money: &Money,
        _authorization: &str,
        _options: &TransactionOptions,
    ) -> Result<Response> {
        Err(GatewayError::unsupported(self.info().id, Operation::Refund))
    }

    /// Cancels an unsettled transaction.
    async fn void(&self, _authorization: &str, _options: &TransactionOptions) -> Result<Response> {
        Err(GatewayError::unsupported(self.info().id, Operation::Void))
    }

    /// Vaults a payment source; the response authorization is the token.
    async fn store(
        &self,
        _source: &PaymentSource,
        _options: &TransactionOptions,
    ) -> Result<Response> {
        Err(GatewayError::unsupported(self.info().id, Operation::Store))
    }

    /// Removes a vaulted payment source.
    async fn unstore(&self, _token: &str, _options: &TransactionOptions) -> Result<Response> {
        Err(GatewayError::unsupported(self.info().id, Operation::Unstore))
    }

    /// Checks a card without leaving a charge behind.
    async fn verify(&self, card: &CreditCard, options: &TransactionOptions) -> Result<Response> {
        authorize_then_void(self, card, options).await
    }

    /// Removes card data and secrets from a wire transcript.
    fn scrub(&self, transcript: &str) -> String {
        redact_sensitive(transcript)
    }
}

/// Verifies a card by authorizing [`VERIFY_AMOUNT_CENTS`] and voiding the
/// authorization.
///
/// The authorize response is returned. The void's outcome, including an
/// error, is logged and otherwise ignored.
///
/// # Errors
///
/// Propagates errors from the authorize call.
pub async fn authorize_then_void<G: Gateway + ?Sized>(
    gateway: &G,
    card: &CreditCard,
    options: &TransactionOptions,
) -> Result<Response> {
    let money = Money::new(VERIFY_AMOUNT_CENTS, gateway.info().currency(options))?;
    let source = PaymentSource::Card(card.clone());

    let mut multi = MultiResponse::first_primary();
    let authorized = multi.process(gateway.authorize(&money, &source, options).await?);

    let authorization = multi.primary().and_then(|r| r.authorization.clone());
    if authorized && let Some(authorization) = authorization {
        match gateway.void(&authorization, options).await {
            Ok(void) => multi.process_ignoring(void),
            Err(error) => {
                warn!(gateway = gateway.info().id, %error, "void after verification failed");
            }
        }
    }

    Ok(multi.into_response())
}
