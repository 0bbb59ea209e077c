//! Merchant Gateways: one payment API over many processors
//!
//! A Rust library that maps a uniform set of payment operations (purchase,
//! authorize, capture, refund, void, store, unstore, verify) onto the wire
//! formats of individual payment gateways, and normalizes their replies into
//! one [`Response`](response::Response) envelope.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   Your application  │  Money, CreditCard / Check / Token, options
//! └──────────┬──────────┘
//!            │ Gateway trait (async)
//! ┌──────────▼──────────────────────────────────────────┐
//! │  Adapter (stripe, authorize_net, cybersource, ...)  │
//! │  ┌────────────────┐ ┌──────────┐ ┌───────────────┐  │
//! │  │ request builder│ │ signing  │ │ reply parser  │  │
//! │  │ (form/JSON/XML)│ │ (HMAC..) │ │ → Response    │  │
//! │  └────────────────┘ └──────────┘ └───────────────┘  │
//! └──────────┬──────────────────────────────────────────┘
//!            │ Connection: audit, timing, retry
//! ┌──────────▼──────────┐
//! │  Transport          │  reqwest (HttpTransport) or MockTransport
//! └─────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ## 1. Charge a card
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use merchant_gateways::{
//!     gateway::{Connection, Credentials, Gateway},
//!     gateways::BogusGateway,
//!     money::{Currency, Money},
//!     payment::{CreditCard, PaymentSource, TransactionOptions},
//!     transport::MockTransport,
//! };
//!
//! # async fn example() -> merchant_gateways::error::Result<()> {
//! let connection = Connection::new(Arc::new(MockTransport::new()), true);
//! let gateway = BogusGateway::new(&Credentials::new(), connection);
//!
//! let money = Money::new(1000, Currency::usd())?;
//! let card = CreditCard::new("4111111111111111", 9, 2040).with_name("Longbob", "Longsen");
//! let response = gateway
//!     .purchase(&money, &PaymentSource::Card(card), &TransactionOptions::new())
//!     .await?;
//!
//! println!("success: {} ({})", response.success, response.message);
//! # Ok(())
//! # }
//! ```
//!
//! ## 2. Build an adapter from TOML
//!
//! ```rust,no_run
//! use merchant_gateways::gateway::{
//!     GatewayConfig,
//!     registry::{build_gateway, build_transport},
//! };
//!
//! # fn example() -> merchant_gateways::error::Result<()> {
//! let config = GatewayConfig::from_toml(
//!     r#"
//!     gateway = "stripe"
//!
//!     [credentials]
//!     secret_key = { env = "STRIPE_SECRET_KEY" }
//!     "#,
//! )?;
//! let gateway = build_gateway(&config, build_transport(&config)?)?;
//! assert_eq!(gateway.info().id, "stripe");
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`gateway`]: the [`Gateway`](gateway::Gateway) trait, connections, credentials,
//!   configuration and the registry
//! - [`gateways`]: one adapter per processor
//! - [`payment`], [`money`]: inputs (cards, bank accounts, tokens, amounts)
//! - [`response`]: the result envelope with AVS/CVV and standard error codes
//! - [`transport`]: HTTP abstraction with reqwest and mock implementations
//! - [`codec`], [`signing`]: wire-format and cryptographic helpers
//! - [`reliability`]: retry with exponential backoff
//! - [`security`]: transcript scrubbing and audit logging
//!
//! # Security Considerations
//!
//! Card numbers, CVVs and credentials never reach the logs unmasked: request
//! and response bodies are passed through
//! [`redact_sensitive`](security::redact_sensitive) before tracing, and every
//! adapter offers [`Gateway::scrub`](gateway::Gateway::scrub) for its own
//! secret fields. Endpoint overrides must be HTTPS unless the configuration
//! explicitly sets `http.allow_insecure`.
//!
//! # Error Handling
//!
//! Declines are not errors. They arrive as `Ok(Response { success: false, .. })`
//! with a [`StandardErrorCode`](response::StandardErrorCode). `Err` is reserved
//! for problems the gateway never judged:
//!
//! ```rust
//! use merchant_gateways::error::GatewayError;
//!
//! fn describe(error: &GatewayError) -> &'static str {
//!     match error {
//!         GatewayError::InvalidInput(_) => "fix the request",
//!         GatewayError::ConfigError(_) => "fix the configuration",
//!         GatewayError::UnsupportedOperation { .. } => "pick another gateway",
//!         _ => "retry later",
//!     }
//! }
//! # let _ = describe;
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![allow(
    clippy::multiple_crate_versions,
    reason = "transitive dependencies from reqwest and wiremock"
)]

pub mod codec;
pub mod error;
pub mod gateway;
pub mod gateways;
pub mod money;
pub mod payment;
pub mod reliability;
pub mod response;
pub mod security;
pub mod signing;
pub mod transport;

pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayConfig, Operation};
pub use response::Response;
