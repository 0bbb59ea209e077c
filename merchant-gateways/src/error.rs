//! Error types for gateway operations.
//!
//! A declined card is **not** an error: adapters report declines as a
//! [`Response`](crate::response::Response) with `success == false`. The
//! variants below cover the cases where no meaningful vendor answer exists:
//! bad input, bad configuration, unsupported operations and transport failures.
//!
//! # Error Categories
//!
//! - **Network Errors** ([`GatewayError::Http`], [`GatewayError::Transport`]):
//!   the request never produced an HTTP reply
//! - **Validation Errors** ([`GatewayError::InvalidInput`]): caller supplied
//!   data the adapter refuses to send
//! - **Configuration Errors** ([`GatewayError::ConfigError`]): missing
//!   credentials, malformed TOML, unknown gateway ids
//! - **Capability Errors** ([`GatewayError::UnsupportedOperation`])
//!
//! # Examples
//!
//! ```
//! use merchant_gateways::error::{GatewayError, Result};
//!
//! fn require_order_id(order_id: Option<&str>) -> Result<&str> {
//!     order_id.ok_or_else(|| GatewayError::InvalidInput("order_id is required".to_owned()))
//! }
//!
//! assert!(require_order_id(None).is_err());
//! ```

use thiserror::Error;

use crate::gateway::Operation;

/// Result type alias for gateway operations.
///
/// All fallible functions in this crate return this type.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur while talking to a payment gateway.
///
/// # Error Recovery
///
/// - **Transient errors** ([`Http`](Self::Http)): retry with backoff, only when
///   the gateway call is idempotent
/// - **Validation errors** ([`InvalidInput`](Self::InvalidInput)): fix input
/// - **Configuration errors** ([`ConfigError`](Self::ConfigError)): fix config
/// - **Protocol errors** ([`InvalidResponse`](Self::InvalidResponse)): contact
///   the processor
#[must_use = "errors should be handled, propagated, or explicitly panicked"]
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed before a reply was received.
    ///
    /// Wraps [`reqwest::Error`]: timeouts, refused connections, DNS and TLS
    /// failures.
    ///
    /// # Recovery
    ///
    /// Retry with exponential backoff if the operation is idempotent. A
    /// timed-out purchase may still have been processed by the gateway.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport refused to send the request.
    ///
    /// Raised by URL and header validation in the HTTP transport, e.g. a
    /// plain-HTTP endpoint or a header value containing CR/LF.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Caller input rejected before anything was sent.
    ///
    /// # Examples
    ///
    /// ```
    /// use merchant_gateways::error::GatewayError;
    ///
    /// let err = GatewayError::InvalidInput("card number failed the Luhn check".to_owned());
    /// assert!(err.to_string().contains("Invalid input"));
    /// ```
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Gateway configuration is incomplete or malformed.
    ///
    /// # Recovery
    ///
    /// Check the TOML file, the referenced environment variables and the
    /// gateway id.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The adapter does not offer the requested operation.
    #[error("{gateway} does not support {operation}")]
    UnsupportedOperation {
        /// Gateway id.
        gateway: &'static str,
        /// Requested operation.
        operation: Operation,
    },

    /// The vendor reply violates the documented protocol in a way that
    /// prevents building a response (as opposed to an undecodable body,
    /// which becomes a failed response).
    #[error("Invalid response from {gateway}: {message}")]
    InvalidResponse {
        /// Gateway id.
        gateway: &'static str,
        /// What was wrong.
        message: String,
    },

    /// Request signing or credential derivation failed.
    #[error("Request signing failed: {0}")]
    Signature(String),

    /// Gateway answered with a retryable HTTP status (429 or 5xx).
    ///
    /// Only produced inside retry loops so that the status can drive the
    /// retry decision; the body is preserved for parsing once attempts run out.
    #[error("Gateway returned retryable status {status}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Raw reply body.
        body: Vec<u8>,
    },
}

impl GatewayError {
    /// Shorthand for [`GatewayError::UnsupportedOperation`].
    pub const fn unsupported(gateway: &'static str, operation: Operation) -> Self {
        Self::UnsupportedOperation { gateway, operation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GatewayError::InvalidInput("amount must not be negative".into());
        assert_eq!(error.to_string(), "Invalid input: amount must not be negative");
    }

    #[test]
    fn test_config_error() {
        let error = GatewayError::ConfigError("missing credential 'login'".into());
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_unsupported_operation_display() {
        let error = GatewayError::unsupported("bogus", Operation::Unstore);
        assert_eq!(error.to_string(), "bogus does not support unstore");
    }

    #[test]
    fn test_server_error_display() {
        let error = GatewayError::ServerError { status: 503, body: b"busy".to_vec() };
        assert_eq!(error.to_string(), "Gateway returned retryable status 503");
    }

    #[test]
    fn test_invalid_response_display() {
        let error =
            GatewayError::InvalidResponse { gateway: "nmi", message: "missing response".into() };
        assert_eq!(error.to_string(), "Invalid response from nmi: missing response");
    }
}
