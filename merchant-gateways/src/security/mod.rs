//! Security controls for gateway traffic.
//!
//! # Redaction
//!
//! Wire transcripts carry card numbers, verification values and API secrets.
//! [`redact_sensitive`] masks card data found anywhere in free text, and
//! [`scrub_pairs`] masks the values of named fields in form, JSON or XML
//! bodies. Adapters combine both in their `scrub` implementation.
//!
//! ```rust
//! use merchant_gateways::security::{redact_sensitive, scrub_pairs};
//!
//! let body = "security_key=abc123&ccnumber=4111111111111111&cvv=999";
//! let scrubbed = scrub_pairs(&redact_sensitive(body), &["security_key"]);
//! assert_eq!(scrubbed, "security_key=[FILTERED]&ccnumber=XXXXXXXXXXXX1111&cvv=[FILTERED]");
//! ```
//!
//! # Audit Logging
//!
//! Every gateway call emits structured events on the `audit` tracing target:
//!
//! ```rust
//! use merchant_gateways::security::{AuditEvent, AuditEventType, audit_log};
//! use uuid::Uuid;
//!
//! let event = AuditEvent::new(AuditEventType::TransactionSucceeded, "stripe", Uuid::new_v4())
//!     .with_operation("purchase");
//!
//! audit_log(&event);
//! ```
//!
//! # Security Considerations
//!
//! - Audit logs use separate tracing target for easy filtering
//! - Error messages attached to audit events are redacted
//! - Request correlation IDs enable tracking across multi-call operations

pub mod audit;
mod redact;

pub use audit::{AuditDetails, AuditEvent, AuditEventType, audit_log};
pub use redact::{FILTERED, redact_sensitive, scrub_headers, scrub_pairs};
