//! Audit logging for gateway traffic.
//!
//! Provides structured audit logging with sensitive data redaction
//! and unique correlation IDs for tracking a transaction across calls.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::redact::redact_sensitive;

/// Types of auditable events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A request is about to be sent to the gateway.
    TransactionAttempted,
    /// The gateway approved the operation.
    TransactionSucceeded,
    /// The gateway answered but declined.
    TransactionDeclined,
    /// No usable answer: transport failure or undecodable reply.
    TransactionFailed,
    /// Credentials were resolved from configuration.
    CredentialsLoaded,
}

/// Details for audit log entry.
///
/// Fields that do not apply are omitted from the serialized form.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AuditDetails {
    /// Operation name (purchase, refund, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Endpoint URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// HTTP status of the reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Normalized error code of a declined transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Error message (sensitive data automatically redacted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Duration of the operation in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Audit log entry.
///
/// # Examples
///
/// ```
/// use merchant_gateways::security::{AuditEvent, AuditEventType, audit_log};
/// use uuid::Uuid;
///
/// let event = AuditEvent::new(AuditEventType::TransactionAttempted, "stripe", Uuid::new_v4())
///     .with_operation("purchase")
///     .with_url("https://api.stripe.com/v1/charges");
///
/// audit_log(&event);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event timestamp (when the event occurred).
    pub timestamp: SystemTime,
    /// Event type (what happened).
    pub event_type: AuditEventType,
    /// Gateway id.
    pub gateway: String,
    /// Request correlation ID (for tracking across calls).
    pub request_id: Uuid,
    /// Event details (contextual information).
    pub details: AuditDetails,
}

impl AuditEvent {
    /// Creates a new audit event.
    #[must_use]
    pub fn new(event_type: AuditEventType, gateway: impl Into<String>, request_id: Uuid) -> Self {
        Self {
            timestamp: SystemTime::now(),
            event_type,
            gateway: gateway.into(),
            request_id,
            details: AuditDetails::default(),
        }
    }

    /// Adds the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.details.operation = Some(operation.into());
        self
    }

    /// Adds the endpoint URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.details.url = Some(url.into());
        self
    }

    /// Adds the HTTP status.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.details.status = Some(status);
        self
    }

    /// Adds a normalized error code.
    #[must_use]
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.details.error_code = Some(code.into());
        self
    }

    /// Adds error message to details.
    ///
    /// Automatically redacts sensitive data from the error message.
    ///
    /// # Examples
    ///
    /// ```
    /// use merchant_gateways::security::{AuditEvent, AuditEventType};
    /// use uuid::Uuid;
    ///
    /// let event = AuditEvent::new(AuditEventType::TransactionFailed, "nmi", Uuid::new_v4())
    ///     .with_error("Invalid card 4111111111111111");
    /// assert!(!event.details.error.unwrap().contains("4111111111111111"));
    /// ```
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.details.error = Some(redact_sensitive(&error.into()));
        self
    }

    /// Adds duration to details.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "duration in ms fits u64 for practical values"
    )]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.details.duration_ms = Some(duration.as_millis() as u64);
        self
    }
}

/// Logs audit event to tracing with target "audit".
///
/// Audit logs use a special target for easy filtering and routing
/// to separate log files or SIEM systems.
pub fn audit_log(event: &AuditEvent) {
    tracing::info!(
        target: "audit",
        timestamp = ?event.timestamp,
        event_type = ?event.event_type,
        gateway = %event.gateway,
        request_id = %event.request_id,
        details = ?event.details,
        "AUDIT"
    );
}

/// Convenience macro for audit logging.
///
/// # Examples
///
/// ```
/// use merchant_gateways::{audit, security::AuditEventType};
/// use uuid::Uuid;
///
/// audit!(AuditEventType::CredentialsLoaded, "stripe", Uuid::new_v4());
///
/// audit!(
///     AuditEventType::TransactionDeclined,
///     "stripe",
///     Uuid::new_v4(),
///     with_operation("purchase"),
///     with_error_code("card_declined")
/// );
/// ```
#[macro_export]
macro_rules! audit {
    ($event_type:expr, $gateway:expr, $request_id:expr) => {
        $crate::security::audit_log(
            &$crate::security::AuditEvent::new($event_type, $gateway, $request_id)
        )
    };
    ($event_type:expr, $gateway:expr, $request_id:expr, $($method:ident($arg:expr)),+ $(,)?) => {
        $crate::security::audit_log(
            &$crate::security::AuditEvent::new($event_type, $gateway, $request_id)
                $(.$method($arg))+
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_builder() {
        let request_id = Uuid::new_v4();
        let event = AuditEvent::new(AuditEventType::TransactionSucceeded, "stripe", request_id)
            .with_operation("purchase")
            .with_url("https://api.stripe.com/v1/charges")
            .with_status(200)
            .with_duration(Duration::from_millis(1500));

        assert_eq!(event.gateway, "stripe");
        assert_eq!(event.request_id, request_id);
        assert_eq!(event.details.operation.as_deref(), Some("purchase"));
        assert_eq!(event.details.status, Some(200));
        assert_eq!(event.details.duration_ms, Some(1500));
    }

    #[test]
    fn test_audit_event_with_error_is_redacted() {
        let event = AuditEvent::new(AuditEventType::TransactionFailed, "nmi", Uuid::new_v4())
            .with_error("Payment failed for card 4111-1111-1111-1111 cvv: 123");

        let error = event.details.error.unwrap();
        assert!(!error.contains("4111-1111-1111-1111"));
        assert!(error.contains("XXXX-XXXX-XXXX-1111"));
        assert!(!error.contains("123"));
    }

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::new(AuditEventType::TransactionDeclined, "checkout", Uuid::new_v4())
            .with_error_code("card_declined");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("transaction_declined"));
        assert!(json.contains("checkout"));
        assert!(json.contains("card_declined"));
        assert!(!json.contains("\"url\""));
    }

    #[test]
    fn test_audit_macro_compiles_with_details() {
        audit!(
            AuditEventType::TransactionAttempted,
            "bogus",
            Uuid::new_v4(),
            with_operation("verify"),
            with_status(200),
        );
    }
}
