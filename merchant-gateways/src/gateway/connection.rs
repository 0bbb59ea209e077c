//! Per-adapter bundle of transport, mode, endpoint and retry policy.

use std::{sync::Arc, time::Instant};

use tracing::{debug, instrument, trace};
use url::Url;
use uuid::Uuid;

use super::{GatewayInfo, Operation};
use crate::{
    audit,
    error::{GatewayError, Result},
    reliability::{RetryPolicy, is_retryable, retry_with_backoff_if},
    response::Response,
    security::{AuditEventType, redact_sensitive},
    transport::{HttpRequest, HttpResponse, Transport},
};

/// Percent-encodes a caller-supplied reference for use as one URL path segment.
///
/// `/`, `?`, `#` and `%` are escaped so that an authorization or token can
/// never address a different resource than the one the adapter names.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidInput`] for an empty reference or one that
/// is exactly `.` or `..`.
///
/// # Examples
///
/// ```
/// use merchant_gateways::gateway::path_segment;
///
/// assert_eq!(path_segment("ch_1").unwrap(), "ch_1");
/// assert_eq!(path_segment("ch_1/../x?y").unwrap(), "ch_1%2F..%2Fx%3Fy");
/// assert!(path_segment("").is_err());
/// ```
pub fn path_segment(reference: &str) -> Result<String> {
    if reference.trim().is_empty() || matches!(reference, "." | "..") {
        return Err(GatewayError::InvalidInput(format!(
            "invalid transaction reference '{reference}'"
        )));
    }
    let mut url = Url::parse("https://segment.invalid/")
        .map_err(|e| GatewayError::InvalidInput(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| GatewayError::InvalidInput("cannot encode path segment".to_owned()))?
        .clear()
        .push(reference);
    Ok(url.path().trim_start_matches('/').to_owned())
}

/// Identifies one logical gateway operation across the HTTP calls it makes.
#[derive(Debug, Clone, Copy)]
pub struct Call {
    /// Gateway id.
    pub gateway: &'static str,
    /// Operation being performed.
    pub operation: Operation,
    /// Correlation id shared by every audit event of this operation.
    pub request_id: Uuid,
}

impl Call {
    /// Starts a new call with a fresh correlation id.
    #[must_use]
    pub fn new(gateway: &'static str, operation: Operation) -> Self {
        Self { gateway, operation, request_id: Uuid::new_v4() }
    }
}

/// What an adapter needs to reach its gateway.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use merchant_gateways::{gateway::Connection, transport::MockTransport};
///
/// let connection = Connection::new(Arc::new(MockTransport::new()), true)
///     .with_endpoint("https://sandbox.example.com/");
/// assert!(connection.test());
/// ```
#[derive(Debug, Clone)]
pub struct Connection {
    transport: Arc<dyn Transport>,
    test: bool,
    endpoint: Option<String>,
    retry: Option<RetryPolicy>,
}

impl Connection {
    /// Creates a connection in test or live mode.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, test: bool) -> Self {
        Self { transport, test, endpoint: None, retry: None }
    }

    /// Overrides the base URL taken from [`GatewayInfo`].
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the policy used by [`send_with_retry`](Self::send_with_retry).
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// True when talking to the sandbox.
    #[must_use]
    pub const fn test(&self) -> bool {
        self.test
    }

    /// Configured retry policy, or the default one.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default()
    }

    /// Base URL: the override if any, otherwise the test or live URL.
    #[must_use]
    pub fn endpoint<'a>(&'a self, info: &'a GatewayInfo) -> &'a str {
        match &self.endpoint {
            Some(endpoint) => endpoint,
            None if self.test => info.test_url,
            None => info.live_url,
        }
    }

    /// Joins the base URL and a path.
    #[must_use]
    pub fn url(&self, info: &GatewayInfo, path: &str) -> String {
        let base = self.endpoint(info).trim_end_matches('/');
        if path.is_empty() {
            base.to_owned()
        } else if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Sends one request and times it.
    ///
    /// # Errors
    ///
    /// Returns the transport error when no reply was received.
    #[instrument(
        skip(self, request),
        fields(
            gateway = call.gateway,
            operation = %call.operation,
            request_id = %call.request_id,
            method = %request.method,
            url = %request.url,
        )
    )]
    pub async fn send(&self, call: &Call, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        trace!(body = %redact_sensitive(&request.body_text()), "Request body");
        audit!(
            AuditEventType::TransactionAttempted,
            call.gateway,
            call.request_id,
            with_operation(call.operation.as_str()),
            with_url(url.as_str()),
        );

        let start = Instant::now();
        match self.transport.send(request).await {
            Ok(response) => {
                debug!(
                    status = response.status,
                    bytes = response.body.len(),
                    duration_ms = start.elapsed().as_millis(),
                    "Gateway replied"
                );
                trace!(body = %redact_sensitive(&response.text()), "Response body");
                Ok(response)
            }
            Err(error) => {
                audit!(
                    AuditEventType::TransactionFailed,
                    call.gateway,
                    call.request_id,
                    with_operation(call.operation.as_str()),
                    with_url(url.as_str()),
                    with_error(error.to_string()),
                    with_duration(start.elapsed()),
                );
                Err(error)
            }
        }
    }

    /// Sends a request, retrying transient failures and 429/5xx replies.
    ///
    /// Once attempts run out the last HTTP reply is returned as-is so the
    /// adapter can still parse the gateway's error body. Only safe for
    /// idempotent requests.
    ///
    /// # Errors
    ///
    /// Returns the last transport error when no attempt produced a reply.
    pub async fn send_with_retry(
        &self,
        policy: &RetryPolicy,
        call: &Call,
        request: HttpRequest,
    ) -> Result<HttpResponse> {
        let result = retry_with_backoff_if(policy, is_retryable, || {
            let request = request.clone();
            async move {
                let response = self.send(call, request).await?;
                if response.status == 429 || response.status >= 500 {
                    Err(GatewayError::ServerError { status: response.status, body: response.body })
                } else {
                    Ok(response)
                }
            }
        })
        .await;

        match result {
            Err(GatewayError::ServerError { status, body }) => Ok(HttpResponse::new(status, body)),
            other => other,
        }
    }

    /// Emits the audit event for a finished operation.
    pub fn audit_outcome(&self, call: &Call, response: &Response) {
        let event_type = if response.success {
            AuditEventType::TransactionSucceeded
        } else if response.params.get("raw_response").is_some() {
            AuditEventType::TransactionFailed
        } else {
            AuditEventType::TransactionDeclined
        };
        let error_code = response.error_code.map_or("", |code| code.as_str());
        audit!(
            event_type,
            call.gateway,
            call.request_id,
            with_operation(call.operation.as_str()),
            with_error_code(error_code),
        );
    }

    /// Stamps the test flag on a response and audits its outcome.
    #[must_use]
    pub fn finish(&self, call: &Call, response: Response) -> Response {
        let response = response.with_test(self.test);
        self.audit_outcome(call, &response);
        response
    }

    /// Parses a reply with `parse`, falling back to
    /// [`Response::unparsable`] when the body cannot be decoded.
    pub fn parse_or_unparsable<E>(
        &self,
        call: &Call,
        reply: &HttpResponse,
        parse: impl FnOnce(&HttpResponse) -> std::result::Result<Response, E>,
    ) -> Response
    where
        E: std::fmt::Display,
    {
        let response = parse(reply).unwrap_or_else(|error| {
            debug!(gateway = call.gateway, %error, "Undecodable gateway reply");
            Response::unparsable(call.gateway, reply.status, &reply.body)
        });
        self.finish(call, response)
    }
}
