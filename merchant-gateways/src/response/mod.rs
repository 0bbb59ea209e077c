//! Normalized gateway response.
//!
//! Every adapter, whatever its wire format, answers with a [`Response`]:
//! a success flag, a human message, the decoded vendor payload, the opaque
//! authorization token for follow-up calls and optional AVS/CVV results and
//! [`StandardErrorCode`].
//!
//! # Examples
//!
//! ```
//! use merchant_gateways::response::{Response, StandardErrorCode};
//!
//! let declined = Response::builder(false, "Insufficient funds")
//!     .error_code(StandardErrorCode::CardDeclined)
//!     .build();
//! assert!(!declined.success);
//! assert_eq!(declined.error_code, Some(StandardErrorCode::CardDeclined));
//! ```

mod avs;
mod cvv;
mod error_code;

use serde::Serialize;
use serde_json::{Map, Value};

pub use avs::{AvsResult, MatchCode, avs_message};
pub use cvv::{CvvResult, cvv_message};
pub use error_code::StandardErrorCode;

/// Outcome of one gateway operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// True when the gateway approved the operation.
    pub success: bool,
    /// Human-readable message, usually the vendor's.
    pub message: String,
    /// Decoded vendor payload.
    pub params: Value,
    /// Opaque token for capture/refund/void, or a vault reference after `store`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    /// Address verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avs_result: Option<AvsResult>,
    /// Card verification value check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvv_result: Option<CvvResult>,
    /// Normalized failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<StandardErrorCode>,
    /// True when produced against a sandbox.
    pub test: bool,
    /// True when the gateway held the transaction for manual review.
    pub fraud_review: bool,
}

impl Response {
    /// Starts building a response.
    pub fn builder(success: bool, message: impl Into<String>) -> ResponseBuilder {
        ResponseBuilder {
            response: Self {
                success,
                message: message.into(),
                params: Value::Object(Map::new()),
                authorization: None,
                avs_result: None,
                cvv_result: None,
                error_code: None,
                test: false,
                fraud_review: false,
            },
        }
    }

    /// Failed response for a body that could not be decoded.
    ///
    /// The raw body is kept under `params.raw_response` so nothing the gateway
    /// said is lost.
    #[must_use]
    pub fn unparsable(gateway: &str, status: u16, raw: &[u8]) -> Self {
        let raw = String::from_utf8_lossy(raw).into_owned();
        let mut params = Map::new();
        params.insert("raw_response".to_owned(), Value::String(raw));
        params.insert("http_status".to_owned(), Value::from(status));
        Self::builder(
            false,
            format!(
                "Invalid response received from the {gateway} API (HTTP {status}). Please contact \
                 {gateway} if you continue to receive this message."
            ),
        )
        .params(Value::Object(params))
        .error_code(StandardErrorCode::ProcessingError)
        .build()
    }

    /// Sets the test flag.
    #[must_use]
    pub const fn with_test(mut self, test: bool) -> Self {
        self.test = test;
        self
    }

    /// Looks up a top-level field of the vendor payload as a string.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// Builder returned by [`Response::builder`].
#[derive(Debug)]
#[must_use]
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    /// Vendor payload.
    pub fn params(mut self, params: Value) -> Self {
        self.response.params = params;
        self
    }

    /// Authorization token, ignored when empty.
    pub fn authorization(mut self, authorization: impl Into<String>) -> Self {
        let authorization = authorization.into();
        if !authorization.is_empty() {
            self.response.authorization = Some(authorization);
        }
        self
    }

    /// Optional authorization token.
    pub fn maybe_authorization(self, authorization: Option<String>) -> Self {
        match authorization {
            Some(a) => self.authorization(a),
            None => self,
        }
    }

    /// AVS letter; blank letters are dropped.
    pub fn avs(mut self, code: Option<&str>) -> Self {
        if let Some(code) = code.filter(|c| !c.trim().is_empty()) {
            self.response.avs_result = Some(AvsResult::new(code));
        }
        self
    }

    /// Pre-built AVS result.
    pub fn avs_result(mut self, avs: AvsResult) -> Self {
        self.response.avs_result = Some(avs);
        self
    }

    /// CVV letter; blank letters are dropped.
    pub fn cvv(mut self, code: Option<&str>) -> Self {
        if let Some(code) = code.filter(|c| !c.trim().is_empty()) {
            self.response.cvv_result = Some(CvvResult::new(code));
        }
        self
    }

    /// Failure reason.
    pub fn error_code(mut self, code: StandardErrorCode) -> Self {
        self.response.error_code = Some(code);
        self
    }

    /// Optional failure reason.
    pub fn maybe_error_code(mut self, code: Option<StandardErrorCode>) -> Self {
        self.response.error_code = code;
        self
    }

    /// Sandbox flag.
    pub const fn test(mut self, test: bool) -> Self {
        self.response.test = test;
        self
    }

    /// Manual-review flag.
    pub const fn fraud_review(mut self, fraud_review: bool) -> Self {
        self.response.fraud_review = fraud_review;
        self
    }

    /// Finishes the response.
    #[must_use]
    pub fn build(self) -> Response {
        self.response
    }
}

/// Outcome of a multi-step operation such as authorize-then-void.
///
/// Steps are recorded in order. Processing stops at the first failing step
/// that counts; steps recorded with [`process_ignoring`](Self::process_ignoring)
/// are kept for inspection but never affect success.
#[derive(Debug, Clone, Default)]
pub struct MultiResponse {
    responses: Vec<Response>,
    counted: Vec<bool>,
    primary_first: bool,
}

impl MultiResponse {
    /// The last counted step is the primary response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The first step is the primary response when everything succeeds.
    #[must_use]
    pub fn first_primary() -> Self {
        Self { primary_first: true, ..Self::default() }
    }

    /// Records a step and returns whether it succeeded.
    pub fn process(&mut self, response: Response) -> bool {
        let success = response.success;
        self.responses.push(response);
        self.counted.push(true);
        success
    }

    /// Records a step whose outcome does not matter.
    pub fn process_ignoring(&mut self, response: Response) {
        self.responses.push(response);
        self.counted.push(false);
    }

    /// Every recorded step.
    #[must_use]
    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    /// True when every counted step succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.counted_responses().all(|r| r.success)
    }

    fn counted_responses(&self) -> impl Iterator<Item = &Response> {
        self.responses.iter().zip(&self.counted).filter(|(_, counted)| **counted).map(|(r, _)| r)
    }

    /// The response that represents the whole sequence.
    #[must_use]
    pub fn primary(&self) -> Option<&Response> {
        if self.primary_first && self.success() {
            self.counted_responses().next()
        } else {
            self.counted_responses().last()
        }
    }

    /// Collapses the sequence into its primary response.
    ///
    /// An empty sequence yields a failed `processing_error` response.
    #[must_use]
    pub fn into_response(self) -> Response {
        match self.primary() {
            Some(primary) => primary.clone(),
            None => Response::builder(false, "No gateway call was made")
                .error_code(StandardErrorCode::ProcessingError)
                .build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ok(message: &str) -> Response {
        Response::builder(true, message).authorization(message).build()
    }

    fn failed(message: &str) -> Response {
        Response::builder(false, message).error_code(StandardErrorCode::CardDeclined).build()
    }

    #[test]
    fn test_builder_sets_fields() {
        let response = Response::builder(true, "Approved")
            .params(json!({"id": "ch_1"}))
            .authorization("ch_1")
            .avs(Some("Y"))
            .cvv(Some("M"))
            .test(true)
            .build();
        assert!(response.success);
        assert_eq!(response.authorization.as_deref(), Some("ch_1"));
        assert_eq!(response.param("id"), Some("ch_1"));
        assert_eq!(response.avs_result.unwrap().code.as_deref(), Some("Y"));
        assert!(response.cvv_result.unwrap().is_match());
        assert!(response.test);
        assert!(!response.fraud_review);
    }

    #[test]
    fn test_builder_ignores_blank_values() {
        let response =
            Response::builder(true, "ok").authorization("").avs(Some(" ")).cvv(None).build();
        assert!(response.authorization.is_none());
        assert!(response.avs_result.is_none());
        assert!(response.cvv_result.is_none());
    }

    #[test]
    fn test_unparsable_keeps_raw_body() {
        let response = Response::unparsable("stripe", 502, b"<html>Bad Gateway</html>");
        assert!(!response.success);
        assert_eq!(response.error_code, Some(StandardErrorCode::ProcessingError));
        assert_eq!(response.param("raw_response"), Some("<html>Bad Gateway</html>"));
        assert!(response.message.contains("stripe"));
    }

    #[test]
    fn test_serialize_skips_empty_options() {
        let value = serde_json::to_value(failed("Declined")).unwrap();
        assert_eq!(value["error_code"], "card_declined");
        assert!(value.get("authorization").is_none());
    }

    #[test]
    fn test_multi_response_first_primary() {
        let mut multi = MultiResponse::first_primary();
        assert!(multi.process(ok("auth")));
        assert!(multi.process(ok("void")));
        assert_eq!(multi.into_response().authorization.as_deref(), Some("auth"));
    }

    #[test]
    fn test_multi_response_failure_becomes_primary() {
        let mut multi = MultiResponse::first_primary();
        multi.process(ok("token"));
        multi.process(failed("charge declined"));
        let response = multi.into_response();
        assert!(!response.success);
        assert_eq!(response.message, "charge declined");
    }

    #[test]
    fn test_multi_response_ignored_step_never_flips_success() {
        let mut multi = MultiResponse::first_primary();
        multi.process(ok("auth"));
        multi.process_ignoring(failed("void failed"));
        assert!(multi.success());
        assert_eq!(multi.responses().len(), 2);
        assert_eq!(multi.into_response().message, "auth");
    }

    #[test]
    fn test_multi_response_last_primary() {
        let mut multi = MultiResponse::new();
        multi.process(ok("token"));
        multi.process(ok("charge"));
        assert_eq!(multi.into_response().message, "charge");
    }

    #[test]
    fn test_empty_multi_response() {
        let response = MultiResponse::new().into_response();
        assert!(!response.success);
    }
}
