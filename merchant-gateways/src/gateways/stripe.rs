//! Stripe: form-encoded requests, JSON replies, HTTP Basic with the secret key.
//!
//! Every POST carries an `Idempotency-Key`, which makes it safe to retry
//! 429/5xx replies and transient network failures. Customers serve as the
//! vault: `store` creates one and returns its id, and a token starting with
//! `cus_` is charged as a customer rather than a source.

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    codec,
    error::{GatewayError, Result},
    gateway::{Call, Connection, Credentials, Gateway, GatewayInfo, Operation, path_segment},
    money::{Money, MoneyFormat},
    payment::{CardBrand, CreditCard, PaymentSource, TransactionOptions},
    response::{AvsResult, MatchCode, Response, StandardErrorCode},
    security::{redact_sensitive, scrub_headers, scrub_pairs},
    signing::basic_auth,
    transport::{HttpRequest, HttpResponse},
};

/// API version sent when the configuration does not pin one.
pub const DEFAULT_API_VERSION: &str = "2020-08-27";

/// Static metadata.
pub static INFO: GatewayInfo = GatewayInfo {
    id: "stripe",
    display_name: "Stripe",
    homepage: "https://stripe.com/",
    test_url: "https://api.stripe.com/v1",
    live_url: "https://api.stripe.com/v1",
    supported_countries: &[
        "AT", "AU", "BE", "BG", "CA", "CH", "CY", "CZ", "DE", "DK", "EE", "ES", "FI", "FR", "GB",
        "GR", "HK", "IE", "IT", "JP", "LT", "LU", "LV", "MT", "MX", "NL", "NO", "NZ", "PL", "PT",
        "RO", "SE", "SG", "SI", "SK", "US",
    ],
    supported_brands: &[
        CardBrand::Visa,
        CardBrand::Master,
        CardBrand::AmericanExpress,
        CardBrand::Discover,
        CardBrand::Jcb,
        CardBrand::DinersClub,
        CardBrand::Maestro,
    ],
    default_currency: "USD",
    money_format: MoneyFormat::Cents,
    operations: &Operation::ALL,
};

type Params = Vec<(String, String)>;

fn push(params: &mut Params, key: &str, value: impl Into<String>) {
    params.push((key.to_owned(), value.into()));
}

fn push_opt(params: &mut Params, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        push(params, key, value);
    }
}

/// Stripe adapter.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    secret_key: String,
    api_version: String,
    connection: Connection,
}

impl StripeGateway {
    /// Creates the adapter from `secret_key` and optional `api_version`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] if `secret_key` is missing.
    pub fn new(credentials: &Credentials, connection: Connection) -> Result<Self> {
        Ok(Self {
            secret_key: credentials.require("secret_key")?.to_owned(),
            api_version: credentials
                .optional("api_version")
                .unwrap_or(DEFAULT_API_VERSION)
                .to_owned(),
            connection,
        })
    }

    fn request(&self, request: HttpRequest, options: &TransactionOptions) -> HttpRequest {
        let request = request
            .header("Authorization", basic_auth(&self.secret_key, ""))
            .header("Stripe-Version", &self.api_version)
            .header("User-Agent", concat!("merchant-gateways/", env!("CARGO_PKG_VERSION")));
        if request.method == crate::transport::HttpMethod::Post {
            let key = options
                .idempotency_key
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            request.header("Idempotency-Key", key)
        } else {
            request
        }
    }

    async fn commit(&self, call: &Call, request: HttpRequest) -> Result<Response> {
        let policy = self.connection.retry_policy();
        let reply = self.connection.send_with_retry(&policy, call, request).await?;
        Ok(self.connection.parse_or_unparsable(call, &reply, parse_reply))
    }

    async fn post(
        &self,
        operation: Operation,
        path: &str,
        params: &Params,
        options: &TransactionOptions,
    ) -> Result<Response> {
        let call = Call::new(INFO.id, operation);
        let request =
            self.request(HttpRequest::post(self.connection.url(&INFO, path)).form(params), options);
        self.commit(&call, request).await
    }

    async fn charge(
        &self,
        operation: Operation,
        money: &Money,
        source: &PaymentSource,
        options: &TransactionOptions,
        capture: bool,
    ) -> Result<Response> {
        source.ensure_valid()?;
        let mut params = Params::new();
        push(&mut params, "amount", INFO.amount(money));
        push(&mut params, "currency", money.currency().code().to_ascii_lowercase());
        push(&mut params, "capture", capture.to_string());
        add_source(&mut params, source, options)?;
        add_details(&mut params, options);
        self.post(operation, "/charges", &params, options).await
    }
}

fn add_card(params: &mut Params, prefix: &str, card: &CreditCard, options: &TransactionOptions) {
    let key = |field: &str| format!("{prefix}[{field}]");
    push(params, &key("number"), card.digits());
    push(params, &key("exp_month"), card.month.to_string());
    push(params, &key("exp_year"), card.year.to_string());
    push_opt(params, &key("cvc"), card.verification_value.as_deref());
    let name = card.name();
    push_opt(params, &key("name"), Some(name.trim()));
    if let Some(address) = options.address() {
        push_opt(params, &key("address_line1"), address.address1.as_deref());
        push_opt(params, &key("address_line2"), address.address2.as_deref());
        push_opt(params, &key("address_city"), address.city.as_deref());
        push_opt(params, &key("address_state"), address.state.as_deref());
        push_opt(params, &key("address_zip"), address.zip.as_deref());
        push_opt(params, &key("address_country"), address.country.as_deref());
    }
}

fn add_source(
    params: &mut Params,
    source: &PaymentSource,
    options: &TransactionOptions,
) -> Result<()> {
    match source {
        PaymentSource::Card(card) => add_card(params, "card", card, options),
        PaymentSource::Token { token } if token.starts_with("cus_") => {
            push(params, "customer", token);
        }
        PaymentSource::Token { token } => {
            push(params, "source", token);
            push_opt(params, "customer", options.customer.as_deref());
        }
        PaymentSource::Check(_) => {
            return Err(GatewayError::InvalidInput(
                "stripe does not accept checks; tokenize the bank account first".to_owned(),
            ));
        }
    }
    Ok(())
}

fn add_details(params: &mut Params, options: &TransactionOptions) {
    push_opt(params, "description", options.description.as_deref());
    push_opt(params, "receipt_email", options.email.as_deref());
    push_opt(params, "metadata[order_id]", options.order_id.as_deref());
    push_opt(params, "metadata[ip]", options.ip.as_deref());
}

fn parse_reply(reply: &HttpResponse) -> std::result::Result<Response, codec::DecodeError> {
    let body = codec::json(&reply.body)?;
    Ok(build_response(reply.status, body))
}

fn build_response(status: u16, body: Value) -> Response {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Stripe reported an error")
            .to_owned();
        let code = error_code(
            error.get("decline_code").and_then(Value::as_str),
            error.get("code").and_then(Value::as_str),
        );
        let authorization = error.get("charge").and_then(Value::as_str).map(str::to_owned);
        return Response::builder(false, message)
            .maybe_authorization(authorization)
            .error_code(code)
            .params(body)
            .build();
    }

    let refused = matches!(body.get("status").and_then(Value::as_str), Some("failed" | "canceled"));
    let success = (200..300).contains(&status) && !refused;
    let checks = card_checks(&body);

    let message = if success { "Transaction approved" } else { "Transaction declined" };
    let mut builder = Response::builder(success, message)
        .maybe_authorization(body.get("id").and_then(Value::as_str).map(str::to_owned))
        .fraud_review(
            body.pointer("/outcome/type").and_then(Value::as_str) == Some("manual_review"),
        );
    if let Some(checks) = checks {
        let street = check_match(checks.get("address_line1_check"));
        let postal = check_match(
            checks.get("address_zip_check").or_else(|| checks.get("address_postal_code_check")),
        );
        if street.is_some() || postal.is_some() {
            builder = builder.avs_result(AvsResult::from_matches(street, postal));
        }
        builder = builder.cvv(cvc_code(checks.get("cvc_check")));
    }
    if !success {
        builder = builder.error_code(StandardErrorCode::CardDeclined);
    }
    builder.params(body).build()
}

/// The object carrying AVS/CVC checks: `payment_method_details.card.checks`
/// on newer API versions, `source` on older ones.
fn card_checks(body: &Value) -> Option<&Value> {
    body.pointer("/payment_method_details/card/checks")
        .or_else(|| body.get("source").filter(|s| s.get("cvc_check").is_some()))
        .or_else(|| body.get("card"))
}

fn check_match(value: Option<&Value>) -> Option<MatchCode> {
    match value.and_then(Value::as_str)? {
        "pass" => Some(MatchCode::Yes),
        "fail" => Some(MatchCode::No),
        "unavailable" => Some(MatchCode::NotSupported),
        _ => None,
    }
}

fn cvc_code(value: Option<&Value>) -> Option<&'static str> {
    match value.and_then(Value::as_str)? {
        "pass" => Some("M"),
        "fail" => Some("N"),
        "unchecked" => Some("P"),
        "unavailable" => Some("U"),
        _ => None,
    }
}

fn error_code(decline_code: Option<&str>, code: Option<&str>) -> StandardErrorCode {
    match decline_code {
        Some("call_issuer") => return StandardErrorCode::CallIssuer,
        Some("pickup_card" | "lost_card" | "stolen_card") => return StandardErrorCode::PickupCard,
        Some("incorrect_pin" | "invalid_pin") => return StandardErrorCode::IncorrectPin,
        _ => {}
    }
    match code {
        Some("incorrect_number") => StandardErrorCode::IncorrectNumber,
        Some("invalid_number") => StandardErrorCode::InvalidNumber,
        Some("invalid_expiry_month" | "invalid_expiry_year") => {
            StandardErrorCode::InvalidExpiryDate
        }
        Some("invalid_cvc") => StandardErrorCode::InvalidCvc,
        Some("expired_card") => StandardErrorCode::ExpiredCard,
        Some("incorrect_cvc") => StandardErrorCode::IncorrectCvc,
        Some("incorrect_zip") => StandardErrorCode::IncorrectZip,
        Some("card_declined") => StandardErrorCode::CardDeclined,
        Some("amount_too_small" | "amount_too_large" | "invalid_charge_amount") => {
            StandardErrorCode::InvalidAmount
        }
        Some("testmode_charges_only") => StandardErrorCode::TestModeLiveCard,
        _ => StandardErrorCode::ProcessingError,
    }
}

#[async_trait]
impl Gateway for StripeGateway {
    fn info(&self) -> &'static GatewayInfo {
        &INFO
    }

    fn test_mode(&self) -> bool {
        self.connection.test()
    }

    #[instrument(skip_all, fields(gateway = INFO.id, amount = money.cents()))]
    async fn purchase(
        &self,
        money: &Money,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        self.charge(Operation::Purchase, money, source, options, true).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, amount = money.cents()))]
    async fn authorize(
        &self,
        money: &Money,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        self.charge(Operation::Authorize, money, source, options, false).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn capture(
        &self,
        money: &Money,
        authorization: &str,
        options: &TransactionOptions,
    ) -> Result<Response> {
        let mut params = Params::new();
        push(&mut params, "amount", INFO.amount(money));
        let path = format!("/charges/{}/capture", path_segment(authorization)?);
        self.post(Operation::Capture, &path, &params, options).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn refund(
        &self,
        money: &Money,
        authorization: &str,
        options: &TransactionOptions,
    ) -> Result<Response> {
        let mut params = Params::new();
        push(&mut params, "charge", authorization);
        push(&mut params, "amount", INFO.amount(money));
        push_opt(&mut params, "metadata[order_id]", options.order_id.as_deref());
        self.post(Operation::Refund, "/refunds", &params, options).await
    }

    /// Refunds the whole charge; Stripe releases uncaptured funds the same way.
    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn void(&self, authorization: &str, options: &TransactionOptions) -> Result<Response> {
        let mut params = Params::new();
        push(&mut params, "charge", authorization);
        self.post(Operation::Void, "/refunds", &params, options).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn store(
        &self,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        source.ensure_valid()?;
        let mut params = Params::new();
        match source {
            PaymentSource::Card(card) => add_card(&mut params, "card", card, options),
            PaymentSource::Token { token } => push(&mut params, "source", token),
            PaymentSource::Check(_) => {
                return Err(GatewayError::InvalidInput("stripe cannot vault checks".to_owned()));
            }
        }
        push_opt(&mut params, "description", options.description.as_deref());
        push_opt(&mut params, "email", options.email.as_deref());
        self.post(Operation::Store, "/customers", &params, options).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn unstore(&self, token: &str, options: &TransactionOptions) -> Result<Response> {
        let call = Call::new(INFO.id, Operation::Unstore);
        let url = self.connection.url(&INFO, &format!("/customers/{}", path_segment(token)?));
        let request = self.request(HttpRequest::delete(url), options);
        self.commit(&call, request).await
    }

    fn scrub(&self, transcript: &str) -> String {
        let scrubbed = scrub_headers(transcript, &["authorization"]);
        let scrubbed = scrub_pairs(
            &scrubbed,
            &["card[number]", "card%5Bnumber%5D", "card[cvc]", "card%5Bcvc%5D"],
        );
        redact_sensitive(&scrubbed)
    }
}
