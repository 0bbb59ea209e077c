//! Checkout.com unified payments API (JSON).
//!
//! Payments are authenticated with the secret key. Card tokenization uses
//! the public key: `store` first exchanges the card for a `tok_` token at
//! `/tokens`, then turns the token into a reusable instrument. Capture,
//! refund and void are asynchronous actions acknowledged with HTTP 202.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::instrument;

use crate::{
    codec::{self, DecodeError},
    error::{GatewayError, Result},
    gateway::{Call, Connection, Credentials, Gateway, GatewayInfo, Operation, path_segment},
    money::{Money, MoneyFormat},
    payment::{CardBrand, CreditCard, PaymentSource, TransactionOptions},
    response::{MultiResponse, Response, StandardErrorCode},
    security::{redact_sensitive, scrub_headers, scrub_pairs},
    transport::{HttpRequest, HttpResponse},
};

/// Static metadata.
pub static INFO: GatewayInfo = GatewayInfo {
    id: "checkout",
    display_name: "Checkout.com Unified Payments",
    homepage: "https://www.checkout.com/",
    test_url: "https://api.sandbox.checkout.com",
    live_url: "https://api.checkout.com",
    supported_countries: &[
        "AD", "AE", "AR", "AT", "AU", "BE", "BG", "BH", "BR", "CH", "CL", "CN", "CO", "CY", "CZ",
        "DE", "DK", "EE", "EG", "ES", "FI", "FR", "GB", "GR", "HK", "HR", "HU", "IE", "IS", "IT",
        "JO", "JP", "KW", "LI", "LT", "LU", "LV", "MC", "MT", "MX", "MY", "NL", "NO", "NZ", "OM",
        "PE", "PL", "PT", "QA", "RO", "SA", "SE", "SG", "SI", "SK", "SM", "TR", "US",
    ],
    supported_brands: &[
        CardBrand::Visa,
        CardBrand::Master,
        CardBrand::AmericanExpress,
        CardBrand::DinersClub,
        CardBrand::Maestro,
        CardBrand::Discover,
        CardBrand::Jcb,
    ],
    default_currency: "USD",
    money_format: MoneyFormat::Cents,
    operations: &Operation::ALL,
};

/// Checkout.com adapter.
#[derive(Debug, Clone)]
pub struct CheckoutGateway {
    secret_key: String,
    public_key: Option<String>,
    connection: Connection,
}

/// Which key authenticates a request.
#[derive(Debug, Clone, Copy)]
enum Key {
    Secret,
    Public,
}

impl CheckoutGateway {
    /// Creates the adapter from `secret_key` and optional `public_key`
    /// (needed to vault raw cards).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] if `secret_key` is missing.
    pub fn new(credentials: &Credentials, connection: Connection) -> Result<Self> {
        Ok(Self {
            secret_key: credentials.require("secret_key")?.to_owned(),
            public_key: credentials.optional("public_key").map(str::to_owned),
            connection,
        })
    }

    async fn commit(&self, call: &Call, request: HttpRequest, key: Key) -> Result<Response> {
        let key = match key {
            Key::Secret => self.secret_key.as_str(),
            Key::Public => self.public_key.as_deref().ok_or_else(|| {
                GatewayError::ConfigError("missing credential 'public_key'".to_owned())
            })?,
        };
        let request = request.header("Authorization", key);
        let reply = self.connection.send(call, request).await?;
        Ok(self.connection.parse_or_unparsable(call, &reply, parse_reply))
    }

    async fn post(&self, operation: Operation, path: &str, body: &Value) -> Result<Response> {
        let call = Call::new(INFO.id, operation);
        let request = HttpRequest::post(self.connection.url(&INFO, path)).json(body);
        self.commit(&call, request, Key::Secret).await
    }

    async fn payment(
        &self,
        operation: Operation,
        money: &Money,
        source: &PaymentSource,
        options: &TransactionOptions,
        capture: bool,
    ) -> Result<Response> {
        source.ensure_valid()?;
        let mut body = Map::new();
        body.insert("source".to_owned(), source_json(source, options)?);
        body.insert("amount".to_owned(), json!(money.cents()));
        body.insert("currency".to_owned(), json!(money.currency().code()));
        body.insert("capture".to_owned(), json!(capture));
        body.insert("reference".to_owned(), json!(super::order_reference(options)));
        if let Some(description) = &options.description {
            body.insert("description".to_owned(), json!(description));
        }
        if let Some(email) = &options.email {
            body.insert("customer".to_owned(), json!({ "email": email }));
        }
        if let Some(ip) = &options.ip {
            body.insert("payment_ip".to_owned(), json!(ip));
        }
        self.post(operation, "/payments", &Value::Object(body)).await
    }

    fn action_body(money: Option<&Money>, options: &TransactionOptions) -> Value {
        let mut body = Map::new();
        if let Some(money) = money {
            body.insert("amount".to_owned(), json!(money.cents()));
        }
        if let Some(order_id) = &options.order_id {
            body.insert("reference".to_owned(), json!(order_id));
        }
        Value::Object(body)
    }
}

fn card_fields(card: &CreditCard) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("number".to_owned(), json!(card.digits()));
    fields.insert("expiry_month".to_owned(), json!(card.month));
    fields.insert("expiry_year".to_owned(), json!(card.year));
    if let Some(cvv) = &card.verification_value {
        fields.insert("cvv".to_owned(), json!(cvv));
    }
    let name = card.name();
    if !name.trim().is_empty() {
        fields.insert("name".to_owned(), json!(name.trim()));
    }
    fields
}

fn source_json(source: &PaymentSource, options: &TransactionOptions) -> Result<Value> {
    match source {
        PaymentSource::Card(card) => {
            let mut fields = card_fields(card);
            fields.insert("type".to_owned(), json!("card"));
            if let Some(address) = options.address() {
                fields.insert(
                    "billing_address".to_owned(),
                    json!({
                        "address_line1": address.address1,
                        "address_line2": address.address2,
                        "city": address.city,
                        "state": address.state,
                        "zip": address.zip,
                        "country": address.country,
                    }),
                );
            }
            Ok(Value::Object(fields))
        }
        PaymentSource::Token { token } if token.starts_with("tok_") => {
            Ok(json!({ "type": "token", "token": token }))
        }
        PaymentSource::Token { token } => Ok(json!({ "type": "id", "id": token })),
        PaymentSource::Check(_) => {
            Err(GatewayError::InvalidInput("checkout does not accept checks".to_owned()))
        }
    }
}

fn parse_reply(reply: &HttpResponse) -> std::result::Result<Response, DecodeError> {
    if reply.status == 204 || (reply.body.is_empty() && reply.is_success()) {
        return Ok(Response::builder(true, "Succeeded").build());
    }
    let body = codec::json(&reply.body)?;
    Ok(build_response(reply.status, body))
}

fn build_response(status: u16, body: Value) -> Response {
    let str_at = |pointer: &str| body.pointer(pointer).and_then(Value::as_str).map(str::to_owned);

    // 202 acknowledges an asynchronous action (capture, refund, void).
    let action = status == 202 && body.get("action_id").is_some();
    let approved = body.get("approved").and_then(Value::as_bool);
    let success = (200..300).contains(&status)
        && (action || approved.unwrap_or(body.get("error_type").is_none()));

    let message = if success {
        "Succeeded".to_owned()
    } else {
        str_at("/response_summary")
            .or_else(|| {
                body.get("error_codes")
                    .and_then(Value::as_array)
                    .map(|codes| {
                        codes.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(", ")
                    })
            })
            .or_else(|| str_at("/error_type"))
            .unwrap_or_else(|| format!("Request failed with HTTP {status}"))
    };

    let authorization = str_at("/id").or_else(|| str_at("/action_id"));
    let mut builder = Response::builder(success, message)
        .maybe_authorization(authorization)
        .avs(body.pointer("/source/avs_check").and_then(Value::as_str))
        .cvv(body.pointer("/source/cvv_check").and_then(Value::as_str))
        .fraud_review(body.pointer("/risk/flagged").and_then(Value::as_bool) == Some(true));
    if !success {
        builder = builder.error_code(error_code(&body));
    }
    builder.params(body).build()
}

fn error_code(body: &Value) -> StandardErrorCode {
    let validation = body
        .get("error_codes")
        .and_then(Value::as_array)
        .and_then(|codes| codes.first())
        .and_then(Value::as_str);
    match validation {
        Some("card_number_invalid") => return StandardErrorCode::InvalidNumber,
        Some("card_expired") => return StandardErrorCode::ExpiredCard,
        Some("card_expiry_month_invalid" | "card_expiry_year_invalid") => {
            return StandardErrorCode::InvalidExpiryDate;
        }
        Some("cvv_invalid") => return StandardErrorCode::InvalidCvc,
        Some("amount_invalid") => return StandardErrorCode::InvalidAmount,
        Some(_) => return StandardErrorCode::ProcessingError,
        None => {}
    }
    match body.get("response_code").and_then(Value::as_str) {
        Some("20014") => StandardErrorCode::InvalidNumber,
        Some("20054" | "30033") => StandardErrorCode::ExpiredCard,
        Some("20087" | "20100") => StandardErrorCode::IncorrectCvc,
        Some("20001" | "20002" | "20004") => StandardErrorCode::CallIssuer,
        Some("30004" | "30041" | "30043") => StandardErrorCode::PickupCard,
        Some("20055") => StandardErrorCode::IncorrectPin,
        Some("20013") => StandardErrorCode::InvalidAmount,
        Some(code) if code.starts_with('2') || code.starts_with('3') => {
            StandardErrorCode::CardDeclined
        }
        _ => StandardErrorCode::ProcessingError,
    }
}

#[async_trait]
impl Gateway for CheckoutGateway {
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
        self.payment(Operation::Purchase, money, source, options, true).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, amount = money.cents()))]
    async fn authorize(
        &self,
        money: &Money,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        self.payment(Operation::Authorize, money, source, options, false).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn capture(
        &self,
        money: &Money,
        authorization: &str,
        options: &TransactionOptions,
    ) -> Result<Response> {
        let body = Self::action_body(Some(money), options);
        let path = format!("/payments/{}/captures", path_segment(authorization)?);
        self.post(Operation::Capture, &path, &body).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn refund(
        &self,
        money: &Money,
        authorization: &str,
        options: &TransactionOptions,
    ) -> Result<Response> {
        let body = Self::action_body(Some(money), options);
        let path = format!("/payments/{}/refunds", path_segment(authorization)?);
        self.post(Operation::Refund, &path, &body).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn void(&self, authorization: &str, options: &TransactionOptions) -> Result<Response> {
        let body = Self::action_body(None, options);
        let path = format!("/payments/{}/voids", path_segment(authorization)?);
        self.post(Operation::Void, &path, &body).await
    }

    /// Tokenizes a card with the public key, then creates an instrument.
    /// The authorization is the instrument id (`src_...`).
    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn store(
        &self,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        source.ensure_valid()?;
        let mut multi = MultiResponse::new();

        let token = match source {
            PaymentSource::Card(card) => {
                let mut fields = card_fields(card);
                fields.insert("type".to_owned(), json!("card"));
                let call = Call::new(INFO.id, Operation::Store);
                let request = HttpRequest::post(self.connection.url(&INFO, "/tokens"))
                    .json(&Value::Object(fields));
                let tokenized = self.commit(&call, request, Key::Public).await?;
                let token = tokenized.param("token").map(str::to_owned);
                if !multi.process(tokenized) {
                    return Ok(multi.into_response());
                }
                token.ok_or_else(|| GatewayError::InvalidResponse {
                    gateway: INFO.id,
                    message: "token response carried no token".to_owned(),
                })?
            }
            PaymentSource::Token { token } => token.clone(),
            PaymentSource::Check(_) => {
                return Err(GatewayError::InvalidInput("checkout can only vault cards".to_owned()));
            }
        };

        let mut body = json!({ "type": "token", "token": token });
        if let Some(email) = &options.email {
            body["customer"] = json!({ "email": email });
        }
        multi.process(self.post(Operation::Store, "/instruments", &body).await?);
        Ok(multi.into_response())
    }

    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn unstore(&self, token: &str, _options: &TransactionOptions) -> Result<Response> {
        let call = Call::new(INFO.id, Operation::Unstore);
        let path = format!("/instruments/{}", path_segment(token)?);
        let request = HttpRequest::delete(self.connection.url(&INFO, &path));
        self.commit(&call, request, Key::Secret).await
    }

    /// Zero-amount card verification.
    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn verify(&self, card: &CreditCard, options: &TransactionOptions) -> Result<Response> {
        let money = Money::new(0, INFO.currency(options))?;
        self.payment(Operation::Verify, &money, &PaymentSource::Card(card.clone()), options, false)
            .await
    }

    fn scrub(&self, transcript: &str) -> String {
        let scrubbed = scrub_headers(transcript, &["authorization"]);
        redact_sensitive(&scrub_pairs(&scrubbed, &["number", "cvv"]))
    }
}
