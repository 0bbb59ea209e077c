//! Global Payments GP-API (JSON).
//!
//! Each operation first exchanges `app_id`/`app_key` for an access token at
//! `/accesstoken` and then makes the call with `Authorization: Bearer`.
//! Tokens are not cached; both steps are recorded in a [`MultiResponse`]
//! and a failed token step ends the operation.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use crate::{
    codec::{self, DecodeError},
    error::{GatewayError, Result},
    gateway::{Call, Connection, Credentials, Gateway, GatewayInfo, Operation, path_segment},
    money::{Money, MoneyFormat},
    payment::{CardBrand, CreditCard, PaymentSource, TransactionOptions},
    response::{AvsResult, MatchCode, MultiResponse, Response, StandardErrorCode},
    security::{redact_sensitive, scrub_headers, scrub_pairs},
    signing::sha512_hex,
    transport::{HttpMethod, HttpRequest, HttpResponse},
};

/// Value of the `X-GP-Version` header.
pub const API_VERSION: &str = "2021-03-22";

const DEFAULT_ACCOUNT_NAME: &str = "transaction_processing";
const DEFAULT_CHANNEL: &str = "CNP";
const DEFAULT_COUNTRY: &str = "US";

/// Transaction statuses that mean the call did what was asked.
const SUCCESS_STATUSES: &[&str] =
    &["CAPTURED", "PREAUTHORIZED", "VERIFIED", "REVERSED", "FUNDED", "ACTIVE", "DELETED"];

/// Static metadata.
pub static INFO: GatewayInfo = GatewayInfo {
    id: "global_payments",
    display_name: "Global Payments",
    homepage: "https://developer.globalpay.com/",
    test_url: "https://apis.sandbox.globalpay.com/ucp",
    live_url: "https://apis.globalpay.com/ucp",
    supported_countries: &["AU", "CA", "FR", "DE", "GB", "GR", "IE", "IT", "MX", "NZ", "ES", "US"],
    supported_brands: &[
        CardBrand::Visa,
        CardBrand::Master,
        CardBrand::AmericanExpress,
        CardBrand::Discover,
        CardBrand::DinersClub,
        CardBrand::Jcb,
    ],
    default_currency: "USD",
    money_format: MoneyFormat::Cents,
    operations: &Operation::ALL,
};

/// Global Payments adapter.
#[derive(Debug, Clone)]
pub struct GlobalPaymentsGateway {
    app_id: String,
    app_key: String,
    account_name: String,
    channel: String,
    country: String,
    connection: Connection,
}

impl GlobalPaymentsGateway {
    /// Creates the adapter from `app_id` and `app_key`. `account_name`,
    /// `channel` and `country` are optional.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::GatewayError::ConfigError`] if a required
    /// credential is missing.
    pub fn new(credentials: &Credentials, connection: Connection) -> Result<Self> {
        Ok(Self {
            app_id: credentials.require("app_id")?.to_owned(),
            app_key: credentials.require("app_key")?.to_owned(),
            account_name: credentials
                .optional("account_name")
                .unwrap_or(DEFAULT_ACCOUNT_NAME)
                .to_owned(),
            channel: credentials.optional("channel").unwrap_or(DEFAULT_CHANNEL).to_owned(),
            country: credentials.optional("country").unwrap_or(DEFAULT_COUNTRY).to_owned(),
            connection,
        })
    }

    /// Requests an access token, recording the step in `multi`. Returns the
    /// token when the step succeeded.
    async fn access_token(
        &self,
        multi: &mut MultiResponse,
        operation: Operation,
    ) -> Result<Option<String>> {
        let nonce = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let body = json!({
            "app_id": self.app_id,
            "nonce": nonce,
            "secret": sha512_hex(format!("{nonce}{}", self.app_key).as_bytes()),
            "grant_type": "client_credentials",
        });
        let request = HttpRequest::post(self.connection.url(&INFO, "/accesstoken"))
            .header("X-GP-Version", API_VERSION)
            .json(&body);

        let call = Call::new(INFO.id, operation);
        let reply = self.connection.send(&call, request).await?;
        let response = self.connection.parse_or_unparsable(&call, &reply, parse_token);
        let token = response.param("token").map(str::to_owned);
        if multi.process(response) {
            debug!(gateway = INFO.id, "Access token issued");
            Ok(token)
        } else {
            Ok(None)
        }
    }

    async fn commit(
        &self,
        operation: Operation,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response> {
        let mut multi = MultiResponse::new();
        let Some(token) = self.access_token(&mut multi, operation).await? else {
            return Ok(multi.into_response());
        };

        let mut request = HttpRequest::new(method, self.connection.url(&INFO, path))
            .header("Authorization", format!("Bearer {token}"))
            .header("X-GP-Version", API_VERSION);
        if let Some(body) = body {
            request = request.json(body);
        }

        let call = Call::new(INFO.id, operation);
        let reply = self.connection.send(&call, request).await?;
        multi.process(self.connection.parse_or_unparsable(&call, &reply, parse_reply));
        Ok(multi.into_response())
    }

    fn base(&self, money: Option<&Money>, options: &TransactionOptions) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("account_name".to_owned(), json!(self.account_name));
        body.insert("channel".to_owned(), json!(self.channel));
        body.insert("reference".to_owned(), json!(super::order_reference(options)));
        body.insert("country".to_owned(), json!(self.country));
        match money {
            Some(money) => {
                body.insert("amount".to_owned(), json!(INFO.amount(money)));
                body.insert("currency".to_owned(), json!(money.currency().code()));
            }
            None => {
                body.insert("currency".to_owned(), json!(INFO.currency(options).code()));
            }
        }
        if let Some(ip) = &options.ip {
            body.insert("ip_address".to_owned(), json!(ip));
        }
        body
    }

    async fn transaction(
        &self,
        operation: Operation,
        money: &Money,
        source: &PaymentSource,
        options: &TransactionOptions,
        capture_mode: &str,
    ) -> Result<Response> {
        source.ensure_valid()?;
        let mut body = self.base(Some(money), options);
        body.insert("type".to_owned(), json!("SALE"));
        body.insert("capture_mode".to_owned(), json!(capture_mode));
        body.insert("payment_method".to_owned(), payment_method(source, options));
        self.commit(operation, HttpMethod::Post, "/transactions", Some(&Value::Object(body)))
            .await
    }
}

fn card_json(card: &CreditCard) -> Value {
    let mut fields = Map::new();
    fields.insert("number".to_owned(), json!(card.digits()));
    fields.insert("expiry_month".to_owned(), json!(card.month_padded()));
    fields.insert("expiry_year".to_owned(), json!(format!("{:02}", card.year.rem_euclid(100))));
    if let Some(cvv) = &card.verification_value {
        fields.insert("cvv".to_owned(), json!(cvv));
        fields.insert("cvv_indicator".to_owned(), json!("PRESENT"));
    }
    Value::Object(fields)
}

fn payment_method(source: &PaymentSource, options: &TransactionOptions) -> Value {
    match source {
        PaymentSource::Card(card) => json!({
            "name": card.name().trim(),
            "entry_mode": "ECOM",
            "card": card_json(card),
        }),
        PaymentSource::Check(check) => json!({
            "name": check.name,
            "entry_mode": "ECOM",
            "bank_transfer": {
                "account_number": check.account_number,
                "account_type": check.account_type.as_str().to_ascii_uppercase(),
                "check_reference": options.order_id.as_deref().unwrap_or_default(),
                "sec_code": "WEB",
                "bank": { "code": check.routing_number },
            },
        }),
        PaymentSource::Token { token } => json!({
            "id": token,
            "entry_mode": "ECOM",
        }),
    }
}

fn parse_token(reply: &HttpResponse) -> std::result::Result<Response, DecodeError> {
    let body = codec::json(&reply.body)?;
    let success = reply.is_success() && body.get("token").and_then(Value::as_str).is_some();
    if success {
        return Ok(Response::builder(true, "Access token issued").params(body).build());
    }
    let message = error_message(&body).unwrap_or("Access token request failed").to_owned();
    Ok(Response::builder(false, message)
        .error_code(StandardErrorCode::ConfigError)
        .params(body)
        .build())
}

fn error_message(body: &Value) -> Option<&str> {
    body.get("detailed_error_description")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
}

fn parse_reply(reply: &HttpResponse) -> std::result::Result<Response, DecodeError> {
    let body = codec::json(&reply.body)?;
    let status = body.get("status").and_then(Value::as_str).unwrap_or_default();
    let api_error = body.get("error_code").and_then(Value::as_str);
    let success = api_error.is_none() && SUCCESS_STATUSES.contains(&status);

    let method_message = body.pointer("/payment_method/message").and_then(Value::as_str);
    let message = if success {
        method_message.unwrap_or(status).to_owned()
    } else {
        error_message(&body)
            .or(method_message)
            .or(api_error)
            .or(Some(status).filter(|s| !s.is_empty()))
            .unwrap_or("Transaction failed")
            .to_owned()
    };

    let card = body.pointer("/payment_method/card");
    let avs = card.map(|card| {
        AvsResult::from_matches(
            card.get("avs_address_result").and_then(Value::as_str).and_then(match_code),
            card.get("avs_postal_code_result").and_then(Value::as_str).and_then(match_code),
        )
    });

    let mut builder = Response::builder(success, message)
        .maybe_authorization(body.get("id").and_then(Value::as_str).map(str::to_owned))
        .cvv(card.and_then(|c| c.get("cvv_result")).and_then(Value::as_str).map(cvv_code));
    if let Some(avs) = avs.filter(|a| a.code.is_some()) {
        builder = builder.avs_result(avs);
    }
    if !success {
        let result = body.pointer("/payment_method/result").and_then(Value::as_str);
        builder = builder.error_code(error_code(api_error, result));
    }
    Ok(builder.params(body).build())
}

fn match_code(result: &str) -> Option<MatchCode> {
    match result {
        "MATCHED" => Some(MatchCode::Yes),
        "NOT_MATCHED" => Some(MatchCode::No),
        "NOT_CHECKED" => Some(MatchCode::NotSupported),
        _ => None,
    }
}

fn cvv_code(result: &str) -> &'static str {
    match result {
        "MATCHED" => "M",
        "NOT_MATCHED" => "N",
        "NOT_CHECKED" => "P",
        _ => "U",
    }
}

/// Maps the API `error_code` or the issuer `payment_method.result`.
fn error_code(api_error: Option<&str>, result: Option<&str>) -> StandardErrorCode {
    match (api_error, result) {
        (Some("NOT_AUTHENTICATED" | "ACTION_NOT_AUTHORIZED" | "UNAUTHORIZED_DOWNSTREAM"), _) => {
            StandardErrorCode::ConfigError
        }
        (Some(_), _) => StandardErrorCode::ProcessingError,
        (None, Some("14")) => StandardErrorCode::InvalidNumber,
        (None, Some("54")) => StandardErrorCode::ExpiredCard,
        (None, Some("41" | "43")) => StandardErrorCode::PickupCard,
        (None, Some("N7" | "82")) => StandardErrorCode::IncorrectCvc,
        (None, Some("01" | "02")) => StandardErrorCode::CallIssuer,
        (None, Some("13")) => StandardErrorCode::InvalidAmount,
        (None, Some(_)) => StandardErrorCode::CardDeclined,
        (None, None) => StandardErrorCode::ProcessingError,
    }
}

#[async_trait]
impl Gateway for GlobalPaymentsGateway {
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
        self.transaction(Operation::Purchase, money, source, options, "AUTO").await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, amount = money.cents()))]
    async fn authorize(
        &self,
        money: &Money,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        self.transaction(Operation::Authorize, money, source, options, "LATER").await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn capture(
        &self,
        money: &Money,
        authorization: &str,
        _options: &TransactionOptions,
    ) -> Result<Response> {
        let body = json!({ "amount": INFO.amount(money) });
        self.commit(
            Operation::Capture,
            HttpMethod::Post,
            &format!("/transactions/{}/capture", path_segment(authorization)?),
            Some(&body),
        )
        .await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn refund(
        &self,
        money: &Money,
        authorization: &str,
        _options: &TransactionOptions,
    ) -> Result<Response> {
        let body = json!({ "amount": INFO.amount(money) });
        self.commit(
            Operation::Refund,
            HttpMethod::Post,
            &format!("/transactions/{}/refund", path_segment(authorization)?),
            Some(&body),
        )
        .await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn void(&self, authorization: &str, _options: &TransactionOptions) -> Result<Response> {
        self.commit(
            Operation::Void,
            HttpMethod::Post,
            &format!("/transactions/{}/reversal", path_segment(authorization)?),
            Some(&json!({})),
        )
        .await
    }

    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn store(
        &self,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        source.ensure_valid()?;
        let PaymentSource::Card(card) = source else {
            return Err(GatewayError::InvalidInput(
                "global payments can only vault cards".to_owned(),
            ));
        };
        let body = json!({
            "account_name": self.account_name,
            "reference": super::order_reference(options),
            "usage_mode": "MULTIPLE",
            "name": card.name().trim(),
            "card": card_json(card),
        });
        self.commit(Operation::Store, HttpMethod::Post, "/payment-methods", Some(&body)).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn unstore(&self, token: &str, _options: &TransactionOptions) -> Result<Response> {
        let path = format!("/payment-methods/{}", path_segment(token)?);
        self.commit(Operation::Unstore, HttpMethod::Delete, &path, None).await
    }

    /// Uses the native `/verifications` endpoint; nothing is authorized.
    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn verify(&self, card: &CreditCard, options: &TransactionOptions) -> Result<Response> {
        card.ensure_valid()?;
        let mut body = self.base(None, options);
        let method = payment_method(&PaymentSource::Card(card.clone()), options);
        body.insert("payment_method".to_owned(), method);
        let body = Value::Object(body);
        self.commit(Operation::Verify, HttpMethod::Post, "/verifications", Some(&body)).await
    }

    fn scrub(&self, transcript: &str) -> String {
        let scrubbed = scrub_headers(transcript, &["authorization"]);
        let scrubbed =
            scrub_pairs(&scrubbed, &["number", "cvv", "secret", "token", "account_number"]);
        redact_sensitive(&scrubbed)
    }
}
