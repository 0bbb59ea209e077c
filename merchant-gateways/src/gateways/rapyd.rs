//! Rapyd REST API (JSON) with HMAC request signatures.
//!
//! Every request carries `access_key`, `salt`, `timestamp` and `signature`
//! headers, where the signature is
//! `base64url(hex(hmac_sha256(secret, method + path + salt + timestamp + access_key + secret + body)))`
//! and `method` is lower case. Vaulted sources are `customer_id|payment_method_id`.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::instrument;
use url::Url;

use crate::{
    codec::{self, DecodeError},
    error::{GatewayError, Result},
    gateway::{Call, Connection, Credentials, Gateway, GatewayInfo, Operation, path_segment},
    money::{Money, MoneyFormat},
    payment::{CardBrand, CreditCard, PaymentSource, TransactionOptions},
    response::{Response, StandardErrorCode},
    security::{redact_sensitive, scrub_headers, scrub_pairs},
    signing::{base64_url, hmac_sha256_hex, random_alphanumeric, unix_timestamp},
    transport::{HttpMethod, HttpRequest, HttpResponse},
};

/// Payment method type used when the options carry no `pm_type`.
pub const DEFAULT_CARD_TYPE: &str = "us_debit_visa_card";

/// Static metadata.
pub static INFO: GatewayInfo = GatewayInfo {
    id: "rapyd",
    display_name: "Rapyd Gateway",
    homepage: "https://www.rapyd.net/",
    test_url: "https://sandboxapi.rapyd.net",
    live_url: "https://api.rapyd.net",
    supported_countries: &[
        "CA", "CL", "CO", "DO", "SV", "PE", "PT", "VI", "AU", "HK", "IN", "ID", "JP", "MY", "NZ",
        "PH", "SG", "KR", "TW", "TH", "VN", "AD", "AT", "BE", "BA", "BG", "HR", "CY", "CZ", "DK",
        "EE", "FI", "FR", "GE", "DE", "GI", "GR", "GL", "HU", "IS", "IE", "IL", "IT", "LV", "LI",
        "LT", "LU", "MK", "MT", "MD", "MC", "ME", "NL", "GB", "NO", "PL", "RO", "RU", "SM", "SK",
        "SI", "ZA", "ES", "SE", "CH", "TR", "VA", "US",
    ],
    supported_brands: &[
        CardBrand::Visa,
        CardBrand::Master,
        CardBrand::AmericanExpress,
        CardBrand::Jcb,
        CardBrand::DinersClub,
        CardBrand::Maestro,
        CardBrand::Discover,
    ],
    default_currency: "USD",
    money_format: MoneyFormat::Dollars,
    operations: &Operation::ALL,
};

/// Computes the request signature.
///
/// # Errors
///
/// Returns [`GatewayError::Signature`] if the HMAC key is rejected.
///
/// # Examples
///
/// ```
/// use merchant_gateways::gateways::rapyd::signature;
///
/// let sig =
///     signature("post", "/v1/payments", "salt", 1_700_000_000, "access", "secret", "{}").unwrap();
/// assert_eq!(sig.len(), 88);
/// ```
pub fn signature(
    method: &str,
    path: &str,
    salt: &str,
    timestamp: i64,
    access_key: &str,
    secret_key: &str,
    body: &str,
) -> Result<String> {
    let to_sign = format!("{method}{path}{salt}{timestamp}{access_key}{secret_key}{body}");
    let hex = hmac_sha256_hex(secret_key.as_bytes(), to_sign.as_bytes())?;
    Ok(base64_url(hex.as_bytes()))
}

/// Rapyd adapter.
#[derive(Debug, Clone)]
pub struct RapydGateway {
    access_key: String,
    secret_key: String,
    connection: Connection,
}

impl RapydGateway {
    /// Creates the adapter from `access_key` and `secret_key`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] if a credential is missing.
    pub fn new(credentials: &Credentials, connection: Connection) -> Result<Self> {
        Ok(Self {
            access_key: credentials.require("access_key")?.to_owned(),
            secret_key: credentials.require("secret_key")?.to_owned(),
            connection,
        })
    }

    /// Signs and sends a request to `path` (relative to `/v1`).
    async fn commit(
        &self,
        operation: Operation,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        options: &TransactionOptions,
    ) -> Result<Response> {
        let url = self.connection.url(&INFO, &format!("/v1{path}"));
        let signed_path = Url::parse(&url)
            .map(|u| match u.query() {
                Some(query) => format!("{}?{query}", u.path()),
                None => u.path().to_owned(),
            })
            .map_err(|e| GatewayError::InvalidInput(format!("invalid rapyd url '{url}': {e}")))?;
        let body = body.map(Value::to_string).unwrap_or_default();

        let salt = random_alphanumeric(12);
        let timestamp = unix_timestamp();
        let signature = signature(
            &method.as_str().to_ascii_lowercase(),
            &signed_path,
            &salt,
            timestamp,
            &self.access_key,
            &self.secret_key,
            &body,
        )?;

        let mut request = HttpRequest::new(method, url)
            .header("Content-Type", "application/json")
            .header("access_key", &self.access_key)
            .header("salt", salt)
            .header("timestamp", timestamp.to_string())
            .header("signature", signature);
        if let Some(key) = &options.idempotency_key {
            request = request.header("idempotency", key);
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let call = Call::new(INFO.id, operation);
        let reply = self.connection.send(&call, request).await?;
        Ok(self
            .connection
            .parse_or_unparsable(&call, &reply, |reply| parse_reply(reply, operation)))
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
        body.insert("amount".to_owned(), json!(INFO.amount(money)));
        body.insert("currency".to_owned(), json!(money.currency().code()));
        add_source(&mut body, source, options);
        body.insert("capture".to_owned(), json!(capture));
        body.insert("merchant_reference_id".to_owned(), json!(super::order_reference(options)));
        if let Some(description) = &options.description {
            body.insert("description".to_owned(), json!(description));
        }
        if let Some(email) = &options.email {
            body.insert("receipt_email".to_owned(), json!(email));
        }
        if let Some(ewallet) = options.extra("ewallet_id") {
            body.insert("ewallet".to_owned(), json!(ewallet));
        }
        self.commit(operation, HttpMethod::Post, "/payments", Some(&Value::Object(body)), options)
            .await
    }
}

fn card_method(card: &CreditCard, options: &TransactionOptions) -> Value {
    let mut fields = Map::new();
    fields.insert("number".to_owned(), json!(card.digits()));
    fields.insert("expiration_month".to_owned(), json!(card.month_padded()));
    fields.insert("expiration_year".to_owned(), json!(format!("{:02}", card.year.rem_euclid(100))));
    fields.insert("name".to_owned(), json!(card.name().trim()));
    if let Some(cvv) = &card.verification_value {
        fields.insert("cvv".to_owned(), json!(cvv));
    }
    json!({
        "type": options.extra("pm_type").unwrap_or(DEFAULT_CARD_TYPE),
        "fields": fields,
    })
}

fn add_source(body: &mut Map<String, Value>, source: &PaymentSource, options: &TransactionOptions) {
    match source {
        PaymentSource::Card(card) => {
            body.insert("payment_method".to_owned(), card_method(card, options));
        }
        PaymentSource::Check(check) => {
            let (first, last) = check.name.rsplit_once(' ').unwrap_or(("", check.name.as_str()));
            body.insert(
                "payment_method".to_owned(),
                json!({
                    "type": options.extra("pm_type").unwrap_or("us_ach_bank"),
                    "fields": {
                        "proof_of_authorization": true,
                        "first_name": first,
                        "last_name": last,
                        "routing_number": check.routing_number,
                        "account_number": check.account_number,
                        "payment_purpose": "ACH",
                    },
                }),
            );
        }
        PaymentSource::Token { token } => {
            let (customer, method) = token.split_once('|').unwrap_or(("", token.as_str()));
            body.insert("payment_method".to_owned(), json!(method));
            let customer = Some(customer).filter(|c| !c.is_empty()).or(options.customer.as_deref());
            if let Some(customer) = customer {
                body.insert("customer".to_owned(), json!(customer));
            }
        }
    }
}

fn parse_reply(
    reply: &HttpResponse,
    operation: Operation,
) -> std::result::Result<Response, DecodeError> {
    let body = codec::json(&reply.body)?;
    let status = body.pointer("/status/status").and_then(Value::as_str);
    let data_status = body.pointer("/data/status").and_then(Value::as_str);
    let success = status == Some("SUCCESS") && !matches!(data_status, Some("ERR"));

    let message = if success {
        body.pointer("/status/message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("SUCCESS")
            .to_owned()
    } else {
        body.pointer("/status/message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .or_else(|| body.pointer("/status/error_code").and_then(Value::as_str))
            .or_else(|| body.pointer("/data/failure_message").and_then(Value::as_str))
            .unwrap_or("Transaction failed")
            .to_owned()
    };

    let id = body.pointer("/data/id").and_then(Value::as_str);
    let authorization = if operation == Operation::Store {
        let method = body.pointer("/data/default_payment_method").and_then(Value::as_str);
        id.map(|customer| format!("{customer}|{}", method.unwrap_or_default()))
    } else {
        id.map(str::to_owned)
    };

    let mut builder = Response::builder(success, message)
        .maybe_authorization(authorization)
        .cvv(
            body.pointer("/data/payment_method_data/acs_check/cvv_check")
                .and_then(Value::as_str)
                .map(cvv_code),
        );
    if !success {
        let code = body
            .pointer("/status/error_code")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .or_else(|| body.pointer("/data/failure_code").and_then(Value::as_str));
        builder = builder.error_code(error_code(code.unwrap_or_default()));
    }
    Ok(builder.params(body).build())
}

fn cvv_code(check: &str) -> &'static str {
    match check {
        "pass" => "M",
        "fail" => "N",
        _ => "U",
    }
}

fn error_code(code: &str) -> StandardErrorCode {
    let code = code.to_ascii_uppercase();
    if code.contains("EXPIRED") {
        StandardErrorCode::ExpiredCard
    } else if code.contains("CARD_NUMBER") {
        StandardErrorCode::InvalidNumber
    } else if code.contains("EXPIRATION") {
        StandardErrorCode::InvalidExpiryDate
    } else if code.contains("CVV") || code.contains("CVC") {
        StandardErrorCode::IncorrectCvc
    } else if code.contains("AMOUNT") {
        StandardErrorCode::InvalidAmount
    } else if ["DECLINED", "DO_NOT_HONOR", "INSUFFICIENT"].iter().any(|c| code.contains(c)) {
        StandardErrorCode::CardDeclined
    } else if ["UNAUTHORIZED", "ACCESS_KEY", "SIGNATURE"].iter().any(|c| code.contains(c)) {
        StandardErrorCode::ConfigError
    } else {
        StandardErrorCode::ProcessingError
    }
}

#[async_trait]
impl Gateway for RapydGateway {
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
        let body = json!({ "amount": INFO.amount(money) });
        let path = format!("/payments/{}/capture", path_segment(authorization)?);
        self.commit(Operation::Capture, HttpMethod::Post, &path, Some(&body), options).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn refund(
        &self,
        money: &Money,
        authorization: &str,
        options: &TransactionOptions,
    ) -> Result<Response> {
        let mut body = json!({
            "payment": authorization,
            "amount": INFO.amount(money),
            "currency": money.currency().code(),
        });
        if let Some(order_id) = &options.order_id {
            body["merchant_reference_id"] = json!(order_id);
        }
        self.commit(Operation::Refund, HttpMethod::Post, "/refunds", Some(&body), options).await
    }

    /// Cancels an uncaptured payment.
    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn void(&self, authorization: &str, options: &TransactionOptions) -> Result<Response> {
        let path = format!("/payments/{}", path_segment(authorization)?);
        self.commit(Operation::Void, HttpMethod::Delete, &path, None, options).await
    }

    /// Creates a customer holding the source as its default payment method.
    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn store(
        &self,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        source.ensure_valid()?;
        let PaymentSource::Card(card) = source else {
            return Err(GatewayError::InvalidInput("rapyd can only vault cards".to_owned()));
        };
        let mut body = json!({
            "name": card.name().trim(),
            "payment_method": card_method(card, options),
        });
        if let Some(email) = &options.email {
            body["email"] = json!(email);
        }
        self.commit(Operation::Store, HttpMethod::Post, "/customers", Some(&body), options).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn unstore(&self, token: &str, options: &TransactionOptions) -> Result<Response> {
        let customer = token.split('|').next().unwrap_or(token);
        let path = format!("/customers/{}", path_segment(customer)?);
        self.commit(Operation::Unstore, HttpMethod::Delete, &path, None, options).await
    }

    fn scrub(&self, transcript: &str) -> String {
        let scrubbed = scrub_headers(transcript, &["access_key", "signature"]);
        redact_sensitive(&scrub_pairs(&scrubbed, &["number", "cvv", "account_number"]))
    }
}
