//! NMI (Network Merchants) direct post API.
//!
//! Requests are form-encoded with a `type` field (`sale`, `auth`, `capture`,
//! `refund`, `void`, `validate`); replies are query strings. The customer
//! vault stores cards and checks; `customer_vault_id` charges them later.

use async_trait::async_trait;
use tracing::instrument;

use crate::{
    codec::{DecodeError, form},
    error::Result,
    gateway::{Call, Connection, Credentials, Gateway, GatewayInfo, Operation},
    money::{Money, MoneyFormat},
    payment::{AccountHolderType, CardBrand, CreditCard, PaymentSource, TransactionOptions},
    response::{Response, StandardErrorCode},
    security::{redact_sensitive, scrub_pairs},
    transport::{HttpRequest, HttpResponse},
};

/// Static metadata.
pub static INFO: GatewayInfo = GatewayInfo {
    id: "nmi",
    display_name: "NMI",
    homepage: "http://nmi.com/",
    test_url: "https://secure.nmi.com/api/transact.php",
    live_url: "https://secure.nmi.com/api/transact.php",
    supported_countries: &["US"],
    supported_brands: &[
        CardBrand::Visa,
        CardBrand::Master,
        CardBrand::AmericanExpress,
        CardBrand::Discover,
    ],
    default_currency: "USD",
    money_format: MoneyFormat::Dollars,
    operations: &Operation::ALL,
};

type Params = Vec<(&'static str, String)>;

fn push_opt(params: &mut Params, key: &'static str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        params.push((key, value.to_owned()));
    }
}

/// NMI adapter.
#[derive(Debug, Clone)]
pub struct NmiGateway {
    security_key: String,
    connection: Connection,
}

impl NmiGateway {
    /// Creates the adapter from `security_key`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`](crate::error::GatewayError::ConfigError)
    /// if `security_key` is missing.
    pub fn new(credentials: &Credentials, connection: Connection) -> Result<Self> {
        Ok(Self { security_key: credentials.require("security_key")?.to_owned(), connection })
    }

    async fn commit(
        &self,
        operation: Operation,
        kind: Option<&str>,
        mut params: Params,
    ) -> Result<Response> {
        if let Some(kind) = kind {
            params.insert(0, ("type", kind.to_owned()));
        }
        params.insert(0, ("security_key", self.security_key.clone()));

        let call = Call::new(INFO.id, operation);
        let request = HttpRequest::post(self.connection.endpoint(&INFO)).form(&params);
        let reply = self.connection.send(&call, request).await?;
        Ok(self
            .connection
            .parse_or_unparsable(&call, &reply, |reply| parse_reply(reply, operation)))
    }

    async fn sale(
        &self,
        operation: Operation,
        kind: &str,
        money: &Money,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        source.ensure_valid()?;
        let mut params = Params::new();
        params.push(("amount", INFO.amount(money)));
        params.push(("currency", money.currency().code().to_owned()));
        add_source(&mut params, source);
        add_details(&mut params, options);
        self.commit(operation, Some(kind), params).await
    }
}

fn add_card(params: &mut Params, card: &CreditCard) {
    params.push(("ccnumber", card.digits()));
    params.push(("ccexp", card.expiry_mmyy()));
    push_opt(params, "cvv", card.verification_value.as_deref());
    push_opt(params, "first_name", Some(card.first_name.as_str()));
    push_opt(params, "last_name", Some(card.last_name.as_str()));
}

fn add_source(params: &mut Params, source: &PaymentSource) {
    match source {
        PaymentSource::Card(card) => {
            params.push(("payment", "creditcard".to_owned()));
            add_card(params, card);
        }
        PaymentSource::Check(check) => {
            params.push(("payment", "check".to_owned()));
            params.push(("checkname", check.name.clone()));
            params.push(("checkaba", check.routing_number.clone()));
            params.push(("checkaccount", check.account_number.clone()));
            let holder = match check.account_holder_type {
                AccountHolderType::Personal => "personal",
                AccountHolderType::Business => "business",
            };
            params.push(("account_holder_type", holder.to_owned()));
            params.push(("account_type", check.account_type.as_str().to_owned()));
            params.push(("sec_code", "WEB".to_owned()));
        }
        PaymentSource::Token { token } => params.push(("customer_vault_id", token.clone())),
    }
}

fn add_details(params: &mut Params, options: &TransactionOptions) {
    push_opt(params, "orderid", options.order_id.as_deref());
    push_opt(params, "order_description", options.description.as_deref());
    push_opt(params, "email", options.email.as_deref());
    push_opt(params, "ipaddress", options.ip.as_deref());
    if let Some(address) = options.address() {
        push_opt(params, "company", address.company.as_deref());
        push_opt(params, "address1", address.address1.as_deref());
        push_opt(params, "address2", address.address2.as_deref());
        push_opt(params, "city", address.city.as_deref());
        push_opt(params, "state", address.state.as_deref());
        push_opt(params, "zip", address.zip.as_deref());
        push_opt(params, "country", address.country.as_deref());
        push_opt(params, "phone", address.phone.as_deref());
    }
}

fn parse_reply(
    reply: &HttpResponse,
    operation: Operation,
) -> std::result::Result<Response, DecodeError> {
    let pairs = form::decode(&reply.body)?;
    let get = |key: &str| {
        pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    };

    let Some(code) = get("response") else {
        return Err(DecodeError::new("form", "reply has no response field"));
    };
    let success = code == "1";
    let message = match get("responsetext") {
        Some("SUCCESS") | None if success => "Succeeded",
        Some(text) => text,
        None => "Transaction failed",
    };
    let authorization = if matches!(operation, Operation::Store) {
        get("customer_vault_id")
    } else {
        get("transactionid")
    };

    let mut builder = Response::builder(success, message)
        .maybe_authorization(authorization.map(str::to_owned))
        .avs(get("avsresponse"))
        .cvv(get("cvvresponse"));
    if !success {
        builder = builder.error_code(error_code(get("response_code").unwrap_or_default()));
    }
    Ok(builder.params(form::to_json(&pairs)).build())
}

fn error_code(response_code: &str) -> StandardErrorCode {
    match response_code {
        "221" | "222" => StandardErrorCode::InvalidNumber,
        "220" => StandardErrorCode::IncorrectNumber,
        "223" => StandardErrorCode::ExpiredCard,
        "224" => StandardErrorCode::InvalidExpiryDate,
        "225" => StandardErrorCode::IncorrectCvc,
        "240" => StandardErrorCode::CallIssuer,
        "250" | "251" | "252" | "253" => StandardErrorCode::PickupCard,
        "200" | "201" | "202" | "203" | "204" | "260" | "261" | "262" | "263" | "264" => {
            StandardErrorCode::CardDeclined
        }
        _ => StandardErrorCode::ProcessingError,
    }
}

#[async_trait]
impl Gateway for NmiGateway {
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
        self.sale(Operation::Purchase, "sale", money, source, options).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, amount = money.cents()))]
    async fn authorize(
        &self,
        money: &Money,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        self.sale(Operation::Authorize, "auth", money, source, options).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn capture(
        &self,
        money: &Money,
        authorization: &str,
        _options: &TransactionOptions,
    ) -> Result<Response> {
        let params =
            vec![("transactionid", authorization.to_owned()), ("amount", INFO.amount(money))];
        self.commit(Operation::Capture, Some("capture"), params).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn refund(
        &self,
        money: &Money,
        authorization: &str,
        _options: &TransactionOptions,
    ) -> Result<Response> {
        let params =
            vec![("transactionid", authorization.to_owned()), ("amount", INFO.amount(money))];
        self.commit(Operation::Refund, Some("refund"), params).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn void(&self, authorization: &str, _options: &TransactionOptions) -> Result<Response> {
        let params = vec![("transactionid", authorization.to_owned())];
        self.commit(Operation::Void, Some("void"), params).await
    }

    /// Adds the source to the customer vault; the authorization is the
    /// `customer_vault_id`.
    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn store(
        &self,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        source.ensure_valid()?;
        let mut params: Params = vec![("customer_vault", "add_customer".to_owned())];
        add_source(&mut params, source);
        add_details(&mut params, options);
        self.commit(Operation::Store, None, params).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn unstore(&self, token: &str, _options: &TransactionOptions) -> Result<Response> {
        let params = vec![
            ("customer_vault", "delete_customer".to_owned()),
            ("customer_vault_id", token.to_owned()),
        ];
        self.commit(Operation::Unstore, None, params).await
    }

    /// Native account verification (`type=validate`).
    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn verify(&self, card: &CreditCard, options: &TransactionOptions) -> Result<Response> {
        card.ensure_valid()?;
        let mut params = Params::new();
        add_card(&mut params, card);
        add_details(&mut params, options);
        self.commit(Operation::Verify, Some("validate"), params).await
    }

    fn scrub(&self, transcript: &str) -> String {
        redact_sensitive(&scrub_pairs(
            transcript,
            &["security_key", "ccnumber", "cvv", "checkaccount", "password"],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gateways::test_support::{mock_connection, options, visa},
        money::Currency,
        payment::Check,
        transport::MockTransport,
    };

    const APPROVED: &str = "response=1&responsetext=SUCCESS&authcode=123456\
        &transactionid=2762757839\
        &avsresponse=N&cvvresponse=M&orderid=order-1&type=sale&response_code=100";
    const DECLINED: &str = "response=2&responsetext=DECLINE&authcode=&transactionid=2762782032\
        &avsresponse=N&cvvresponse=N&orderid=order-1&type=sale&response_code=200";

    fn gateway() -> (std::sync::Arc<MockTransport>, NmiGateway) {
        let (mock, connection) = mock_connection();
        let credentials =
            Credentials::new().with("security_key", "6457Thfj624V5r7WUwc5v6a68Zsd6YEm");
        (mock, NmiGateway::new(&credentials, connection).unwrap())
    }

    fn money() -> Money {
        Money::new(1000, Currency::usd()).unwrap()
    }

    #[tokio::test]
    async fn test_successful_purchase() {
        let (mock, gateway) = gateway();
        mock.push_reply(200, APPROVED);

        let response = gateway.purchase(&money(), &visa().into(), &options()).await.unwrap();
        assert!(response.success);
        assert_eq!(response.message, "Succeeded");
        assert_eq!(response.authorization.as_deref(), Some("2762757839"));
        assert_eq!(response.cvv_result.as_ref().and_then(|c| c.code.as_deref()), Some("M"));
        assert_eq!(response.param("authcode"), Some("123456"));

        let body = mock.last_request().unwrap().body_text();
        assert!(
            body.starts_with("security_key=6457Thfj624V5r7WUwc5v6a68Zsd6YEm&type=sale&amount=10.00")
        );
        assert!(body.contains("ccnumber=4111111111111111"));
        assert!(body.contains("ccexp=0940"));
        assert!(body.contains("first_name=Longbob&last_name=Longsen"));
        assert!(body.contains("orderid=order-1"));
    }

    #[tokio::test]
    async fn test_declined_purchase() {
        let (mock, gateway) = gateway();
        mock.push_reply(200, DECLINED);

        let response = gateway.purchase(&money(), &visa().into(), &options()).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.message, "DECLINE");
        assert_eq!(response.error_code, Some(StandardErrorCode::CardDeclined));
    }

    #[tokio::test]
    async fn test_check_purchase() {
        let (mock, gateway) = gateway();
        mock.push_reply(200, APPROVED);
        let check = Check::new("Jim Smith", "123123123", "123123123");
        gateway.purchase(&money(), &check.into(), &options()).await.unwrap();
        let body = mock.last_request().unwrap().body_text();
        assert!(body.contains("payment=check"));
        assert!(body.contains("checkaba=123123123"));
    }

    #[tokio::test]
    async fn test_follow_up_operations() {
        let (mock, gateway) = gateway();
        for _ in 0..3 {
            mock.push_reply(200, APPROVED);
        }
        gateway.capture(&money(), "2762757839", &options()).await.unwrap();
        gateway.refund(&money(), "2762757839", &options()).await.unwrap();
        gateway.void("2762757839", &options()).await.unwrap();

        let bodies: Vec<String> = mock.requests().iter().map(|r| r.body_text()).collect();
        assert!(bodies[0].contains("type=capture&transactionid=2762757839&amount=10.00"));
        assert!(bodies[1].contains("type=refund"));
        assert!(bodies[2].contains("type=void&transactionid=2762757839"));
    }

    #[tokio::test]
    async fn test_store_returns_vault_id() {
        let (mock, gateway) = gateway();
        mock.push_reply(
            200,
            "response=1&responsetext=Customer Added&transactionid=\
             &customer_vault_id=1129469527&response_code=100",
        );
        let response = gateway.store(&visa().into(), &options()).await.unwrap();
        assert!(response.success);
        assert_eq!(response.message, "Customer Added");
        assert_eq!(response.authorization.as_deref(), Some("1129469527"));
        let body = mock.last_request().unwrap().body_text();
        assert!(body.contains("customer_vault=add_customer"));
        assert!(!body.contains("type="));
    }

    #[tokio::test]
    async fn test_unstore() {
        let (mock, gateway) = gateway();
        mock.push_reply(200, "response=1&responsetext=Customer Deleted&response_code=100");
        assert!(gateway.unstore("1129469527", &options()).await.unwrap().success);
        let body = mock.last_request().unwrap().body_text();
        assert!(body.contains("customer_vault=delete_customer&customer_vault_id=1129469527"));
    }

    #[tokio::test]
    async fn test_verify_uses_validate() {
        let (mock, gateway) = gateway();
        mock.push_reply(200, APPROVED);
        assert!(gateway.verify(&visa(), &options()).await.unwrap().success);
        assert_eq!(mock.requests().len(), 1);
        let body = mock.last_request().unwrap().body_text();
        assert!(body.contains("type=validate"));
        assert!(!body.contains("amount="));
    }

    #[tokio::test]
    async fn test_reply_without_response_is_unparsable() {
        let (mock, gateway) = gateway();
        mock.push_reply(200, "<html>maintenance</html>");
        let response = gateway.purchase(&money(), &visa().into(), &options()).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.param("raw_response"), Some("<html>maintenance</html>"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(error_code("223"), StandardErrorCode::ExpiredCard);
        assert_eq!(error_code("225"), StandardErrorCode::IncorrectCvc);
        assert_eq!(error_code("251"), StandardErrorCode::PickupCard);
        assert_eq!(error_code("300"), StandardErrorCode::ProcessingError);
    }

    #[test]
    fn test_scrub() {
        let (_, gateway) = gateway();
        let scrubbed =
            gateway.scrub("security_key=abc&type=sale&ccnumber=4111111111111111&cvv=917");
        assert_eq!(
            scrubbed,
            "security_key=[FILTERED]&type=sale&ccnumber=[FILTERED]&cvv=[FILTERED]"
        );
    }
}
