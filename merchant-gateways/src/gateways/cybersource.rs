//! CyberSource Simple Order API over SOAP.
//!
//! Requests are `requestMessage` documents inside a SOAP envelope whose header
//! carries a WS-Security `UsernameToken` (merchant id and transaction key).
//! Authorizations are encoded as `reference;requestID;requestToken;action;amount;currency`
//! so that follow-ups can name both the request and the original totals.
//! Stored cards are referenced by their subscription id alone.

use async_trait::async_trait;
use tracing::instrument;

use crate::{
    codec::{
        DecodeError,
        xml::{self, XmlBuilder, XmlElement},
    },
    error::{GatewayError, Result},
    gateway::{Call, Connection, Credentials, Gateway, GatewayInfo, Operation},
    money::{Money, MoneyFormat},
    payment::{AccountType, CardBrand, CreditCard, PaymentSource, TransactionOptions},
    response::{Response, StandardErrorCode},
    security::{redact_sensitive, scrub_pairs},
    transport::{HttpRequest, HttpResponse},
};

const SOAP_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const WSSE_NAMESPACE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const PASSWORD_TEXT: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";
const TRANSACTION_NAMESPACE: &str = "urn:schemas-cybersource-com:transaction-data-1.121";

/// Billing email sent when the options carry none; the API requires one.
pub const DEFAULT_EMAIL: &str = "null@cybersource.com";

/// Static metadata.
pub static INFO: GatewayInfo = GatewayInfo {
    id: "cybersource",
    display_name: "CyberSource",
    homepage: "http://www.cybersource.com",
    test_url: "https://ics2wstest.ic3.com/commerce/1.x/transactionProcessor",
    live_url: "https://ics2wsa.ic3.com/commerce/1.x/transactionProcessor",
    supported_countries: &[
        "US", "AE", "BR", "CA", "CN", "DK", "FI", "FR", "DE", "IN", "JP", "MX", "NO", "SE", "GB",
        "SG", "LB", "PK",
    ],
    supported_brands: &[
        CardBrand::Visa,
        CardBrand::Master,
        CardBrand::AmericanExpress,
        CardBrand::Discover,
        CardBrand::DinersClub,
        CardBrand::Jcb,
        CardBrand::Maestro,
    ],
    default_currency: "USD",
    money_format: MoneyFormat::Dollars,
    operations: &Operation::ALL,
};

/// CyberSource three-digit card type code.
const fn card_type(brand: CardBrand) -> &'static str {
    match brand {
        CardBrand::Visa => "001",
        CardBrand::Master => "002",
        CardBrand::AmericanExpress => "003",
        CardBrand::Discover => "004",
        CardBrand::DinersClub => "005",
        CardBrand::Jcb => "007",
        CardBrand::Maestro => "042",
    }
}

/// Parsed `reference;requestID;requestToken;action;amount;currency`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Authorization<'a> {
    reference: &'a str,
    request_id: &'a str,
    token: &'a str,
    action: &'a str,
    amount: &'a str,
    currency: &'a str,
}

impl<'a> Authorization<'a> {
    fn parse(authorization: &'a str) -> Result<Self> {
        let parts: Vec<&str> = authorization.split(';').collect();
        let [reference, request_id, token, action, amount, currency] = parts[..] else {
            return Err(GatewayError::InvalidInput(format!(
                "cybersource authorization must have six ';'-separated parts, got '{authorization}'"
            )));
        };
        Ok(Self { reference, request_id, token, action, amount, currency })
    }
}

/// Totals the reply is recorded against in the authorization string.
#[derive(Debug, Clone)]
struct Totals {
    amount: String,
    currency: String,
}

impl Totals {
    fn of(money: &Money) -> Self {
        Self {
            amount: INFO.amount(money),
            currency: money.currency().code().to_owned(),
        }
    }
}

/// CyberSource adapter.
#[derive(Debug, Clone)]
pub struct CybersourceGateway {
    merchant_id: String,
    transaction_key: String,
    connection: Connection,
}

impl CybersourceGateway {
    /// Creates the adapter from `login` (merchant id) and `password`
    /// (SOAP transaction key).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] if a credential is missing.
    pub fn new(credentials: &Credentials, connection: Connection) -> Result<Self> {
        Ok(Self {
            merchant_id: credentials.require("login")?.to_owned(),
            transaction_key: credentials.require("password")?.to_owned(),
            connection,
        })
    }

    fn envelope(&self, reference: &str, body: impl FnOnce(&mut XmlBuilder)) -> String {
        let security = [("soap:mustUnderstand", "1"), ("xmlns:wsse", WSSE_NAMESPACE)];
        let mut xml = XmlBuilder::with_declaration();
        xml.nest("soap:Envelope", &[("xmlns:soap", SOAP_NAMESPACE)], |xml| {
            xml.nest("soap:Header", &[], |xml| {
                xml.nest("wsse:Security", &security, |xml| {
                    xml.nest("wsse:UsernameToken", &[], |xml| {
                        xml.element("wsse:Username", &self.merchant_id);
                        xml.open("wsse:Password", &[("Type", PASSWORD_TEXT)])
                            .text(&self.transaction_key)
                            .close();
                    });
                });
            });
            xml.nest("soap:Body", &[], |xml| {
                xml.nest("requestMessage", &[("xmlns", TRANSACTION_NAMESPACE)], |xml| {
                    xml.element("merchantID", &self.merchant_id);
                    xml.element("merchantReferenceCode", reference);
                    xml.element("clientLibrary", "Rust");
                    xml.element("clientLibraryVersion", env!("CARGO_PKG_VERSION"));
                    body(xml);
                });
            });
        });
        xml.finish()
    }

    async fn commit(
        &self,
        operation: Operation,
        reference: &str,
        totals: Option<Totals>,
        body: impl FnOnce(&mut XmlBuilder),
    ) -> Result<Response> {
        let document = self.envelope(reference, body);
        let request = HttpRequest::post(self.connection.endpoint(&INFO)).xml("text/xml", document);
        let call = Call::new(INFO.id, operation);
        let reply = self.connection.send(&call, request).await?;
        Ok(self.connection.parse_or_unparsable(&call, &reply, |reply| {
            parse_reply(reply, operation, reference, totals.as_ref())
        }))
    }

    async fn payment(
        &self,
        operation: Operation,
        money: &Money,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        source.ensure_valid()?;
        let reference = super::order_reference(options);
        let totals = Totals::of(money);
        let capture = operation == Operation::Purchase;
        self.commit(operation, &reference, Some(totals.clone()), |xml| {
            add_bill_to(xml, source, options);
            add_totals(xml, &totals);
            match source {
                PaymentSource::Card(card) => {
                    add_card(xml, card);
                    xml.empty("ccAuthService", &[("run", "true")]);
                    if capture {
                        xml.empty("ccCaptureService", &[("run", "true")]);
                    }
                }
                PaymentSource::Check(check) => {
                    xml.nest("check", &[], |xml| {
                        xml.element("accountNumber", &check.account_number);
                        xml.element(
                            "accountType",
                            match check.account_type {
                                AccountType::Checking => "C",
                                AccountType::Savings => "S",
                            },
                        );
                        xml.element("bankTransitNumber", &check.routing_number);
                    });
                    xml.empty("ecDebitService", &[("run", "true")]);
                }
                PaymentSource::Token { token } => {
                    add_subscription(xml, token);
                    xml.empty("ccAuthService", &[("run", "true")]);
                    if capture {
                        xml.empty("ccCaptureService", &[("run", "true")]);
                    }
                }
            }
        })
        .await
    }
}

fn add_bill_to(xml: &mut XmlBuilder, source: &PaymentSource, options: &TransactionOptions) {
    let address = options.address().cloned().unwrap_or_default();
    let (first, last) = match source {
        PaymentSource::Card(card) if !card.first_name.is_empty() || !card.last_name.is_empty() => {
            (card.first_name.clone(), card.last_name.clone())
        }
        PaymentSource::Check(check) => {
            let (first, last) = check.name.rsplit_once(' ').unwrap_or(("", check.name.as_str()));
            (first.to_owned(), last.to_owned())
        }
        _ => address.split_name(),
    };
    xml.nest("billTo", &[], |xml| {
        xml.element_opt("firstName", Some(first.as_str()));
        xml.element_opt("lastName", Some(last.as_str()));
        xml.element_opt("street1", address.address1.as_deref());
        xml.element_opt("street2", address.address2.as_deref());
        xml.element_opt("city", address.city.as_deref());
        xml.element_opt("state", address.state.as_deref());
        xml.element_opt("postalCode", address.zip.as_deref());
        xml.element_opt("country", address.country.as_deref());
        xml.element_opt("company", address.company.as_deref());
        xml.element_opt("phoneNumber", address.phone.as_deref());
        xml.element("email", options.email.as_deref().unwrap_or(DEFAULT_EMAIL));
        xml.element_opt("ipAddress", options.ip.as_deref());
    });
}

fn add_totals(xml: &mut XmlBuilder, totals: &Totals) {
    xml.nest("purchaseTotals", &[], |xml| {
        xml.element("currency", &totals.currency);
        xml.element("grandTotalAmount", &totals.amount);
    });
}

fn add_card(xml: &mut XmlBuilder, card: &CreditCard) {
    xml.nest("card", &[], |xml| {
        xml.element("accountNumber", card.digits());
        xml.element("expirationMonth", card.month_padded());
        xml.element("expirationYear", card.year.to_string());
        xml.element_opt("cvNumber", card.verification_value.as_deref());
        xml.element_opt("cardType", card.brand().map(card_type));
    });
}

fn add_subscription(xml: &mut XmlBuilder, subscription_id: &str) {
    xml.nest("recurringSubscriptionInfo", &[], |xml| {
        xml.element("subscriptionID", subscription_id);
    });
}

fn parse_reply(
    reply: &HttpResponse,
    operation: Operation,
    reference: &str,
    totals: Option<&Totals>,
) -> std::result::Result<Response, DecodeError> {
    let root = xml::parse(&reply.body)?;
    if let Some(fault) = root.descendant("Fault") {
        return Ok(fault_response(fault));
    }
    let message = root
        .descendant("replyMessage")
        .ok_or_else(|| {
            DecodeError::new("xml", "SOAP body carries neither replyMessage nor Fault")
        })?;

    let decision = message.text("decision").unwrap_or("ERROR");
    let reason_code = message.text("reasonCode").unwrap_or_default();
    let success = decision == "ACCEPT";

    let text = reason_message(reason_code)
        .map(str::to_owned)
        .or_else(|| message.text("missingField").map(|f| format!("Missing field: {f}")))
        .unwrap_or_else(|| decision.to_owned());

    let authorization = if operation == Operation::Store {
        message.text("paySubscriptionCreateReply/subscriptionID").map(str::to_owned)
    } else {
        message.text("requestID").map(|request_id| {
            let amount = message
                .text("ccAuthReply/amount")
                .or_else(|| totals.map(|t| t.amount.as_str()))
                .unwrap_or_default();
            let currency = message
                .text("purchaseTotals/currency")
                .or_else(|| totals.map(|t| t.currency.as_str()))
                .unwrap_or_default();
            format!(
                "{};{request_id};{};{};{amount};{currency}",
                message.text("merchantReferenceCode").unwrap_or(reference),
                message.text("requestToken").unwrap_or_default(),
                operation.as_str(),
            )
        })
    };

    let mut builder = Response::builder(success, text)
        .maybe_authorization(authorization)
        .avs(message.text("ccAuthReply/avsCode"))
        .cvv(message.text("ccAuthReply/cvCode"))
        .fraud_review(decision == "REVIEW");
    if !success {
        builder = builder.error_code(error_code(reason_code));
    }
    Ok(builder.params(message.to_json()).build())
}

fn fault_response(fault: &XmlElement) -> Response {
    let code = fault.text("faultcode").unwrap_or_default();
    let message = fault.text("faultstring").unwrap_or("SOAP fault").to_owned();
    let error_code = if code.contains("FailedCheck") || code.contains("InvalidSecurity") {
        StandardErrorCode::ConfigError
    } else {
        StandardErrorCode::ProcessingError
    };
    Response::builder(false, message)
        .error_code(error_code)
        .params(fault.to_json())
        .build()
}

fn reason_message(reason_code: &str) -> Option<&'static str> {
    Some(match reason_code {
        "100" => "Successful transaction",
        "101" => "Request is missing one or more required fields",
        "102" => "One or more fields contains invalid data",
        "150" => "General failure",
        "151" => "The request was received but a server time-out occurred",
        "152" => "The request was received, but a service timed out",
        "200" => {
            "The authorization request was approved by the issuing bank but declined \
             because it did not pass the AVS check"
        }
        "201" => "The issuing bank has questions about the request",
        "202" => "Expired card",
        "203" => "General decline of the card",
        "204" => "Insufficient funds in the account",
        "205" => "Stolen or lost card",
        "207" => "Issuing bank unavailable",
        "208" => "Inactive card or card not authorized for card-not-present transactions",
        "209" => "American Express Card Identification Digits (CID) did not match",
        "210" => "The card has reached the credit limit",
        "211" => "Invalid card verification number",
        "221" => "The customer matched an entry on the processor's negative file",
        "230" => {
            "The authorization request was approved by the issuing bank but declined \
             because it did not pass the card verification check"
        }
        "231" => "Invalid account number",
        "232" => "The card type is not accepted by the payment processor",
        "233" => "General decline by the processor",
        "234" => "A problem exists with your merchant configuration",
        "235" => "The requested amount exceeds the originally authorized amount",
        "236" => "Processor failure",
        "237" => "The authorization has already been reversed",
        "238" => "The authorization has already been captured",
        "239" => "The requested transaction amount must match the previous transaction amount",
        "240" => "The card type sent is invalid or does not correlate with the credit card number",
        "241" => "The request ID is invalid",
        "242" => {
            "You requested a capture, but there is no corresponding, unused authorization record"
        }
        "243" => "The transaction has already been settled or reversed",
        "246" => "The capture or credit is not voidable",
        "247" => "You requested a credit for a capture that was previously voided",
        "250" => "The request was received, but a time-out occurred with the payment processor",
        "254" => "Your account is prohibited from processing stand-alone refunds",
        "255" => {
            "Your account is not configured to process the service in the country you specified"
        }
        "400" => "Fraud score exceeds threshold",
        "480" => "The order is marked for review by Decision Manager",
        "481" => "The order has been rejected by Decision Manager",
        _ => return None,
    })
}

fn error_code(reason_code: &str) -> StandardErrorCode {
    match reason_code {
        "200" => StandardErrorCode::IncorrectAddress,
        "202" => StandardErrorCode::ExpiredCard,
        "201" => StandardErrorCode::CallIssuer,
        "203" | "204" | "208" | "210" | "221" | "233" | "400" | "481" => {
            StandardErrorCode::CardDeclined
        }
        "205" => StandardErrorCode::PickupCard,
        "209" | "230" => StandardErrorCode::IncorrectCvc,
        "211" => StandardErrorCode::InvalidCvc,
        "231" | "240" => StandardErrorCode::InvalidNumber,
        "232" => StandardErrorCode::UnsupportedFeature,
        "234" => StandardErrorCode::ConfigError,
        "235" | "239" => StandardErrorCode::InvalidAmount,
        _ => StandardErrorCode::ProcessingError,
    }
}

#[async_trait]
impl Gateway for CybersourceGateway {
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
        self.payment(Operation::Purchase, money, source, options).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, amount = money.cents()))]
    async fn authorize(
        &self,
        money: &Money,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        if matches!(source, PaymentSource::Check(_)) {
            return Err(GatewayError::InvalidInput(
                "cybersource checks are debited directly; use purchase".to_owned(),
            ));
        }
        self.payment(Operation::Authorize, money, source, options).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn capture(
        &self,
        money: &Money,
        authorization: &str,
        options: &TransactionOptions,
    ) -> Result<Response> {
        let auth = Authorization::parse(authorization)?;
        let reference = options.order_id.as_deref().unwrap_or(auth.reference);
        let totals = Totals::of(money);
        self.commit(Operation::Capture, reference, Some(totals.clone()), |xml| {
            add_totals(xml, &totals);
            xml.nest("ccCaptureService", &[("run", "true")], |xml| {
                xml.element("authRequestID", auth.request_id);
                xml.element("authRequestToken", auth.token);
            });
        })
        .await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn refund(
        &self,
        money: &Money,
        authorization: &str,
        options: &TransactionOptions,
    ) -> Result<Response> {
        let auth = Authorization::parse(authorization)?;
        let reference = options.order_id.as_deref().unwrap_or(auth.reference);
        let totals = Totals::of(money);
        self.commit(Operation::Refund, reference, Some(totals.clone()), |xml| {
            add_totals(xml, &totals);
            xml.nest("ccCreditService", &[("run", "true")], |xml| {
                xml.element("captureRequestID", auth.request_id);
                xml.element("captureRequestToken", auth.token);
            });
        })
        .await
    }

    /// Reverses an authorization, or voids a capture, credit or sale.
    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn void(&self, authorization: &str, options: &TransactionOptions) -> Result<Response> {
        let auth = Authorization::parse(authorization)?;
        let reference = options.order_id.as_deref().unwrap_or(auth.reference);
        let totals = Totals {
            amount: auth.amount.to_owned(),
            currency: auth.currency.to_owned(),
        };
        let reversal = auth.action == Operation::Authorize.as_str();
        self.commit(Operation::Void, reference, Some(totals.clone()), |xml| {
            if reversal {
                add_totals(xml, &totals);
                xml.nest("ccAuthReversalService", &[("run", "true")], |xml| {
                    xml.element("authRequestID", auth.request_id);
                    xml.element("authRequestToken", auth.token);
                });
            } else {
                xml.nest("voidService", &[("run", "true")], |xml| {
                    xml.element("voidRequestID", auth.request_id);
                    xml.element("voidRequestToken", auth.token);
                });
            }
        })
        .await
    }

    /// Creates an on-demand subscription; the authorization is its id.
    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn store(
        &self,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        source.ensure_valid()?;
        let PaymentSource::Card(card) = source else {
            return Err(GatewayError::InvalidInput("cybersource can only vault cards".to_owned()));
        };
        let reference = super::order_reference(options);
        let currency = INFO.currency(options);
        self.commit(Operation::Store, &reference, None, |xml| {
            add_bill_to(xml, source, options);
            xml.nest("purchaseTotals", &[], |xml| {
                xml.element("currency", currency.code());
            });
            add_card(xml, card);
            xml.nest("recurringSubscriptionInfo", &[], |xml| {
                xml.element("frequency", "on-demand");
            });
            xml.empty("paySubscriptionCreateService", &[("run", "true")]);
        })
        .await
    }

    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn unstore(&self, token: &str, options: &TransactionOptions) -> Result<Response> {
        let reference = super::order_reference(options);
        self.commit(Operation::Unstore, &reference, None, |xml| {
            add_subscription(xml, token);
            xml.empty("paySubscriptionDeleteService", &[("run", "true")]);
        })
        .await
    }

    fn scrub(&self, transcript: &str) -> String {
        redact_sensitive(&scrub_pairs(transcript, &["wsse:Password", "accountNumber", "cvNumber"]))
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

    fn reply(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
<soap:Header><wsse:Security xmlns:wsse="{WSSE_NAMESPACE}">
<wsu:Timestamp xmlns:wsu="x" wsu:Id="Timestamp-1">
<wsu:Created>2026-10-17T12:00:00.000Z</wsu:Created>
</wsu:Timestamp></wsse:Security></soap:Header>
<soap:Body><c:replyMessage xmlns:c="{TRANSACTION_NAMESPACE}">{body}</c:replyMessage></soap:Body>
</soap:Envelope>"#
        )
    }

    fn approved() -> String {
        reply(
            "<c:merchantReferenceCode>order-1</c:merchantReferenceCode>\
             <c:requestID>6953101374120178147101</c:requestID>\
             <c:decision>ACCEPT</c:decision><c:reasonCode>100</c:reasonCode>\
             <c:requestToken>Ahj/7wSTLoNfMt0KyZQoGxDdm1ctGjlmo0</c:requestToken>\
             <c:purchaseTotals><c:currency>USD</c:currency></c:purchaseTotals>\
             <c:ccAuthReply><c:reasonCode>100</c:reasonCode><c:amount>10.00</c:amount>\
             <c:avsCode>Y</c:avsCode><c:cvCode>M</c:cvCode></c:ccAuthReply>",
        )
    }

    fn gateway() -> (std::sync::Arc<MockTransport>, CybersourceGateway) {
        let (mock, connection) = mock_connection();
        let credentials =
            Credentials::new().with("login", "merchant_1").with("password", "s3cret-key");
        (mock, CybersourceGateway::new(&credentials, connection).unwrap())
    }

    fn money() -> Money {
        Money::new(1000, Currency::usd()).unwrap()
    }

    #[tokio::test]
    async fn test_successful_purchase() {
        let (mock, gateway) = gateway();
        mock.push_reply(200, approved());

        let response = gateway.purchase(&money(), &visa().into(), &options()).await.unwrap();
        assert!(response.success);
        assert_eq!(response.message, "Successful transaction");
        assert_eq!(
            response.authorization.as_deref(),
            Some(
                "order-1;6953101374120178147101;Ahj/7wSTLoNfMt0KyZQoGxDdm1ctGjlmo0;\
                 purchase;10.00;USD"
            )
        );
        assert_eq!(response.avs_result.as_ref().and_then(|a| a.code.as_deref()), Some("Y"));
        assert!(response.test);

        let body = mock.last_request().unwrap().body_text();
        assert!(body.contains("<wsse:Username>merchant_1</wsse:Username>"));
        assert!(body.contains("s3cret-key</wsse:Password>"));
        assert!(body.contains("<cardType>001</cardType>"));
        let expiry = "<expirationMonth>09</expirationMonth><expirationYear>2040</expirationYear>";
        assert!(body.contains(expiry));
        assert!(body.contains(r#"<ccAuthService run="true"/><ccCaptureService run="true"/>"#));
        assert!(body.contains("<grandTotalAmount>10.00</grandTotalAmount>"));
    }

    #[tokio::test]
    async fn test_authorize_runs_only_auth_service() {
        let (mock, gateway) = gateway();
        mock.push_reply(200, approved());
        let response = gateway.authorize(&money(), &visa().into(), &options()).await.unwrap();
        assert!(response.authorization.unwrap().contains(";authorize;"));
        let body = mock.last_request().unwrap().body_text();
        assert!(!body.contains("ccCaptureService"));
    }

    #[tokio::test]
    async fn test_declined_purchase() {
        let (mock, gateway) = gateway();
        mock.push_reply(
            200,
            reply(
                "<c:requestID>1</c:requestID><c:decision>REJECT</c:decision>\
                 <c:reasonCode>203</c:reasonCode>",
            ),
        );
        let response = gateway.purchase(&money(), &visa().into(), &options()).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.message, "General decline of the card");
        assert_eq!(response.error_code, Some(StandardErrorCode::CardDeclined));
    }

    #[tokio::test]
    async fn test_review_flags_fraud_review() {
        let (mock, gateway) = gateway();
        mock.push_reply(
            200,
            reply(
                "<c:requestID>1</c:requestID><c:decision>REVIEW</c:decision>\
                 <c:reasonCode>480</c:reasonCode>",
            ),
        );
        let response = gateway.purchase(&money(), &visa().into(), &options()).await.unwrap();
        assert!(!response.success);
        assert!(response.fraud_review);
    }

    #[tokio::test]
    async fn test_soap_fault() {
        let (mock, gateway) = gateway();
        mock.push_reply(
            500,
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
               <soap:Body><soap:Fault>
               <faultcode xmlns:wsse="x">wsse:FailedCheck</faultcode>
               <faultstring>Security Data : UsernameToken authentication failed.</faultstring>
               </soap:Fault></soap:Body></soap:Envelope>"#,
        );
        let response = gateway.purchase(&money(), &visa().into(), &options()).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.message, "Security Data : UsernameToken authentication failed.");
        assert_eq!(response.error_code, Some(StandardErrorCode::ConfigError));
    }

    #[tokio::test]
    async fn test_void_of_authorization_reverses_it() {
        let (mock, gateway) = gateway();
        mock.push_reply(200, approved());
        gateway
            .void("order-1;111;tok;authorize;10.00;USD", &TransactionOptions::new())
            .await
            .unwrap();
        let body = mock.last_request().unwrap().body_text();
        assert!(
            body.contains(r#"<ccAuthReversalService run="true"><authRequestID>111</authRequestID>"#)
        );
        assert!(body.contains("<grandTotalAmount>10.00</grandTotalAmount>"));
        assert!(body.contains("<merchantReferenceCode>order-1</merchantReferenceCode>"));
    }

    #[tokio::test]
    async fn test_void_of_capture_uses_void_service() {
        let (mock, gateway) = gateway();
        mock.push_reply(200, approved());
        gateway.void("order-1;222;tok;capture;10.00;USD", &options()).await.unwrap();
        let body = mock.last_request().unwrap().body_text();
        assert!(body.contains(r#"<voidService run="true"><voidRequestID>222</voidRequestID>"#));
    }

    #[tokio::test]
    async fn test_capture_and_refund_reference_request() {
        let (mock, gateway) = gateway();
        mock.push_reply(200, approved());
        mock.push_reply(200, approved());
        let authorized = "order-1;111;tok1;authorize;10.00;USD";
        gateway.capture(&money(), authorized, &options()).await.unwrap();
        let captured = "order-1;333;tok3;capture;10.00;USD";
        gateway.refund(&money(), captured, &options()).await.unwrap();
        let requests = mock.requests();
        let reference =
            "<authRequestID>111</authRequestID><authRequestToken>tok1</authRequestToken>";
        assert!(requests[0].body_text().contains(reference));
        assert!(requests[1].body_text().contains("<captureRequestID>333</captureRequestID>"));
    }

    #[tokio::test]
    async fn test_malformed_authorization_is_rejected() {
        let (_, gateway) = gateway();
        let error = gateway.capture(&money(), "only;three;parts", &options()).await.unwrap_err();
        assert!(matches!(error, GatewayError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_store_returns_subscription_id() {
        let (mock, gateway) = gateway();
        mock.push_reply(
            200,
            reply(
                "<c:requestID>9</c:requestID><c:decision>ACCEPT</c:decision>\
                 <c:reasonCode>100</c:reasonCode>\
                 <c:paySubscriptionCreateReply><c:reasonCode>100</c:reasonCode>\
                 <c:subscriptionID>4769793025800167904222</c:subscriptionID>\
                 </c:paySubscriptionCreateReply>",
            ),
        );
        mock.push_reply(200, approved());

        let stored = gateway.store(&visa().into(), &options()).await.unwrap();
        assert_eq!(stored.authorization.as_deref(), Some("4769793025800167904222"));

        gateway
            .purchase(&money(), &PaymentSource::token("4769793025800167904222"), &options())
            .await
            .unwrap();
        let body = mock.last_request().unwrap().body_text();
        assert!(body.contains("<subscriptionID>4769793025800167904222</subscriptionID>"));
        assert!(!body.contains("<card>"));
    }

    #[tokio::test]
    async fn test_check_purchase_uses_ec_debit() {
        let (mock, gateway) = gateway();
        mock.push_reply(200, approved());
        let check = Check::new("Jim Smith", "244183602", "15378535");
        gateway.purchase(&money(), &PaymentSource::Check(check), &options()).await.unwrap();
        let body = mock.last_request().unwrap().body_text();
        assert!(body.contains(r#"<ecDebitService run="true"/>"#));
        assert!(body.contains("<bankTransitNumber>244183602</bankTransitNumber>"));
    }

    #[tokio::test]
    async fn test_unparsable_body() {
        let (mock, gateway) = gateway();
        mock.push_reply(502, "Bad Gateway");
        let response = gateway.purchase(&money(), &visa().into(), &options()).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.error_code, Some(StandardErrorCode::ProcessingError));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(error_code("202"), StandardErrorCode::ExpiredCard);
        assert_eq!(error_code("211"), StandardErrorCode::InvalidCvc);
        assert_eq!(error_code("234"), StandardErrorCode::ConfigError);
        assert_eq!(error_code("999"), StandardErrorCode::ProcessingError);
    }

    #[test]
    fn test_scrub() {
        let (_, gateway) = gateway();
        let transcript = "<wsse:Password Type=\"x\">s3cret-key</wsse:Password>\
                          <accountNumber>4111111111111111</accountNumber><cvNumber>123</cvNumber>";
        let scrubbed = gateway.scrub(transcript);
        assert!(!scrubbed.contains("s3cret-key"));
        assert!(!scrubbed.contains("4111111111111111"));
        assert!(!scrubbed.contains(">123<"));
    }
}
