//! Authorize.Net XML API (`createTransactionRequest` and CIM profiles).
//!
//! Authorizations are encoded as `transId#last4#action`. The last four
//! digits are kept because refunds must name the card they credit.

use async_trait::async_trait;
use tracing::instrument;

use crate::{
    codec::{
        DecodeError,
        xml::{self, XmlBuilder, XmlElement},
    },
    error::{GatewayError, Result},
    gateway::{Call, Connection, Credentials, Gateway, GatewayInfo, Operation, authorize_then_void},
    money::{Money, MoneyFormat},
    payment::{CardBrand, CreditCard, PaymentSource, TransactionOptions},
    response::{MultiResponse, Response, StandardErrorCode},
    security::{redact_sensitive, scrub_pairs},
    transport::{HttpRequest, HttpResponse},
};

const NAMESPACE: &str = "AnetApi/xml/v1/schema/AnetApiSchema.xsd";

/// Static metadata.
pub static INFO: GatewayInfo = GatewayInfo {
    id: "authorize_net",
    display_name: "Authorize.Net",
    homepage: "http://www.authorize.net/",
    test_url: "https://apitest.authorize.net/xml/v1/request.api",
    live_url: "https://api2.authorize.net/xml/v1/request.api",
    supported_countries: &["AU", "CA", "US"],
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

/// Parsed `transId#last4#action` authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Authorization<'a> {
    transaction_id: &'a str,
    last_four: Option<&'a str>,
}

impl<'a> Authorization<'a> {
    fn parse(authorization: &'a str) -> Self {
        let mut parts = authorization.split('#');
        let transaction_id = parts.next().unwrap_or_default();
        let last_four = parts.next().filter(|s| !s.is_empty());
        Self { transaction_id, last_four }
    }
}

/// Authorize.Net adapter.
#[derive(Debug, Clone)]
pub struct AuthorizeNetGateway {
    login: String,
    transaction_key: String,
    connection: Connection,
}

impl AuthorizeNetGateway {
    /// Creates the adapter from `login` and `password` (the transaction key).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] if a credential is missing.
    pub fn new(credentials: &Credentials, connection: Connection) -> Result<Self> {
        Ok(Self {
            login: credentials.require("login")?.to_owned(),
            transaction_key: credentials.require("password")?.to_owned(),
            connection,
        })
    }

    fn document(
        &self,
        root: &str,
        options: &TransactionOptions,
        body: impl FnOnce(&mut XmlBuilder),
    ) -> String {
        let mut xml = XmlBuilder::with_declaration();
        xml.nest(root, &[("xmlns", NAMESPACE)], |xml| {
            xml.nest("merchantAuthentication", &[], |xml| {
                xml.element("name", &self.login);
                xml.element("transactionKey", &self.transaction_key);
            });
            if let Some(order_id) = &options.order_id {
                xml.element("refId", truncate(order_id, 20));
            }
            body(xml);
        });
        xml.finish()
    }

    async fn commit(
        &self,
        call: &Call,
        action: Operation,
        document: String,
        last_four: Option<&str>,
    ) -> Result<Response> {
        let request = HttpRequest::post(self.connection.endpoint(&INFO)).xml("text/xml", document);
        let reply = self.connection.send(call, request).await?;
        Ok(self
            .connection
            .parse_or_unparsable(call, &reply, |reply| parse_reply(reply, action, last_four)))
    }

    async fn transaction(
        &self,
        operation: Operation,
        kind: &str,
        money: Option<&Money>,
        source: Option<&PaymentSource>,
        reference: Option<&Authorization<'_>>,
        options: &TransactionOptions,
    ) -> Result<Response> {
        if let Some(source) = source {
            source.ensure_valid()?;
        }
        let document = self.document("createTransactionRequest", options, |xml| {
            xml.nest("transactionRequest", &[], |xml| {
                xml.element("transactionType", kind);
                if let Some(money) = money {
                    xml.element("amount", INFO.amount(money));
                    xml.element("currencyCode", money.currency().code());
                }
                match source {
                    Some(PaymentSource::Card(card)) => add_card(xml, card),
                    Some(PaymentSource::Check(check)) => {
                        xml.nest("payment", &[], |xml| {
                            xml.nest("bankAccount", &[], |xml| {
                                xml.element("accountType", check.account_type.as_str());
                                xml.element("routingNumber", &check.routing_number);
                                xml.element("accountNumber", &check.account_number);
                                xml.element("nameOnAccount", truncate(&check.name, 22));
                                xml.element("echeckType", "WEB");
                            });
                        });
                    }
                    Some(PaymentSource::Token { token }) => add_profile(xml, token),
                    None => {}
                }
                if let Some(reference) = reference {
                    if operation == Operation::Refund {
                        xml.nest("payment", &[], |xml| {
                            xml.nest("creditCard", &[], |xml| {
                                xml.element("cardNumber", reference.last_four.unwrap_or_default());
                                xml.element("expirationDate", "XXXX");
                            });
                        });
                    }
                    xml.element("refTransId", reference.transaction_id);
                }
                if options.order_id.is_some() || options.description.is_some() {
                    xml.nest("order", &[], |xml| {
                        let invoice = options.order_id.as_deref().map(|id| truncate(id, 20));
                        xml.element_opt("invoiceNumber", invoice);
                        let description = options.description.as_deref().map(|d| truncate(d, 255));
                        xml.element_opt("description", description);
                    });
                }
                if let Some(email) = &options.email {
                    xml.nest("customer", &[], |xml| {
                        xml.element("email", email);
                    });
                }
                add_bill_to(xml, options);
                xml.element_opt("customerIP", options.ip.as_deref());
            });
        });

        let last_four = match (source, reference) {
            (Some(PaymentSource::Card(card)), _) => Some(card.last_digits()),
            (Some(PaymentSource::Check(check)), _) => Some(check.last_digits().to_owned()),
            (_, Some(reference)) => reference.last_four.map(str::to_owned),
            _ => None,
        };
        let call = Call::new(INFO.id, operation);
        self.commit(&call, operation, document, last_four.as_deref()).await
    }
}

fn truncate(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

fn add_card(xml: &mut XmlBuilder, card: &CreditCard) {
    xml.nest("payment", &[], |xml| {
        xml.nest("creditCard", &[], |xml| {
            xml.element("cardNumber", card.digits());
            xml.element("expirationDate", card.expiry_yyyy_mm());
            xml.element_opt("cardCode", card.verification_value.as_deref());
        });
    });
}

/// A stored token is `customerProfileId#paymentProfileId`.
fn add_profile(xml: &mut XmlBuilder, token: &str) {
    let (customer, payment) = token.split_once('#').unwrap_or((token, ""));
    xml.nest("profile", &[], |xml| {
        xml.element("customerProfileId", customer);
        xml.nest("paymentProfile", &[], |xml| {
            xml.element("paymentProfileId", payment);
        });
    });
}

fn add_bill_to(xml: &mut XmlBuilder, options: &TransactionOptions) {
    let Some(address) = options.address() else {
        return;
    };
    let (first, last) = address.split_name();
    xml.nest("billTo", &[], |xml| {
        xml.element_opt("firstName", Some(truncate(&first, 50)));
        xml.element_opt("lastName", Some(truncate(&last, 50)));
        xml.element_opt("company", address.company.as_deref());
        xml.element_opt("address", address.address1.as_deref());
        xml.element_opt("city", address.city.as_deref());
        xml.element_opt("state", address.state.as_deref());
        xml.element_opt("zip", address.zip.as_deref());
        xml.element_opt("country", address.country.as_deref());
        xml.element_opt("phoneNumber", address.phone.as_deref());
    });
}

fn parse_reply(
    reply: &HttpResponse,
    action: Operation,
    last_four: Option<&str>,
) -> std::result::Result<Response, DecodeError> {
    let root = xml::parse(&reply.body)?;
    Ok(match root.name.as_str() {
        "createTransactionResponse" => transaction_response(&root, action, last_four),
        _ => profile_response(&root),
    })
}

fn result_ok(root: &XmlElement) -> bool {
    root.text("messages/resultCode") == Some("Ok")
}

fn transaction_response(root: &XmlElement, action: Operation, last_four: Option<&str>) -> Response {
    let params = root.to_json();
    let Some(tx) = root.child("transactionResponse") else {
        let message =
            root.text("messages/message/text").unwrap_or("No transaction response").to_owned();
        return Response::builder(false, message)
            .error_code(StandardErrorCode::ProcessingError)
            .params(params)
            .build();
    };

    let response_code = tx.text("responseCode").unwrap_or("3");
    let success = response_code == "1" && result_ok(root);
    let reason_code =
        tx.text("errors/error/errorCode").or_else(|| tx.text("messages/message/code"));
    let message = tx
        .text("messages/message/description")
        .or_else(|| tx.text("errors/error/errorText"))
        .or_else(|| root.text("messages/message/text"))
        .unwrap_or("No message")
        .to_owned();

    let last_four = tx
        .text("accountNumber")
        .map(|n| &n[n.len().saturating_sub(4)..])
        .or(last_four)
        .unwrap_or_default();
    let authorization = tx
        .text("transId")
        .filter(|id| *id != "0")
        .map(|id| format!("{id}#{last_four}#{action}"));

    let mut builder = Response::builder(success, message)
        .maybe_authorization(authorization)
        .avs(tx.text("avsResultCode").filter(|c| *c != "P"))
        .cvv(tx.text("cvvResultCode"))
        .fraud_review(response_code == "4");
    if !success {
        builder = builder.error_code(error_code(response_code, reason_code));
    }
    builder.params(params).build()
}

fn profile_response(root: &XmlElement) -> Response {
    let success = result_ok(root);
    let message = root.text("messages/message/text").unwrap_or("No message").to_owned();
    let authorization = root.text("customerProfileId").map(|customer| {
        let payment = root
            .text("customerPaymentProfileIdList/numericString")
            .or_else(|| root.text("customerPaymentProfileId"))
            .unwrap_or_default();
        format!("{customer}#{payment}")
    });
    let mut builder = Response::builder(success, message).maybe_authorization(authorization);
    if !success {
        let code = root.text("messages/message/code").unwrap_or_default();
        builder = builder.error_code(match code {
            "E00007" | "E00059" => StandardErrorCode::ConfigError,
            "E00027" => StandardErrorCode::CardDeclined,
            _ => StandardErrorCode::ProcessingError,
        });
    }
    builder.params(root.to_json()).build()
}

/// Maps a response code (1 approved, 2 declined, 3 error, 4 held) and the
/// response reason code to a standard code.
fn error_code(response_code: &str, reason_code: Option<&str>) -> StandardErrorCode {
    match reason_code {
        Some("4" | "41" | "250" | "251") => StandardErrorCode::PickupCard,
        Some("5") => StandardErrorCode::InvalidAmount,
        Some("6" | "37" | "17" | "28") => StandardErrorCode::InvalidNumber,
        Some("7") => StandardErrorCode::InvalidExpiryDate,
        Some("8") => StandardErrorCode::ExpiredCard,
        Some("27" | "127") => StandardErrorCode::IncorrectAddress,
        Some("44" | "45" | "65") => StandardErrorCode::IncorrectCvc,
        Some("78") => StandardErrorCode::InvalidCvc,
        Some("13" | "103" | "123") => StandardErrorCode::ConfigError,
        Some("2" | "3") => StandardErrorCode::CardDeclined,
        _ if response_code == "2" => StandardErrorCode::CardDeclined,
        _ => StandardErrorCode::ProcessingError,
    }
}

#[async_trait]
impl Gateway for AuthorizeNetGateway {
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
        self.transaction(
            Operation::Purchase,
            "authCaptureTransaction",
            Some(money),
            Some(source),
            None,
            options,
        )
        .await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, amount = money.cents()))]
    async fn authorize(
        &self,
        money: &Money,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        self.transaction(
            Operation::Authorize,
            "authOnlyTransaction",
            Some(money),
            Some(source),
            None,
            options,
        )
        .await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn capture(
        &self,
        money: &Money,
        authorization: &str,
        options: &TransactionOptions,
    ) -> Result<Response> {
        let reference = Authorization::parse(authorization);
        self.transaction(
            Operation::Capture,
            "priorAuthCaptureTransaction",
            Some(money),
            None,
            Some(&reference),
            options,
        )
        .await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn refund(
        &self,
        money: &Money,
        authorization: &str,
        options: &TransactionOptions,
    ) -> Result<Response> {
        let reference = Authorization::parse(authorization);
        if reference.last_four.is_none() {
            return Err(GatewayError::InvalidInput(
                "authorize_net refunds need an authorization of the form transId#last4#action"
                    .to_owned(),
            ));
        }
        self.transaction(
            Operation::Refund,
            "refundTransaction",
            Some(money),
            None,
            Some(&reference),
            options,
        )
        .await
    }

    #[instrument(skip_all, fields(gateway = INFO.id, authorization = %authorization))]
    async fn void(&self, authorization: &str, options: &TransactionOptions) -> Result<Response> {
        let reference = Authorization::parse(authorization);
        self.transaction(Operation::Void, "voidTransaction", None, None, Some(&reference), options)
            .await
    }

    /// Creates a CIM customer profile with one payment profile. The
    /// authorization is `customerProfileId#paymentProfileId`.
    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn store(
        &self,
        source: &PaymentSource,
        options: &TransactionOptions,
    ) -> Result<Response> {
        source.ensure_valid()?;
        let PaymentSource::Card(card) = source else {
            return Err(GatewayError::InvalidInput("authorize_net can only vault cards".to_owned()));
        };
        let merchant_customer_id = super::order_reference(options);
        let document = self.document("createCustomerProfileRequest", options, |xml| {
            xml.nest("profile", &[], |xml| {
                xml.element("merchantCustomerId", truncate(&merchant_customer_id, 20));
                xml.element_opt("description", options.description.as_deref());
                xml.element_opt("email", options.email.as_deref());
                xml.nest("paymentProfiles", &[], |xml| {
                    add_bill_to(xml, options);
                    add_card(xml, card);
                });
            });
            let mode = if self.connection.test() { "testMode" } else { "liveMode" };
            xml.element("validationMode", mode);
        });
        let call = Call::new(INFO.id, Operation::Store);
        self.commit(&call, Operation::Store, document, None).await
    }

    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn unstore(&self, token: &str, options: &TransactionOptions) -> Result<Response> {
        let customer = token.split('#').next().unwrap_or(token);
        let document = self.document("deleteCustomerProfileRequest", options, |xml| {
            xml.element("customerProfileId", customer);
        });
        let call = Call::new(INFO.id, Operation::Unstore);
        self.commit(&call, Operation::Unstore, document, None).await
    }

    /// Zero-amount authorization for brands that support it, otherwise an
    /// authorization of one unit followed by a void.
    #[instrument(skip_all, fields(gateway = INFO.id))]
    async fn verify(&self, card: &CreditCard, options: &TransactionOptions) -> Result<Response> {
        let zero_amount = matches!(
            card.brand(),
            Some(CardBrand::Visa | CardBrand::Master | CardBrand::Discover)
        );
        if !zero_amount {
            return authorize_then_void(self, card, options).await;
        }
        let money = Money::new(0, INFO.currency(options))?;
        let mut multi = MultiResponse::new();
        multi.process(self.authorize(&money, &PaymentSource::Card(card.clone()), options).await?);
        Ok(multi.into_response())
    }

    fn scrub(&self, transcript: &str) -> String {
        let scrubbed =
            scrub_pairs(transcript, &["transactionKey", "cardNumber", "cardCode", "accountNumber"]);
        redact_sensitive(&scrubbed)
    }
}
