//! In-process gateway for integration tests.
//!
//! The outcome is chosen by the last digit of the payment source:
//!
//! | Card, account or token ends with | Result |
//! |----------------------------------|--------|
//! | `1` | approved |
//! | `2` | declined |
//! | anything else | [`GatewayError::InvalidInput`] |
//!
//! Follow-up calls (capture, refund, void, unstore) look at the reference
//! instead: `1` is an error, `2` a decline, anything else succeeds.

use async_trait::async_trait;
use serde_json::json;

use crate::{
    error::{GatewayError, Result},
    gateway::{Call, Connection, Credentials, Gateway, GatewayInfo, Operation},
    money::{Money, MoneyFormat},
    payment::{CardBrand, PaymentSource, TransactionOptions},
    response::{Response, StandardErrorCode},
};

/// Authorization returned by every successful bogus transaction.
pub const AUTHORIZATION: &str = "53433";

const SUCCESS_MESSAGE: &str = "Bogus Gateway: Forced success";
const FAILURE_MESSAGE: &str = "Bogus Gateway: Forced failure";
const NUMBER_ERROR_MESSAGE: &str = "Bogus Gateway: Use CreditCard number ending in 1 for success, \
                                    2 for exception and anything else for error";
const REFERENCE_ERROR_MESSAGE: &str = "Bogus Gateway: Use authorization number ending in 1 for \
                                       exception, 2 for error and anything else for success";

/// Static metadata.
pub static INFO: GatewayInfo = GatewayInfo {
    id: "bogus",
    display_name: "Bogus",
    homepage: "http://example.com",
    test_url: "",
    live_url: "",
    supported_countries: &["US"],
    supported_brands: &[
        CardBrand::Visa,
        CardBrand::Master,
        CardBrand::AmericanExpress,
        CardBrand::Discover,
    ],
    default_currency: "USD",
    money_format: MoneyFormat::Cents,
    operations: &Operation::ALL,
};

/// Gateway that never leaves the process.
#[derive(Debug, Clone)]
pub struct BogusGateway {
    connection: Connection,
}

impl BogusGateway {
    /// Creates the gateway. No credentials are needed.
    #[must_use]
    pub fn new(_credentials: &Credentials, connection: Connection) -> Self {
        Self { connection }
    }

    fn by_source(
        &self,
        operation: Operation,
        money: Option<&Money>,
        source: &PaymentSource,
    ) -> Result<Response> {
        let call = Call::new(INFO.id, operation);
        let reference = match source {
            PaymentSource::Card(card) => card.digits(),
            PaymentSource::Check(check) => check.account_number.clone(),
            PaymentSource::Token { token } => token.clone(),
        };
        let params = json!({ "paid_amount": money.map(|m| m.format(INFO.money_format)) });

        let response = match reference.chars().last() {
            Some('1') => Response::builder(true, SUCCESS_MESSAGE)
                .params(params)
                .authorization(if operation == Operation::Store { "1" } else { AUTHORIZATION })
                .build(),
            Some('2') => Response::builder(false, FAILURE_MESSAGE)
                .params(json!({ "paid_amount": params["paid_amount"], "error": FAILURE_MESSAGE }))
                .error_code(StandardErrorCode::ProcessingError)
                .build(),
            _ => return Err(GatewayError::InvalidInput(NUMBER_ERROR_MESSAGE.to_owned())),
        };
        Ok(self.connection.finish(&call, response))
    }

    fn by_reference(
        &self,
        operation: Operation,
        money: Option<&Money>,
        reference: &str,
    ) -> Result<Response> {
        let call = Call::new(INFO.id, operation);
        let params = json!({ "paid_amount": money.map(|m| m.format(INFO.money_format)) });

        let response = match reference.chars().last() {
            Some('1') => return Err(GatewayError::InvalidInput(REFERENCE_ERROR_MESSAGE.to_owned())),
            Some('2') => Response::builder(false, FAILURE_MESSAGE)
                .params(params)
                .error_code(StandardErrorCode::ProcessingError)
                .build(),
            _ => Response::builder(true, SUCCESS_MESSAGE).params(params).build(),
        };
        Ok(self.connection.finish(&call, response))
    }
}

#[async_trait]
impl Gateway for BogusGateway {
    fn info(&self) -> &'static GatewayInfo {
        &INFO
    }

    fn test_mode(&self) -> bool {
        self.connection.test()
    }

    async fn purchase(
        &self,
        money: &Money,
        source: &PaymentSource,
        _options: &TransactionOptions,
    ) -> Result<Response> {
        self.by_source(Operation::Purchase, Some(money), source)
    }

    async fn authorize(
        &self,
        money: &Money,
        source: &PaymentSource,
        _options: &TransactionOptions,
    ) -> Result<Response> {
        self.by_source(Operation::Authorize, Some(money), source)
    }

    async fn capture(
        &self,
        money: &Money,
        authorization: &str,
        _options: &TransactionOptions,
    ) -> Result<Response> {
        self.by_reference(Operation::Capture, Some(money), authorization)
    }

    async fn refund(
        &self,
        money: &Money,
        authorization: &str,
        _options: &TransactionOptions,
    ) -> Result<Response> {
        self.by_reference(Operation::Refund, Some(money), authorization)
    }

    async fn void(&self, authorization: &str, _options: &TransactionOptions) -> Result<Response> {
        self.by_reference(Operation::Void, None, authorization)
    }

    async fn store(
        &self,
        source: &PaymentSource,
        _options: &TransactionOptions,
    ) -> Result<Response> {
        self.by_source(Operation::Store, None, source)
    }

    async fn unstore(&self, token: &str, _options: &TransactionOptions) -> Result<Response> {
        self.by_reference(Operation::Unstore, None, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gateways::test_support::mock_connection,
        money::Currency,
        payment::CreditCard,
    };

    fn gateway() -> BogusGateway {
        let (_, connection) = mock_connection();
        BogusGateway::new(&Credentials::new(), connection)
    }

    fn money() -> Money {
        Money::new(1000, Currency::usd()).unwrap()
    }

    fn card(number: &str) -> PaymentSource {
        CreditCard::new(number, 9, 2040).into()
    }

    #[tokio::test]
    async fn test_purchase_success() {
        let response =
            gateway().purchase(&money(), &card("1"), &TransactionOptions::new()).await.unwrap();
        assert!(response.success);
        assert!(response.test);
        assert_eq!(response.authorization.as_deref(), Some(AUTHORIZATION));
        assert_eq!(response.param("paid_amount"), Some("1000"));
    }

    #[tokio::test]
    async fn test_purchase_decline() {
        let response =
            gateway().purchase(&money(), &card("2"), &TransactionOptions::new()).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.message, FAILURE_MESSAGE);
        assert_eq!(response.error_code, Some(StandardErrorCode::ProcessingError));
    }

    #[tokio::test]
    async fn test_purchase_error() {
        let result = gateway().purchase(&money(), &card("123"), &TransactionOptions::new()).await;
        assert!(matches!(result, Err(GatewayError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_reference_outcomes() {
        let gateway = gateway();
        let options = TransactionOptions::new();
        assert!(gateway.capture(&money(), "1", &options).await.is_err());
        assert!(!gateway.capture(&money(), "2", &options).await.unwrap().success);
        assert!(gateway.capture(&money(), AUTHORIZATION, &options).await.unwrap().success);
        assert!(gateway.void("53433", &options).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_store_and_unstore() {
        let gateway = gateway();
        let options = TransactionOptions::new();
        let stored = gateway.store(&card("4111111111111111"), &options).await.unwrap();
        assert_eq!(stored.authorization.as_deref(), Some("1"));
        assert!(gateway.unstore("3", &options).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_token_source() {
        let response = gateway()
            .purchase(&money(), &PaymentSource::token("tok_1"), &TransactionOptions::new())
            .await
            .unwrap();
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_verify_uses_authorize_then_void() {
        let card = CreditCard::new("1", 9, 2040);
        let response = gateway().verify(&card, &TransactionOptions::new()).await.unwrap();
        assert!(response.success);
        assert_eq!(response.param("paid_amount"), Some("100"));
    }
}
