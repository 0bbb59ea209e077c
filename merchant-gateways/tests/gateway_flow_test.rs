//! End-to-end adapter tests: TOML configuration, registry, reqwest transport
//! and a wiremock server standing in for the processor.

use merchant_gateways::{
    error::GatewayError,
    gateway::{
        Gateway, GatewayConfig,
        registry::{build_gateway, build_transport},
    },
    money::{Currency, Money},
    payment::{CreditCard, PaymentSource, TransactionOptions},
    response::StandardErrorCode,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, header_exists, method, path},
};

fn gateway_with_path(server: &MockServer, toml: &str, base_path: &str) -> Box<dyn Gateway> {
    let config = GatewayConfig::from_toml(&format!(
        "endpoint = \"{}{base_path}\"\n{toml}\n[http]\nallow_insecure = true\n",
        server.uri(),
    ))
    .expect("valid config");
    let transport = build_transport(&config).expect("transport");
    build_gateway(&config, transport).expect("gateway")
}

fn visa() -> PaymentSource {
    let card = CreditCard::new("4111111111111111", 9, 2040).with_cvv("123");
    PaymentSource::Card(card.with_name("Longbob", "Longsen"))
}

fn ten_dollars() -> Money {
    Money::new(1000, Currency::usd()).expect("money")
}

fn options() -> TransactionOptions {
    TransactionOptions::new().with_order_id("order-42").with_description("Integration test")
}

const STRIPE_TOML: &str = r#"
gateway = "stripe"

[credentials]
secret_key = "sk_test_123"

[retry]
max_attempts = 3
initial_delay_ms = 1
max_delay_ms = 5
"#;

const STRIPE_CHARGE: &str = r#"{
    "id": "ch_3LxY",
    "object": "charge",
    "amount": 1000,
    "captured": true,
    "status": "succeeded",
    "payment_method_details": {"card": {"checks": {
        "address_line1_check": "pass", "address_postal_code_check": "pass", "cvc_check": "pass"
    }}}
}"#;

#[tokio::test]
async fn test_stripe_purchase_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .and(header("Authorization", "Basic c2tfdGVzdF8xMjM6"))
        .and(header_exists("Idempotency-Key"))
        .and(body_string_contains("amount=1000"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STRIPE_CHARGE))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with_path(&server, STRIPE_TOML, "/v1");
    let response = gateway.purchase(&ten_dollars(), &visa(), &options()).await.expect("purchase");

    assert!(response.success, "{}", response.message);
    assert_eq!(response.authorization.as_deref(), Some("ch_3LxY"));
    assert!(response.test);

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 2);
    let keys: Vec<_> = requests.iter().map(|r| r.headers.get("Idempotency-Key").cloned()).collect();
    assert_eq!(keys[0], keys[1], "retries must reuse the idempotency key");
}

#[tokio::test]
async fn test_stripe_decline_is_unsuccessful_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .respond_with(ResponseTemplate::new(402).set_body_string(
            r#"{"error":{"type":"card_error","code":"card_declined",
                "decline_code":"generic_decline","message":"Your card was declined.",
                "charge":"ch_declined"}}"#,
        ))
        .mount(&server)
        .await;

    let gateway = gateway_with_path(&server, STRIPE_TOML, "/v1");
    let response = gateway.purchase(&ten_dollars(), &visa(), &options()).await.expect("purchase");

    assert!(!response.success);
    assert_eq!(response.message, "Your card was declined.");
    assert_eq!(response.error_code, Some(StandardErrorCode::CardDeclined));
    assert_eq!(response.authorization.as_deref(), Some("ch_declined"));
}

const NMI_TOML: &str = r#"
gateway = "nmi"

[credentials]
security_key = "6457Thfj624V5r7WUwc5v6a68Zsd6YEm"
"#;

#[tokio::test]
async fn test_nmi_authorize_and_capture() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/transact.php"))
        .and(body_string_contains("type=auth"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "response=1&responsetext=SUCCESS&authcode=123456&transactionid=7001\
             &avsresponse=Y&cvvresponse=M&response_code=100",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/transact.php"))
        .and(body_string_contains("type=capture"))
        .and(body_string_contains("transactionid=7001"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "response=1&responsetext=SUCCESS&transactionid=7001&response_code=100",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with_path(&server, NMI_TOML, "/api/transact.php");
    let auth = gateway.authorize(&ten_dollars(), &visa(), &options()).await.expect("authorize");
    assert!(auth.success);
    let authorization = auth.authorization.expect("authorization");

    let capture =
        gateway.capture(&ten_dollars(), &authorization, &options()).await.expect("capture");
    assert!(capture.success);
    assert_eq!(capture.message, "Succeeded");
}

#[tokio::test]
async fn test_authorize_net_verify_authorizes_then_voids() {
    let server = MockServer::start().await;
    let approved = |trans_id: &str| {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <createTransactionResponse>\
               <messages><resultCode>Ok</resultCode>\
                 <message><code>I00001</code><text>Successful.</text></message></messages>\
               <transactionResponse><responseCode>1</responseCode><transId>{trans_id}</transId>\
                 <accountNumber>XXXX0005</accountNumber>\
                 <messages><message><code>1</code>\
                   <description>This transaction has been approved.</description>\
                 </message></messages>\
               </transactionResponse>\
             </createTransactionResponse>"
        )
    };
    Mock::given(method("POST"))
        .and(body_string_contains("authOnlyTransaction"))
        .and(body_string_contains("<amount>1.00</amount>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(approved("60001")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("voidTransaction"))
        .and(body_string_contains("<refTransId>60001</refTransId>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(approved("60001")))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with_path(
        &server,
        r#"
        gateway = "authorize_net"

        [credentials]
        login = "api-login"
        password = "tx-key"
        "#,
        "",
    );
    let amex = CreditCard::new("378282246310005", 9, 2040).with_name("Longbob", "Longsen");
    let response = gateway.verify(&amex, &options()).await.expect("verify");

    assert!(response.success);
    assert_eq!(response.message, "This transaction has been approved.");
    assert!(response.authorization.expect("authorization").starts_with("60001#0005#"));
}

#[tokio::test]
async fn test_rapyd_requests_are_signed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments"))
        .and(header("access_key", "ak_test"))
        .and(header_exists("salt"))
        .and(header_exists("timestamp"))
        .and(header_exists("signature"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"status":{"status":"SUCCESS","error_code":""},
                "data":{"id":"payment_1","status":"CLO"}}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with_path(
        &server,
        r#"
        gateway = "rapyd"

        [credentials]
        access_key = "ak_test"
        secret_key = "sk_test"
        "#,
        "",
    );
    let response = gateway.purchase(&ten_dollars(), &visa(), &options()).await.expect("purchase");
    assert!(response.success);
    assert_eq!(response.authorization.as_deref(), Some("payment_1"));
}

#[tokio::test]
async fn test_unparsable_reply_is_failed_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let gateway = gateway_with_path(&server, NMI_TOML, "/api/transact.php");
    let response = gateway.purchase(&ten_dollars(), &visa(), &options()).await.expect("purchase");
    assert!(!response.success);
    assert_eq!(response.error_code, Some(StandardErrorCode::ProcessingError));
}

#[tokio::test]
async fn test_insecure_endpoint_rejected_by_default() {
    let server = MockServer::start().await;
    let error = GatewayConfig::from_toml(&format!(
        "gateway = \"nmi\"\nendpoint = \"{}\"\n[credentials]\nsecurity_key = \"k\"\n",
        server.uri()
    ))
    .expect_err("plain http endpoint must be rejected");
    assert!(matches!(error, GatewayError::ConfigError(_)));
}

#[tokio::test]
async fn test_bogus_round_trip_through_registry() {
    let config = GatewayConfig::from_toml(r#"gateway = "bogus""#).expect("config");
    let transport = build_transport(&config).expect("transport");
    let gateway = build_gateway(&config, transport).expect("gateway");

    let purchase = gateway.purchase(&ten_dollars(), &visa(), &options()).await.expect("purchase");
    assert!(purchase.success);
    let authorization = purchase.authorization.expect("authorization");

    let refund = gateway.refund(&ten_dollars(), &authorization, &options()).await.expect("refund");
    assert!(refund.success);

    let declined = gateway
        .purchase(&ten_dollars(), &PaymentSource::token("tok_2"), &options())
        .await
        .expect("purchase");
    assert!(!declined.success);
}
