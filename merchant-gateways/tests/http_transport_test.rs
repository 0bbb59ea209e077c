//! Integration tests for the reqwest transport against a local wiremock server.

use merchant_gateways::{
    error::GatewayError,
    transport::{HttpConfig, HttpRequest, HttpTransport, Transport},
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string, header, method, path},
};

fn insecure_transport() -> HttpTransport {
    let config = HttpConfig { allow_insecure: true, ..HttpConfig::default() };
    HttpTransport::with_config(&config).expect("transport build")
}

#[tokio::test]
async fn test_post_sends_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(header("Idempotency-Key", "key-1"))
        .and(body_string("amount=1000&currency=usd"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Request-Id", "req_123")
                .set_body_string(r#"{"id":"ch_1"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = HttpRequest::post(format!("{}/v1/charges", server.uri()))
        .header("Idempotency-Key", "key-1")
        .form(&[("amount", "1000"), ("currency", "usd")]);
    let response = insecure_transport().send(request).await.expect("send");

    assert_eq!(response.status, 200);
    assert!(response.is_success());
    assert_eq!(response.text(), r#"{"id":"ch_1"}"#);
    assert_eq!(response.header("request-id"), Some("req_123"));
}

#[tokio::test]
async fn test_error_status_is_returned_not_raised() {
    let server = MockServer::start().await;
    let body = r#"{"error":{"message":"No such customer"}}"#;
    Mock::given(method("DELETE"))
        .and(path("/customers/cus_1"))
        .respond_with(ResponseTemplate::new(404).set_body_string(body))
        .mount(&server)
        .await;

    let request = HttpRequest::delete(format!("{}/customers/cus_1", server.uri()));
    let response = insecure_transport().send(request).await.expect("send");

    assert_eq!(response.status, 404);
    assert!(!response.is_success());
    assert!(response.text().contains("No such customer"));
}

#[tokio::test]
async fn test_plain_http_rejected_without_allow_insecure() {
    let server = MockServer::start().await;
    let transport = HttpTransport::new().expect("transport build");
    let result = transport.send(HttpRequest::get(server.uri())).await;
    assert!(matches!(result, Err(GatewayError::Transport(_))));
}

#[tokio::test]
async fn test_connection_refused_is_http_error() {
    let result = insecure_transport().send(HttpRequest::get("http://127.0.0.1:9/")).await;
    assert!(matches!(result, Err(GatewayError::Http(_))));
}
