//! HTTP transport abstraction.
//!
//! Adapters never talk to `reqwest` directly. They build an [`HttpRequest`]
//! and hand it to a [`Transport`], which makes testing every adapter against
//! canned replies ([`MockTransport`]) as easy as running it for real
//! ([`HttpTransport`]).
//!
//! A non-2xx reply is **not** an error at this layer: payment gateways put
//! their decline and validation messages in 4xx bodies, so the transport
//! returns them as `Ok(HttpResponse)` and leaves interpretation to the
//! adapter. Only failures that produced no reply at all are errors.
//!
//! # Examples
//!
//! ```rust,no_run
//! use merchant_gateways::transport::{HttpRequest, HttpTransport, Transport};
//!
//! # async fn example() -> merchant_gateways::error::Result<()> {
//! let transport = HttpTransport::new()?;
//! let request = HttpRequest::post("https://api.stripe.com/v1/charges")
//!     .header("Authorization", "Basic c2tfdGVzdDo=")
//!     .form(&[("amount", "1000"), ("currency", "usd")]);
//!
//! let response = transport.send(request).await?;
//! println!("Status: {}", response.status);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use async_trait::async_trait;

use crate::{codec::form, error::Result};

pub mod config;
pub mod http;
mod mock;

pub use config::{HttpConfig, HttpVersion};
pub use http::HttpTransport;
pub use mock::MockTransport;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Headers in insertion order.
    pub headers: Vec<(String, String)>,
    /// Raw body; empty for bodiless requests.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a request with no headers or body.
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), headers: Vec::new(), body: Vec::new() }
    }

    /// GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// DELETE request.
    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a form-encoded body and its content type.
    #[must_use]
    pub fn form<K: AsRef<str>, V: AsRef<str>>(self, pairs: &[(K, V)]) -> Self {
        self.header("Content-Type", "application/x-www-form-urlencoded")
            .body(form::encode(pairs))
    }

    /// Sets a JSON body and its content type.
    #[must_use]
    pub fn json(self, value: &serde_json::Value) -> Self {
        self.header("Content-Type", "application/json").body(value.to_string())
    }

    /// Sets an XML body with the given content type.
    #[must_use]
    pub fn xml(self, content_type: &str, document: impl Into<String>) -> Self {
        self.header("Content-Type", content_type).body(document.into())
    }

    /// Looks up a header, case-insensitively.
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Body as UTF-8, lossily.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Reply from the gateway, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Raw response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, headers: Vec::new(), body: body.into() }
    }

    /// True for 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Body as UTF-8, lossily.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Looks up a header, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
}

/// Sends one request and returns the reply.
///
/// Implementations must be shareable across tasks; adapters hold them as
/// `Arc<dyn Transport>`.
///
/// # Errors
///
/// `send` fails only when no HTTP reply was obtained (network, TLS, timeout)
/// or the request was refused by validation. Error statuses are returned as
/// `Ok`.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends the request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Protocol name for logs.
    fn protocol_name(&self) -> &'static str {
        "http"
    }
}
