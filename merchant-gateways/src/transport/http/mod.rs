//! HTTP transport implementation.
//!
//! This module provides HTTP/1.1 and HTTP/2 transport using reqwest.

use reqwest::{Client, Method};
use tracing::{debug, instrument};
use url::Url;

use super::config::{HttpConfig, HttpVersion};
use crate::{
    error::{GatewayError, Result},
    transport::{HttpMethod, HttpRequest, HttpResponse, Transport},
};

/// Validates URL for security constraints.
///
/// Ensures the URL uses HTTPS and does not point to localhost, unless the
/// transport was configured with `allow_insecure`.
fn validate_url(url: &Url, allow_insecure: bool) -> Result<()> {
    if allow_insecure {
        return match url.scheme() {
            "https" | "http" => Ok(()),
            scheme => Err(GatewayError::Transport(format!("Unsupported URL scheme: {scheme}"))),
        };
    }

    if url.scheme() != "https" {
        return Err(GatewayError::Transport("Only HTTPS URLs are allowed".to_owned()));
    }

    if let Some(host) = url.host_str()
        && (host == "localhost" || host == "127.0.0.1" || host == "::1" || host == "[::1]")
    {
        return Err(GatewayError::Transport("Localhost URLs are not allowed".to_owned()));
    }

    Ok(())
}

/// Validates header name and value for CRLF injection prevention.
fn validate_header(name: &str, value: &str) -> Result<()> {
    if name.contains('\r') || name.contains('\n') || name.contains('\0') {
        return Err(GatewayError::Transport(
            "Invalid header name: control characters not allowed".to_owned(),
        ));
    }
    if value.contains('\r') || value.contains('\n') || value.contains('\0') {
        return Err(GatewayError::Transport(
            "Invalid header value: control characters not allowed".to_owned(),
        ));
    }
    Ok(())
}

/// HTTP/1.1 and HTTP/2 transport using reqwest.
///
/// Supports automatic connection pooling, keep-alive, and HTTP/2 multiplexing.
///
/// # Examples
///
/// ```
/// use merchant_gateways::transport::{HttpConfig, HttpTransport, HttpVersion};
///
/// let config = HttpConfig {
///     timeout_secs: 60,
///     http_version: HttpVersion::Http1,
///     ..HttpConfig::default()
/// };
/// let transport = HttpTransport::with_config(&config).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    http_version: HttpVersion,
    allow_insecure: bool,
}

impl HttpTransport {
    /// Creates a new HTTP transport with default settings.
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        Self::with_config(&HttpConfig::default())
    }

    /// Creates HTTP transport with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client creation fails.
    pub fn with_config(config: &HttpConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(concat!("merchant-gateways/", env!("CARGO_PKG_VERSION")));

        builder = match config.http_version {
            HttpVersion::Http1 => builder.http1_only(),
            HttpVersion::Http2 => builder.http2_prior_knowledge(),
            HttpVersion::Auto => builder,
        };

        let client = builder.build().map_err(GatewayError::Http)?;

        Ok(Self {
            client,
            http_version: config.http_version,
            allow_insecure: config.allow_insecure,
        })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = Url::parse(&request.url)
            .map_err(|e| GatewayError::Transport(format!("invalid URL '{}': {e}", request.url)))?;

        // Security: Validate URL scheme and host
        validate_url(&url, self.allow_insecure)?;

        // Security: Validate custom headers for CRLF injection
        for (key, value) in &request.headers {
            validate_header(key, value)?;
        }

        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        };

        let mut builder = self.client.request(method, url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_owned()))
            .collect();

        let body = response.bytes().await?.to_vec();
        debug!(status, bytes = body.len(), "gateway replied");

        Ok(HttpResponse { status, headers, body })
    }

    fn protocol_name(&self) -> &'static str {
        match self.http_version {
            HttpVersion::Http1 => "http/1.1",
            HttpVersion::Http2 => "http/2",
            HttpVersion::Auto => "http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_new() {
        let transport = HttpTransport::new().unwrap();
        assert_eq!(transport.protocol_name(), "http");
    }

    #[test]
    fn test_http_transport_protocol_name() {
        let config_http1 = HttpConfig { http_version: HttpVersion::Http1, ..Default::default() };
        let transport_http1 = HttpTransport::with_config(&config_http1).unwrap();
        assert_eq!(transport_http1.protocol_name(), "http/1.1");

        let config_http2 = HttpConfig { http_version: HttpVersion::Http2, ..Default::default() };
        let transport_http2 = HttpTransport::with_config(&config_http2).unwrap();
        assert_eq!(transport_http2.protocol_name(), "http/2");
    }

    #[tokio::test]
    async fn test_http_transport_invalid_url() {
        let transport = HttpTransport::new().unwrap();
        let result = transport.send(HttpRequest::get("not-a-url")).await;
        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }

    #[tokio::test]
    async fn test_http_transport_rejects_http_url() {
        let transport = HttpTransport::new().unwrap();
        let result = transport.send(HttpRequest::post("http://api.example.com/charges")).await;
        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }

    #[tokio::test]
    async fn test_http_transport_rejects_crlf_header() {
        let transport = HttpTransport::new().unwrap();
        let request = HttpRequest::get("https://api.example.com").header("X-Evil\r\n", "value");
        let result = transport.send(request).await;
        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }

    #[test]
    fn test_validate_url_https_required() {
        let https_url = Url::parse("https://example.com").unwrap();
        assert!(validate_url(&https_url, false).is_ok());

        let http_url = Url::parse("http://example.com").unwrap();
        let result = validate_url(&http_url, false);
        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }

    #[test]
    fn test_validate_url_localhost_blocked() {
        for url in ["https://localhost/api", "https://127.0.0.1/api", "https://[::1]/api"] {
            let url = Url::parse(url).unwrap();
            assert!(validate_url(&url, false).is_err(), "{url}");
        }
    }

    #[test]
    fn test_validate_url_insecure_allows_loopback_http() {
        let url = Url::parse("http://127.0.0.1:8080/v1/charges").unwrap();
        assert!(validate_url(&url, true).is_ok());

        let url = Url::parse("file:///etc/passwd").unwrap();
        assert!(validate_url(&url, true).is_err());
    }

    #[test]
    fn test_validate_header_crlf_injection_blocked() {
        assert!(validate_header("Content-Type", "application/json").is_ok());
        assert!(validate_header("X-Evil\r\n", "value").is_err());
        assert!(validate_header("X-Custom", "value\r\nEvil-Header: injected").is_err());
        assert!(validate_header("X-Evil\0", "value").is_err());
        assert!(validate_header("X-Custom", "value\0evil").is_err());
    }
}
