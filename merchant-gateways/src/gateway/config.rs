//! TOML configuration for one gateway.
//!
//! ```toml
//! gateway = "stripe"
//! test = true
//!
//! [credentials]
//! secret_key = { env = "STRIPE_SECRET_KEY" }
//! api_version = "2020-08-27"
//!
//! [http]
//! timeout_secs = 30
//!
//! [retry]
//! max_attempts = 3
//! ```

use std::{collections::BTreeMap, fmt, path::Path};

use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use super::Credentials;
use crate::{
    audit,
    error::{GatewayError, Result},
    reliability::RetryConfig,
    security::AuditEventType,
    transport::HttpConfig,
};

const fn default_test() -> bool {
    true
}

/// Where a credential value comes from.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CredentialSource {
    /// Value written in the file.
    Literal(String),
    /// Value read from an environment variable at startup.
    Env {
        /// Variable name.
        env: String,
    },
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(_) => f.write_str("Literal([FILTERED])"),
            Self::Env { env } => f.debug_struct("Env").field("env", env).finish(),
        }
    }
}

/// Configuration of one gateway adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Registry id, see [`available_gateways`](super::registry::available_gateways).
    pub gateway: String,

    /// Talk to the sandbox (default: true).
    #[serde(default = "default_test")]
    pub test: bool,

    /// Base URL override.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Credential values or environment references.
    #[serde(default)]
    pub credentials: BTreeMap<String, CredentialSource>,

    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry settings for adapters that retry.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl GatewayConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] on malformed TOML or failed validation.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| GatewayError::ConfigError(format!("invalid TOML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] if the file cannot be read or is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::ConfigError(format!(
                "cannot read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.trim().is_empty() {
            return Err(GatewayError::ConfigError("gateway id cannot be empty".to_owned()));
        }

        for (name, source) in &self.credentials {
            if let CredentialSource::Env { env } = source {
                validate_env_var_name(env).map_err(|e| {
                    GatewayError::ConfigError(format!("credential '{name}': {e}"))
                })?;
            }
        }

        if let Some(endpoint) = &self.endpoint {
            validate_endpoint(endpoint, self.http.allow_insecure)?;
        }

        self.http.validate()?;

        if let Some(retry) = &self.retry
            && !(1..=10).contains(&retry.max_attempts)
        {
            return Err(GatewayError::ConfigError(format!(
                "retry.max_attempts must be between 1 and 10, got {}",
                retry.max_attempts
            )));
        }

        Ok(())
    }

    /// Resolves every credential, reading environment variables as needed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] naming the first unset variable.
    pub fn resolve_credentials(&self) -> Result<Credentials> {
        let mut credentials = Credentials::new();
        for (name, source) in &self.credentials {
            let value = match source {
                CredentialSource::Literal(value) => value.clone(),
                CredentialSource::Env { env } => std::env::var(env).map_err(|_| {
                    GatewayError::ConfigError(format!(
                        "environment variable {env} for credential '{name}' is not set"
                    ))
                })?,
            };
            credentials.insert(name, value);
        }

        audit!(AuditEventType::CredentialsLoaded, self.gateway.as_str(), Uuid::new_v4());
        Ok(credentials)
    }
}

/// Checks that `name` is a portable environment variable name.
fn validate_env_var_name(name: &str) -> std::result::Result<(), String> {
    let Some(first) = name.chars().next() else {
        return Err("environment variable name cannot be empty".to_owned());
    };

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(format!(
            "environment variable name must start with letter or underscore: {name}"
        ));
    }

    if let Some(ch) = name.chars().find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_') {
        return Err(format!("environment variable name contains invalid character '{ch}': {name}"));
    }

    Ok(())
}

/// Endpoint overrides must be HTTPS and not loopback, unless insecure
/// endpoints are explicitly allowed (local test servers).
fn validate_endpoint(endpoint: &str, allow_insecure: bool) -> Result<()> {
    let url = Url::parse(endpoint)
        .map_err(|e| GatewayError::ConfigError(format!("invalid endpoint '{endpoint}': {e}")))?;

    if allow_insecure {
        return Ok(());
    }

    if url.scheme() != "https" {
        return Err(GatewayError::ConfigError(format!(
            "endpoint must use HTTPS, got: {}",
            url.scheme()
        )));
    }

    if let Some(host) = url.host_str() {
        let host = host.to_lowercase();
        if host == "localhost" || host.starts_with("127.") || host == "[::1]" || host == "::1" {
            return Err(GatewayError::ConfigError(format!(
                "endpoint must not be localhost or loopback: {host}"
            )));
        }
    }

    Ok(())
}
