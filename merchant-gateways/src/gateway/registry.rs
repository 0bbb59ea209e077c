//! Lookup of adapters by id and construction from configuration.

use std::sync::Arc;

use tracing::info;

use super::{Connection, Gateway, GatewayConfig, GatewayInfo};
use crate::{
    error::{GatewayError, Result},
    gateways::{
        self, AuthorizeNetGateway, BogusGateway, CheckoutGateway, CybersourceGateway,
        GlobalPaymentsGateway, NmiGateway, RapydGateway, StripeGateway,
    },
    reliability::RetryPolicy,
    transport::{HttpTransport, Transport},
};

static GATEWAYS: [&GatewayInfo; 8] = [
    &gateways::bogus::INFO,
    &gateways::stripe::INFO,
    &gateways::authorize_net::INFO,
    &gateways::checkout::INFO,
    &gateways::nmi::INFO,
    &gateways::rapyd::INFO,
    &gateways::cybersource::INFO,
    &gateways::global_payments::INFO,
];

/// Metadata of every adapter, in registry order.
///
/// # Examples
///
/// ```
/// use merchant_gateways::gateway::registry::available_gateways;
///
/// assert!(available_gateways().iter().any(|info| info.id == "stripe"));
/// ```
#[must_use]
pub fn available_gateways() -> &'static [&'static GatewayInfo] {
    &GATEWAYS
}

/// Metadata of one adapter.
#[must_use]
pub fn gateway_info(id: &str) -> Option<&'static GatewayInfo> {
    GATEWAYS.iter().copied().find(|info| info.id == id)
}

/// Builds the reqwest transport described by `config.http`.
///
/// # Errors
///
/// Returns [`GatewayError::ConfigError`] if the HTTP settings are invalid, or
/// the transport error if the client cannot be created.
pub fn build_transport(config: &GatewayConfig) -> Result<Arc<dyn Transport>> {
    config.http.validate()?;
    Ok(Arc::new(HttpTransport::with_config(&config.http)?))
}

/// Validates `config`, resolves its credentials and builds the adapter it
/// names on top of `transport`.
///
/// # Errors
///
/// Returns [`GatewayError::ConfigError`] for an unknown id, invalid settings,
/// an unset credential variable or a missing required credential.
pub fn build_gateway(
    config: &GatewayConfig,
    transport: Arc<dyn Transport>,
) -> Result<Box<dyn Gateway>> {
    config.validate()?;
    let id = config.gateway.as_str();
    let Some(info) = gateway_info(id) else {
        let known: Vec<&str> = GATEWAYS.iter().map(|info| info.id).collect();
        return Err(GatewayError::ConfigError(format!(
            "unknown gateway '{id}', expected one of: {}",
            known.join(", ")
        )));
    };

    let credentials = config.resolve_credentials()?;
    let mut connection = Connection::new(transport, config.test);
    if let Some(endpoint) = &config.endpoint {
        connection = connection.with_endpoint(endpoint);
    }
    if let Some(retry) = &config.retry {
        connection = connection.with_retry_policy(RetryPolicy::from(retry));
    }

    let gateway: Box<dyn Gateway> = match info.id {
        "bogus" => Box::new(BogusGateway::new(&credentials, connection)),
        "stripe" => Box::new(StripeGateway::new(&credentials, connection)?),
        "authorize_net" => Box::new(AuthorizeNetGateway::new(&credentials, connection)?),
        "checkout" => Box::new(CheckoutGateway::new(&credentials, connection)?),
        "nmi" => Box::new(NmiGateway::new(&credentials, connection)?),
        "rapyd" => Box::new(RapydGateway::new(&credentials, connection)?),
        "cybersource" => Box::new(CybersourceGateway::new(&credentials, connection)?),
        "global_payments" => Box::new(GlobalPaymentsGateway::new(&credentials, connection)?),
        other => {
            return Err(GatewayError::ConfigError(format!("gateway '{other}' has no constructor")));
        }
    };

    info!(gateway = info.id, test = config.test, endpoint = ?config.endpoint, "Gateway ready");
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gateway::Operation, transport::MockTransport};

    fn mock() -> Arc<dyn Transport> {
        Arc::new(MockTransport::new())
    }

    #[test]
    fn test_ids_are_unique_and_resolvable() {
        let mut ids: Vec<&str> = available_gateways().iter().map(|info| info.id).collect();
        for id in &ids {
            assert_eq!(gateway_info(id).map(|info| info.id), Some(*id));
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), available_gateways().len());
        assert!(gateway_info("paypal").is_none());
    }

    #[test]
    fn test_every_gateway_offers_purchase() {
        for info in available_gateways() {
            assert!(info.supports(Operation::Purchase), "{} lacks purchase", info.id);
        }
    }

    #[test]
    fn test_build_bogus_without_credentials() {
        let config = GatewayConfig::from_toml(r#"gateway = "bogus""#).unwrap();
        let gateway = build_gateway(&config, mock()).unwrap();
        assert_eq!(gateway.info().id, "bogus");
        assert!(gateway.test_mode());
    }

    #[test]
    fn test_build_with_literal_credentials() {
        let config = GatewayConfig::from_toml(
            r#"
            gateway = "nmi"
            test = false

            [credentials]
            security_key = "6457Thfj624V5r7WUwc5v6a68Zsd6YEm"
            "#,
        )
        .unwrap();
        let gateway = build_gateway(&config, mock()).unwrap();
        assert_eq!(gateway.info().id, "nmi");
        assert!(!gateway.test_mode());
    }

    #[test]
    fn test_missing_credential_is_config_error() {
        let config = GatewayConfig::from_toml(r#"gateway = "stripe""#).unwrap();
        let error = build_gateway(&config, mock()).unwrap_err();
        assert!(matches!(error, GatewayError::ConfigError(ref m) if m.contains("secret_key")));
    }

    #[test]
    fn test_unknown_gateway() {
        let config = GatewayConfig::from_toml(r#"gateway = "paypal""#).unwrap();
        let error = build_gateway(&config, mock()).unwrap_err();
        assert!(matches!(
            error,
            GatewayError::ConfigError(ref m) if m.contains("unknown gateway 'paypal'")
        ));
    }

    #[test]
    fn test_unset_env_credential() {
        let config = GatewayConfig::from_toml(
            r#"
            gateway = "checkout"

            [credentials]
            secret_key = { env = "MERCHANT_GATEWAYS_REGISTRY_TEST_UNSET" }
            "#,
        )
        .unwrap();
        let error = build_gateway(&config, mock()).unwrap_err();
        assert!(matches!(
            error,
            GatewayError::ConfigError(ref m) if m.contains("MERCHANT_GATEWAYS_REGISTRY_TEST_UNSET")
        ));
    }

    #[test]
    fn test_build_transport_from_defaults() {
        let config = GatewayConfig::from_toml(r#"gateway = "bogus""#).unwrap();
        assert!(build_transport(&config).is_ok());
    }
}
