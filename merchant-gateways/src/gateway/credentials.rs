use std::{collections::BTreeMap, fmt};

use crate::error::{GatewayError, Result};

/// Named secrets an adapter needs (API keys, logins, passwords).
///
/// `Debug` lists the names only.
///
/// # Examples
///
/// ```
/// use merchant_gateways::gateway::Credentials;
///
/// let credentials = Credentials::new().with("login", "api-login").with("password", "s3cret");
/// assert_eq!(credentials.require("login").unwrap(), "api-login");
/// assert!(credentials.require("secret_key").is_err());
/// assert!(!format!("{credentials:?}").contains("s3cret"));
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a credential.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds or replaces a credential.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Returns a mandatory credential.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] if the credential is missing or blank.
    pub fn require(&self, name: &str) -> Result<&str> {
        self.optional(name)
            .ok_or_else(|| GatewayError::ConfigError(format!("missing credential '{name}'")))
    }

    /// Returns a credential if present and not blank.
    #[must_use]
    pub fn optional(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str).filter(|value| !value.trim().is_empty())
    }

    /// Credential names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
