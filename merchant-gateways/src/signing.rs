//! Request signing and credential encoding helpers.
//!
//! Gateways authenticate in a handful of recurring ways: HTTP Basic,
//! HMAC-SHA256 over a canonical string, and SHA digests of nonces. The
//! primitives live here so adapters only describe *what* they sign.

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE},
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::{Rng, distributions::Alphanumeric};
use sha2::{Digest, Sha256, Sha512};

use crate::error::{GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Raw HMAC-SHA256 tag.
///
/// # Errors
///
/// Returns [`GatewayError::Signature`] if the key is rejected by the MAC.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| GatewayError::Signature(format!("invalid HMAC key: {e}")))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Lower-case hex HMAC-SHA256 tag.
///
/// # Errors
///
/// Returns [`GatewayError::Signature`] if the key is rejected by the MAC.
///
/// # Examples
///
/// ```
/// use merchant_gateways::signing::hmac_sha256_hex;
///
/// let tag = hmac_sha256_hex(b"key", b"The quick brown fox jumps over the lazy dog").unwrap();
/// assert_eq!(tag, "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8");
/// ```
pub fn hmac_sha256_hex(key: &[u8], message: &[u8]) -> Result<String> {
    hmac_sha256(key, message).map(hex::encode)
}

/// Lower-case hex SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Lower-case hex SHA-512 digest.
#[must_use]
pub fn sha512_hex(data: &[u8]) -> String {
    hex::encode(Sha512::digest(data))
}

/// Standard Base64 with padding.
#[must_use]
pub fn base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// URL-safe Base64 with padding.
#[must_use]
pub fn base64_url(data: &[u8]) -> String {
    URL_SAFE.encode(data)
}

/// `Authorization` header value for HTTP Basic authentication.
///
/// # Examples
///
/// ```
/// use merchant_gateways::signing::basic_auth;
///
/// assert_eq!(basic_auth("sk_test", ""), "Basic c2tfdGVzdDo=");
/// ```
#[must_use]
pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", base64(format!("{user}:{password}").as_bytes()))
}

/// Random string of ASCII letters and digits, for salts and nonces.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

/// Seconds since the Unix epoch.
#[must_use]
pub fn unix_timestamp() -> i64 {
    Utc::now().timestamp()
}
