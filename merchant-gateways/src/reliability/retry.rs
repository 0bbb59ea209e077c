//! Exponential backoff retry logic for transient failures.
//!
//! Retrying a payment is only safe when the gateway deduplicates requests,
//! so adapters opt in explicitly (see [`Connection::send_with_retry`]).
//!
//! [`Connection::send_with_retry`]: crate::gateway::Connection::send_with_retry

use std::time::Duration;

use serde::Deserialize;

use crate::error::GatewayError;

/// Configuration for retry behavior.
///
/// Defines the parameters for exponential backoff retry logic.
/// The delay between retries increases exponentially up to a maximum value.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use merchant_gateways::reliability::RetryPolicy;
///
/// // Default policy: 3 attempts, 100ms initial delay, 5s max delay
/// let policy = RetryPolicy::default();
///
/// // Custom policy: more aggressive retries
/// let aggressive = RetryPolicy {
///     max_attempts: 5,
///     initial_delay: Duration::from_millis(50),
///     max_delay: Duration::from_secs(10),
///     backoff_multiplier: 2.0,
/// };
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (default: 3)
    pub max_attempts: u32,
    /// Initial delay between retries (default: 100ms)
    pub initial_delay: Duration,
    /// Maximum delay between retries (default: 5s)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy with custom maximum attempts.
    ///
    /// # Examples
    ///
    /// ```
    /// use merchant_gateways::reliability::RetryPolicy;
    ///
    /// let policy = RetryPolicy::with_max_attempts(5);
    /// assert_eq!(policy.max_attempts, 5);
    /// ```
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self { max_attempts, ..Self::default() }
    }

    /// Policy that never waits, for tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Calculates delay for a specific attempt.
    ///
    /// Uses exponential backoff: delay = `initial_delay` * (multiplier ^ attempt)
    /// Capped at `max_delay` to prevent excessive waits.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        #[allow(
            clippy::cast_precision_loss,
            reason = "acceptable for duration calculations"
        )]
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_precision_loss,
            clippy::cast_sign_loss,
            reason = "delay_ms is positive and capped below"
        )]
        let delay = Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as f64) as u64);
        delay.min(self.max_delay)
    }
}

/// TOML form of [`RetryPolicy`].
///
/// ```toml
/// [retry]
/// max_attempts = 3
/// initial_delay_ms = 250
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryConfig {
    /// Attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First delay in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor per attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_delay_ms() -> u64 {
    100
}

const fn default_max_delay_ms() -> u64 {
    5_000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

/// Executes operation with exponential backoff retry on every error.
///
/// # Examples
///
/// ```
/// use std::sync::{
///     Arc,
///     atomic::{AtomicU32, Ordering},
/// };
///
/// use merchant_gateways::reliability::{RetryPolicy, retry_with_backoff};
///
/// # async fn example() -> Result<String, String> {
/// let policy = RetryPolicy::default();
/// let attempt = Arc::new(AtomicU32::new(0));
///
/// let result = retry_with_backoff(&policy, || {
///     let attempt = Arc::clone(&attempt);
///     async move {
///         let n = attempt.fetch_add(1, Ordering::Relaxed);
///         if n < 2 { Err("temporary failure".to_string()) } else { Ok("success".to_string()) }
///     }
/// })
/// .await?;
///
/// assert_eq!(result, "success");
/// # Ok(result)
/// # }
/// ```
///
/// # Errors
///
/// Returns the last error encountered if all retry attempts fail.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_backoff_if(policy, |_| true, operation).await
}

/// Executes operation with exponential backoff, retrying only errors for
/// which `should_retry` returns true.
///
/// At least one attempt is always made, even if `max_attempts` is 0.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last error once attempts
/// are exhausted.
pub async fn retry_with_backoff_if<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempt = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                let retryable = should_retry(&error);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    retryable,
                    error = %error,
                    "Operation failed"
                );

                if !retryable || attempt + 1 >= max_attempts {
                    return Err(error);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(delay_ms = delay.as_millis(), "Sleeping before retry");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Determines if an error is retryable.
///
/// Returns `true` for transient failures that might succeed on retry:
/// timeouts, connection failures and retryable gateway statuses (429, 5xx).
///
/// # Examples
///
/// ```
/// use merchant_gateways::{error::GatewayError, reliability::is_retryable};
///
/// let error = GatewayError::ServerError { status: 503, body: Vec::new() };
/// assert!(is_retryable(&error));
///
/// let error = GatewayError::InvalidInput("bad card".to_string());
/// assert!(!is_retryable(&error));
/// ```
#[must_use]
pub fn is_retryable(error: &GatewayError) -> bool {
    match error {
        GatewayError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        GatewayError::ServerError { status, .. } => *status == 429 || *status >= 500,
        GatewayError::Transport(_)
        | GatewayError::InvalidInput(_)
        | GatewayError::ConfigError(_)
        | GatewayError::UnsupportedOperation { .. }
        | GatewayError::InvalidResponse { .. }
        | GatewayError::Signature(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
        assert!((policy.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_delay_for_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_retry_config_from_toml() {
        let config: RetryConfig =
            toml::from_str("max_attempts = 5\ninitial_delay_ms = 20").unwrap();
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(20));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_retry_config_zero_attempts_clamped() {
        let config: RetryConfig = toml::from_str("max_attempts = 0").unwrap();
        assert_eq!(RetryPolicy::from(&config).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_with_backoff_success_after_retries() {
        let policy = RetryPolicy::immediate(3);
        let call_count = Arc::new(Mutex::new(0));

        let count_clone = Arc::clone(&call_count);
        let result = retry_with_backoff(&policy, || {
            let count = Arc::clone(&count_clone);
            async move {
                let mut c = count.lock().unwrap();
                *c += 1;
                let current = *c;
                drop(c);

                if current < 3 {
                    Err(GatewayError::Transport("temporary failure".to_owned()))
                } else {
                    Ok::<i32, GatewayError>(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*call_count.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_with_backoff_all_attempts_fail() {
        let policy = RetryPolicy::immediate(3);
        let call_count = Arc::new(Mutex::new(0));

        let count_clone = Arc::clone(&call_count);
        let result = retry_with_backoff(&policy, || {
            let count = Arc::clone(&count_clone);
            async move {
                *count.lock().unwrap() += 1;
                Err::<i32, GatewayError>(GatewayError::Signature("persistent error".to_owned()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(*call_count.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_if_stops_on_non_retryable() {
        let policy = RetryPolicy::immediate(5);
        let call_count = Arc::new(Mutex::new(0));

        let count_clone = Arc::clone(&call_count);
        let result = retry_with_backoff_if(&policy, is_retryable, || {
            let count = Arc::clone(&count_clone);
            async move {
                *count.lock().unwrap() += 1;
                Err::<i32, GatewayError>(GatewayError::InvalidInput("bad".to_owned()))
            }
        })
        .await;

        assert!(matches!(result, Err(GatewayError::InvalidInput(_))));
        assert_eq!(*call_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retry_if_retries_server_errors() {
        let policy = RetryPolicy::immediate(2);
        let call_count = Arc::new(Mutex::new(0));

        let count_clone = Arc::clone(&call_count);
        let result = retry_with_backoff_if(&policy, is_retryable, || {
            let count = Arc::clone(&count_clone);
            async move {
                *count.lock().unwrap() += 1;
                Err::<i32, GatewayError>(GatewayError::ServerError {
                    status: 503,
                    body: b"busy".to_vec(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(GatewayError::ServerError { status: 503, .. })));
        assert_eq!(*call_count.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retry_with_backoff_timing() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        };

        let start = std::time::Instant::now();
        let _result = retry_with_backoff(&policy, || async {
            Err::<i32, GatewayError>(GatewayError::Transport("error".to_owned()))
        })
        .await;

        // 10ms + 20ms
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_is_retryable_statuses() {
        assert!(is_retryable(&GatewayError::ServerError { status: 429, body: vec![] }));
        assert!(is_retryable(&GatewayError::ServerError { status: 500, body: vec![] }));
        assert!(!is_retryable(&GatewayError::ServerError { status: 404, body: vec![] }));
        assert!(!is_retryable(&GatewayError::ConfigError("x".to_owned())));
        assert!(!is_retryable(&GatewayError::Transport("x".to_owned())));
    }
}
