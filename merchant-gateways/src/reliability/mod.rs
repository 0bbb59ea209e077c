//! Retry with exponential backoff for idempotent gateway calls.

mod retry;

pub use retry::{RetryConfig, RetryPolicy, is_retryable, retry_with_backoff, retry_with_backoff_if};
