//! Resilience
//!
//! Retry with exponential backoff for token exchanges.

pub mod retry;

pub use retry::{RetryConfig, RetryExecutor, RetryStats, DEFAULT_RETRY_CONFIG};
