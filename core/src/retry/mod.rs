//! Retry handling for analysis calls.
//!
//! Only rate-limit responses are retried here, and always with the same
//! capture batch: the service tells us how long to wait, we wait that long
//! (rounded up, plus a safety margin) and try again, a bounded number of
//! times. Every other failure is handed back to the scheduler, which abandons
//! the cycle.

pub mod classifier;
pub mod strategy;

pub use classifier::{ErrorClass, RetryClassifiable};
pub use strategy::{
    RetryConfig, RetryStatus, execute_with_rate_limit_retry, parse_retry_hint, rate_limit_wait,
};

/// Retry outcome for an operation failing with `E`.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// Non-retryable failure, surfaced on the first occurrence.
    #[error(transparent)]
    Failed(E),

    /// Still rate limited after the allowed number of retries.
    #[error("rate limited after {retries} retries: {last_error}")]
    Exhausted { retries: usize, last_error: E },

    /// External cancellation requested.
    #[error("retry aborted by cancellation")]
    Aborted,
}
