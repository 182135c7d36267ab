//! Rate-limit retry strategy.
//!
//! Waits are driven by the service's hint rather than by exponential
//! backoff: `ceil(hint) + safety_margin`, or `fallback_wait` when the hint
//! is missing or unreadable.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vigil_async_utils::sleep_or_cancel;

use super::RetryError;
use super::classifier::{ErrorClass, RetryClassifiable};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Consecutive rate-limit retries before the batch is abandoned.
    pub max_rate_limit_retries: usize,
    /// Added to the rounded-up hint.
    pub safety_margin: Duration,
    /// Used when the service gave no usable hint.
    pub fallback_wait: Duration,
    /// Upper bound on any single wait.
    pub max_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 3,
            safety_margin: Duration::from_secs(1),
            fallback_wait: Duration::from_secs(30),
            max_wait: Duration::from_secs(600),
        }
    }
}

/// Retry status for progress callbacks.
#[derive(Debug, Clone)]
pub struct RetryStatus {
    /// Retry number about to be attempted (1-indexed).
    pub retry: usize,
    /// How long we sleep before that retry.
    pub wait: Duration,
    /// Hint text as returned by the service.
    pub retry_hint: Option<String>,
    /// Human-readable reason for the wait.
    pub reason: String,
}

/// Parse a retry hint into seconds.
///
/// Accepts `"24s"`, `"24.504554452s"`, `"1500ms"` and bare numbers
/// (seconds), with surrounding whitespace or quotes.
pub fn parse_retry_hint(hint: &str) -> Option<f64> {
    let text = hint.trim().trim_matches('"').trim();
    let (number, scale) = if let Some(n) = text.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = text.strip_suffix('s') {
        (n, 1.0)
    } else {
        (text, 1.0)
    };
    let value: f64 = number.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value * scale)
}

/// Wait before retrying a rate-limited request.
pub fn rate_limit_wait(hint: Option<&str>, config: &RetryConfig) -> Duration {
    let wait = match hint.and_then(parse_retry_hint) {
        Some(seconds) => {
            let whole = Duration::from_secs(seconds.ceil().min(config.max_wait.as_secs_f64()) as u64);
            whole.saturating_add(config.safety_margin)
        }
        None => config.fallback_wait,
    };
    wait.min(config.max_wait)
}

/// Run `operation`, retrying only rate-limited failures.
///
/// Each retry re-invokes `operation`, which is expected to resend the same
/// payload. Cancellation is honoured both while the operation is running
/// and during the wait.
pub async fn execute_with_rate_limit_retry<F, Fut, T, E, StatusCb>(
    mut operation: F,
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut status_cb: StatusCb,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + RetryClassifiable + 'static,
    StatusCb: FnMut(RetryStatus),
{
    let mut retries = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Aborted);
        }

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Aborted),
            out = operation() => out,
        };

        let err = match output {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let ErrorClass::RateLimited { retry_hint } = err.classify() else {
            return Err(RetryError::Failed(err));
        };

        if retries >= config.max_rate_limit_retries {
            return Err(RetryError::Exhausted {
                retries,
                last_error: err,
            });
        }
        retries += 1;

        let wait = rate_limit_wait(retry_hint.as_deref(), config);
        let reason = match &retry_hint {
            Some(hint) => format!("rate limited (hint {hint}), retrying in {}s", wait.as_secs()),
            None => format!("rate limited, retrying in {}s", wait.as_secs()),
        };
        status_cb(RetryStatus {
            retry: retries,
            wait,
            retry_hint,
            reason,
        });

        if sleep_or_cancel(cancel, wait).await.is_err() {
            return Err(RetryError::Aborted);
        }
    }
}
