//! Error classification for retry decisions.

/// Top-level error classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// The service asked us to slow down; `retry_hint` is its suggested
    /// delay as text (e.g. `"24s"`), when it gave one.
    RateLimited { retry_hint: Option<String> },

    /// Failure that may not recur next cycle (network, timeouts, 5xx).
    Transient,

    /// Failure that will recur until configuration changes (bad key,
    /// missing binary, malformed request).
    Permanent,
}

/// Trait for error classification.
pub trait RetryClassifiable {
    fn classify(&self) -> ErrorClass;

    fn is_rate_limited(&self) -> bool {
        matches!(self.classify(), ErrorClass::RateLimited { .. })
    }
}
