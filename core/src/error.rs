use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::capture::CaptureError;
use crate::config::{ConfigError, SettingsError};
use crate::retry::{ErrorClass, RetryClassifiable, RetryError};

pub type Result<T> = std::result::Result<T, VigilError>;

/// Failures surfaced by a monitoring cycle or at start-up.
#[derive(Debug, Error)]
pub enum VigilError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("still rate limited after {retries} retries: {last_error}")]
    RateLimitExhausted {
        retries: usize,
        last_error: AnalysisError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// User input that prevents monitoring from starting.
    #[error("{0}")]
    InvalidInput(String),

    #[error("cancelled")]
    Cancelled,
}

impl VigilError {
    /// Pipeline stage the error came from, for log lines.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Capture(_) => "capture",
            Self::Analysis(_) | Self::RateLimitExhausted { .. } => "analysis",
            Self::Config(_) | Self::Settings(_) | Self::InvalidInput(_) => "startup",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the next cycle will fail the same way unless the
    /// configuration changes (bad key, missing binary, rejected request).
    pub fn is_persistent(&self) -> bool {
        match self {
            Self::Analysis(err) => err.classify() == ErrorClass::Permanent,
            _ => false,
        }
    }
}

impl From<RetryError<AnalysisError>> for VigilError {
    fn from(err: RetryError<AnalysisError>) -> Self {
        match err {
            RetryError::Failed(err) => Self::Analysis(err),
            RetryError::Exhausted {
                retries,
                last_error,
            } => Self::RateLimitExhausted {
                retries,
                last_error,
            },
            RetryError::Aborted => Self::Cancelled,
        }
    }
}
