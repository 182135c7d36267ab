//! Analysis adapters: send screenshots plus rules to a visual-reasoning
//! service and return its raw verdict text.
//!
//! Two transports are provided:
//! - [`GeminiApiClient`]: the Gemini `generateContent` HTTP endpoint
//! - [`GeminiCliAnalyzer`]: the `gemini` command-line tool

mod gemini_api;
mod gemini_cli;
mod prompt;

pub use gemini_api::{GOOGLE_API_BASE, GeminiApiClient, GeminiApiConfig};
pub use gemini_cli::{GeminiCliAnalyzer, GeminiCliConfig};
pub use prompt::build_prompt;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::retry::{ErrorClass, RetryClassifiable};
use crate::verdict::VerdictSource;

/// Default model when the user picked none.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// One analysis request. Images are PNG files from a capture batch.
#[derive(Debug, Clone)]
pub struct AnalysisRequest<'a> {
    pub rules: &'a str,
    pub model: &'a str,
    pub images: &'a [PathBuf],
}

/// Errors from analysis transports.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The service asked us to slow down (HTTP 429 / RESOURCE_EXHAUSTED).
    #[error("rate limited by service (retry hint: {})", retry_hint.as_deref().unwrap_or("none"))]
    RateLimited {
        retry_hint: Option<String>,
        body: String,
    },

    /// Non-success status other than rate limiting.
    #[error("service returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("CLI binary not found: {binary}. Install via: {install_hint}")]
    BinaryNotFound {
        binary: String,
        install_hint: String,
    },

    #[error("CLI process failed with code {code}: {stderr}")]
    ProcessFailed { code: i32, stderr: String },

    #[error("analysis not configured: {0}")]
    NotConfigured(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RetryClassifiable for AnalysisError {
    fn classify(&self) -> ErrorClass {
        match self {
            AnalysisError::RateLimited { retry_hint, .. } => ErrorClass::RateLimited {
                retry_hint: retry_hint.clone(),
            },
            AnalysisError::Status { code, .. } if *code >= 500 => ErrorClass::Transient,
            AnalysisError::Network(_)
            | AnalysisError::Timeout(_)
            | AnalysisError::ProcessFailed { .. }
            | AnalysisError::Parse(_) => ErrorClass::Transient,
            AnalysisError::Status { .. }
            | AnalysisError::ImageRead { .. }
            | AnalysisError::BinaryNotFound { .. }
            | AnalysisError::NotConfigured(_)
            | AnalysisError::Internal(_) => ErrorClass::Permanent,
        }
    }
}

/// A transport to the reasoning service.
#[async_trait]
pub trait AnalysisAdapter: Send + Sync {
    /// Which transport this is, recorded on every verdict.
    fn source(&self) -> VerdictSource;

    /// Submit the rules and images; returns the service's raw text.
    async fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<String, AnalysisError>;
}

/// Map loose model names ("flash", "2.5-pro") to Gemini model ids.
pub fn map_model_name(preset: &str) -> &str {
    let preset_lower = preset.to_ascii_lowercase();

    if preset_lower.contains("2.5-pro") {
        "gemini-2.5-pro"
    } else if preset_lower.contains("2.5-flash-lite") {
        "gemini-2.5-flash-lite"
    } else if preset_lower.contains("2.5-flash") || preset_lower == "flash" {
        "gemini-2.5-flash"
    } else if preset_lower.contains("2.0-flash") {
        "gemini-2.0-flash"
    } else if preset_lower == "pro" {
        "gemini-2.5-pro"
    } else {
        preset
    }
}
