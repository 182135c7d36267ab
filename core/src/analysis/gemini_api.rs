//! Gemini `generateContent` client.
//!
//! One non-streaming request per batch: the prompt text followed by every
//! screenshot as inline base64 PNG data.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{AnalysisAdapter, AnalysisError, AnalysisRequest, build_prompt, map_model_name};
use crate::verdict::VerdictSource;

/// Google Generative AI API base URL.
pub const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Configuration for [`GeminiApiClient`].
#[derive(Debug, Clone)]
pub struct GeminiApiConfig {
    pub api_key: String,
    /// Models endpoint; overridable for proxies and tests.
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: GOOGLE_API_BASE.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Google error wrapper.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Transport over the Gemini HTTP API.
pub struct GeminiApiClient {
    client: reqwest::Client,
    config: GeminiApiConfig,
}

impl GeminiApiClient {
    pub fn new(config: GeminiApiConfig) -> Result<Self, AnalysisError> {
        if config.api_key.trim().is_empty() {
            return Err(AnalysisError::NotConfigured(
                "Gemini API key is not set".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Creates a client with a custom HTTP client.
    pub fn with_client(client: reqwest::Client, config: GeminiApiConfig) -> Self {
        Self { client, config }
    }

    async fn build_request_body(&self, request: &AnalysisRequest<'_>) -> Result<Value, AnalysisError> {
        let mut parts = vec![json!({ "text": build_prompt(request.rules, request.images.len()) })];
        for path in request.images {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| AnalysisError::ImageRead {
                    path: path.clone(),
                    source,
                })?;
            parts.push(json!({
                "inline_data": {
                    "mime_type": "image/png",
                    "data": BASE64.encode(bytes),
                }
            }));
        }
        Ok(json!({ "contents": [{ "parts": parts }] }))
    }

    fn headers(&self) -> Result<HeaderMap, AnalysisError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(self.config.api_key.trim())
            .map_err(|_| AnalysisError::NotConfigured("API key contains invalid characters".to_string()))?;
        headers.insert(API_KEY_HEADER, key);
        Ok(headers)
    }
}

#[async_trait]
impl AnalysisAdapter for GeminiApiClient {
    fn source(&self) -> VerdictSource {
        VerdictSource::Api
    }

    async fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<String, AnalysisError> {
        let body = self.build_request_body(request).await?;
        let url = format!(
            "{}/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            map_model_name(request.model)
        );
        tracing::debug!(%url, images = request.images.len(), "sending generateContent request");

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AnalysisError::Timeout(self.config.timeout)
                } else {
                    AnalysisError::Network(err)
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let text = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_hint = extract_retry_delay(&text).or(retry_after);
            return Err(AnalysisError::RateLimited {
                retry_hint,
                body: text,
            });
        }
        if !status.is_success() {
            let body = match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(parsed) if !parsed.error.message.is_empty() => parsed.error.message,
                _ => text,
            };
            return Err(AnalysisError::Status {
                code: status.as_u16(),
                body,
            });
        }

        parse_response_text(&text)
    }
}

/// Concatenated text of the first candidate.
fn parse_response_text(body: &str) -> Result<String, AnalysisError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|err| AnalysisError::Parse(format!("invalid generateContent JSON: {err}")))?;

    if let Some(reason) = parsed
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return Err(AnalysisError::Parse(format!("prompt blocked: {reason}")));
    }

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AnalysisError::Parse("response contained no text".to_string()));
    }
    Ok(text)
}

/// `retryDelay` from a 429 body, searched anywhere under `error.details`.
pub(crate) fn extract_retry_delay(body: &str) -> Option<String> {
    let parsed: ErrorResponse = serde_json::from_str(body).ok()?;
    parsed.error.details.iter().find_map(find_retry_delay)
}

fn find_retry_delay(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => map
            .get("retryDelay")
            .and_then(|delay| match delay {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .or_else(|| map.values().find_map(find_retry_delay)),
        Value::Array(items) => items.iter().find_map(find_retry_delay),
        _ => None,
    }
}
