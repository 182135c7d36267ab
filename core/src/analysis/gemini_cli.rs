//! Transport over the `gemini` command-line tool.
//!
//! The prompt goes to stdin; screenshots are attached with `@<path>`
//! references so the CLI reads them itself.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::{AnalysisAdapter, AnalysisError, AnalysisRequest, build_prompt, map_model_name};
use crate::verdict::VerdictSource;

const INSTALL_HINT: &str = "npm install -g @google/gemini-cli && gemini (to authenticate)";

/// Configuration for [`GeminiCliAnalyzer`].
#[derive(Debug, Clone)]
pub struct GeminiCliConfig {
    /// Path to gemini binary (default: "gemini")
    pub binary_path: String,
    /// Extra arguments placed before the model flag.
    pub extra_args: Vec<String>,
    pub timeout: Duration,
}

impl Default for GeminiCliConfig {
    fn default() -> Self {
        Self {
            binary_path: "gemini".to_string(),
            extra_args: Vec::new(),
            timeout: Duration::from_secs(120),
        }
    }
}

pub struct GeminiCliAnalyzer {
    config: GeminiCliConfig,
}

impl GeminiCliAnalyzer {
    pub fn new(config: GeminiCliConfig) -> Self {
        Self { config }
    }

    fn build_command_args(&self, model: &str) -> Vec<String> {
        let mut args = self.config.extra_args.clone();
        args.push("--model".to_string());
        args.push(map_model_name(model).to_string());
        args
    }

    fn build_stdin(request: &AnalysisRequest<'_>) -> String {
        let mut input = build_prompt(request.rules, request.images.len());
        input.push('\n');
        for path in request.images {
            input.push('@');
            input.push_str(&path.display().to_string());
            input.push('\n');
        }
        input
    }
}

#[async_trait]
impl AnalysisAdapter for GeminiCliAnalyzer {
    fn source(&self) -> VerdictSource {
        VerdictSource::Cli
    }

    async fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<String, AnalysisError> {
        let args = self.build_command_args(request.model);
        tracing::debug!(binary = %self.config.binary_path, ?args, "executing gemini CLI");

        let mut child = Command::new(&self.config.binary_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AnalysisError::BinaryNotFound {
                        binary: self.config.binary_path.clone(),
                        install_hint: INSTALL_HINT.to_string(),
                    }
                } else {
                    AnalysisError::Internal(format!("failed to spawn gemini CLI: {e}"))
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = Self::build_stdin(request);
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| AnalysisError::Internal(format!("failed to write to stdin: {e}")))?;
            stdin
                .shutdown()
                .await
                .map_err(|e| AnalysisError::Internal(format!("failed to close stdin: {e}")))?;
        }

        let output = timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| AnalysisError::Timeout(self.config.timeout))?
            .map_err(|e| AnalysisError::Internal(format!("failed to wait for gemini CLI: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            if is_rate_limit_message(&stderr) {
                return Err(AnalysisError::RateLimited {
                    retry_hint: scrape_retry_delay(&stderr),
                    body: stderr,
                });
            }
            return Err(AnalysisError::ProcessFailed {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            return Err(AnalysisError::Parse("gemini CLI produced no output".to_string()));
        }
        Ok(stdout)
    }
}

fn is_rate_limit_message(stderr: &str) -> bool {
    stderr.contains("429")
        || stderr.contains("RESOURCE_EXHAUSTED")
        || stderr.to_ascii_lowercase().contains("exhausted")
}

/// Pull `retryDelay` (e.g. `"retryDelay": "24s"`) out of free-form stderr.
fn scrape_retry_delay(stderr: &str) -> Option<String> {
    let idx = stderr.find("retryDelay")?;
    let rest = &stderr[idx + "retryDelay".len()..];
    let start = rest.find(|c: char| c.is_ascii_digit())?;
    let rest = &rest[start..];
    let number_len = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let unit = if rest[number_len..].starts_with("ms") {
        "ms"
    } else if rest[number_len..].starts_with('s') {
        "s"
    } else {
        ""
    };
    Some(format!("{}{unit}", &rest[..number_len]))
}
