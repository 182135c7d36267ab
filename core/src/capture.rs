//! Screen capture.
//!
//! A capture produces one PNG per configured display, named
//! `Screenshot_{yyyyMMdd_HHmmss}_{Main|MonitorN}.png`. The batch owns those
//! files and deletes them when dropped unless screenshots are kept.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("cannot prepare screenshot folder {path}: {source}")]
    Folder {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to start capture program {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("capture program {program} exited with code {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("capture program did not write {0}")]
    MissingOutput(PathBuf),

    #[error("capture of {display} timed out after {elapsed:?}")]
    Timeout { display: String, elapsed: Duration },
}

/// Images produced by one tick, in display order.
#[derive(Debug)]
pub struct CaptureBatch {
    images: Vec<PathBuf>,
    keep: bool,
}

impl CaptureBatch {
    pub fn new(images: Vec<PathBuf>, keep: bool) -> Self {
        Self { images, keep }
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl Drop for CaptureBatch {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        for path in &self.images {
            if let Err(err) = std::fs::remove_file(path)
                && err.kind() != std::io::ErrorKind::NotFound
            {
                tracing::debug!(path = %path.display(), error = %err, "failed to delete screenshot");
            }
        }
    }
}

#[async_trait]
pub trait CaptureAdapter: Send + Sync {
    /// Labels of the displays that will be captured, e.g. `["Main", "Monitor2"]`.
    fn display_labels(&self) -> Vec<String>;

    /// Capture every display into `folder`.
    async fn capture_all(&self, folder: &Path) -> Result<CaptureBatch, CaptureError>;
}

/// `Main` for the primary display, `Monitor{n}` (1-based) for the rest.
pub fn display_label(index: usize) -> String {
    if index == 0 {
        "Main".to_string()
    } else {
        format!("Monitor{}", index + 1)
    }
}

pub fn screenshot_file_name(taken_at: &DateTime<Local>, index: usize) -> String {
    format!(
        "Screenshot_{}_{}.png",
        taken_at.format("%Y%m%d_%H%M%S"),
        display_label(index)
    )
}

/// Create the output folder if needed.
pub fn ensure_folder(folder: &Path) -> Result<(), CaptureError> {
    std::fs::create_dir_all(folder).map_err(|source| CaptureError::Folder {
        path: folder.to_path_buf(),
        source,
    })
}

/// Settings for [`CommandCapture`].
#[derive(Debug, Clone)]
pub struct CommandCaptureConfig {
    pub program: String,
    /// `{output}` / `{path}` expand to the target file, `{display}` to the
    /// display selector. An argument that is exactly `{display}` is dropped
    /// when the selector is empty.
    pub args: Vec<String>,
    /// One selector per display; the first is the primary display.
    pub displays: Vec<String>,
    pub keep_screenshots: bool,
    pub timeout: Duration,
}

/// Capture by running an external screenshot tool once per display.
pub struct CommandCapture {
    config: CommandCaptureConfig,
}

impl CommandCapture {
    pub fn new(mut config: CommandCaptureConfig) -> Self {
        if config.displays.is_empty() {
            config.displays.push(String::new());
        }
        Self { config }
    }

    fn expand_args(&self, output: &Path, display: &str) -> Vec<String> {
        let output = output.display().to_string();
        self.config
            .args
            .iter()
            .filter(|arg| !(display.is_empty() && arg.as_str() == "{display}"))
            .map(|arg| {
                arg.replace("{output}", &output)
                    .replace("{path}", &output)
                    .replace("{display}", display)
            })
            .collect()
    }

    async fn capture_one(&self, output: &Path, index: usize, selector: &str) -> Result<(), CaptureError> {
        let program = &self.config.program;
        let args = self.expand_args(output, selector);
        tracing::debug!(%program, ?args, display = %display_label(index), "capturing display");

        let run = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let output_result = timeout(self.config.timeout, run)
            .await
            .map_err(|_| CaptureError::Timeout {
                display: display_label(index),
                elapsed: self.config.timeout,
            })?
            .map_err(|source| CaptureError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output_result.status.success() {
            return Err(CaptureError::CommandFailed {
                program: program.clone(),
                code: output_result.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output_result.stderr).trim().to_string(),
            });
        }
        if !output.exists() {
            return Err(CaptureError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }
}

#[async_trait]
impl CaptureAdapter for CommandCapture {
    fn display_labels(&self) -> Vec<String> {
        (0..self.config.displays.len()).map(display_label).collect()
    }

    async fn capture_all(&self, folder: &Path) -> Result<CaptureBatch, CaptureError> {
        ensure_folder(folder)?;
        let taken_at = Local::now();
        // Each target path is owned by the batch before the tool runs, so a
        // tool that writes the file and then fails still gets cleaned up.
        let mut batch = CaptureBatch::new(Vec::new(), self.config.keep_screenshots);
        for (index, selector) in self.config.displays.iter().enumerate() {
            let path = folder.join(screenshot_file_name(&taken_at, index));
            batch.images.push(path.clone());
            self.capture_one(&path, index, selector).await?;
        }
        Ok(batch)
    }
}
