use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use super::error::{ConfigError, Result};
use crate::analysis::{DEFAULT_MODEL, GOOGLE_API_BASE, GeminiApiConfig, GeminiCliConfig};
use crate::capture::CommandCaptureConfig;
use crate::intervention::{InterventionConfig, PointerConfig};
use crate::platform::{BackendKind, BackendOptions};
use crate::retry::RetryConfig;
use crate::scheduler::SchedulerConfig;

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub intervention: InterventionSettings,
}

/// Scheduling window and failure handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Length of one capture window in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Wait after a failed cycle
    #[serde(default = "default_recovery_delay_secs")]
    pub recovery_delay_secs: u64,

    /// Consecutive rate-limit retries before a batch is discarded
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: usize,

    /// Wait used when a rate-limit response carries no usable hint
    #[serde(default = "default_rate_limit_fallback_secs")]
    pub rate_limit_fallback_secs: u64,

    /// Where screenshots are written
    #[serde(default = "default_screenshot_folder")]
    pub screenshot_folder: PathBuf,

    /// Keep screenshots after analysis instead of deleting them
    #[serde(default)]
    pub keep_screenshots: bool,
}

/// Which analysis transport to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Gemini HTTP API
    #[default]
    Api,
    /// `gemini` command-line tool
    Cli,
}

/// Analysis service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub transport: Transport,

    #[serde(default = "default_model")]
    pub model: String,

    /// Models endpoint for the HTTP transport
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_cli_binary")]
    pub cli_binary: String,

    #[serde(default)]
    pub cli_args: Vec<String>,

    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
}

/// Screenshot command settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_capture_program")]
    pub program: String,

    /// `{output}`/`{path}` and `{display}` placeholders are expanded per display
    #[serde(default = "default_capture_args")]
    pub args: Vec<String>,

    /// One selector per display, primary first; empty means a single display
    #[serde(default)]
    pub displays: Vec<String>,

    #[serde(default = "default_capture_timeout_secs")]
    pub timeout_secs: u64,
}

/// Intervention backend and timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionSettings {
    #[serde(default)]
    pub backend: BackendKind,

    /// Volume forced during an alert (0.0-1.0)
    #[serde(default = "default_alert_volume")]
    pub alert_volume: f32,

    #[serde(default = "default_alert_max_secs")]
    pub alert_max_secs: u64,

    /// Alert tone command (argv); platform default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone_command: Option<Vec<String>>,

    #[serde(default = "default_tone_repeats")]
    pub tone_repeats: u32,

    #[serde(default = "default_key_delay_ms")]
    pub key_delay_ms: u64,

    #[serde(default = "default_pointer_poll_ms")]
    pub pointer_poll_ms: u64,

    #[serde(default = "default_pointer_gain")]
    pub pointer_gain: f64,

    #[serde(default = "default_pointer_duration_secs")]
    pub pointer_duration_secs: u64,

    #[serde(default = "default_lock_grace_secs")]
    pub lock_grace_secs: u64,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_command: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_off_command: Option<Vec<String>>,
}

// Default value functions
fn default_interval_secs() -> u64 {
    60
}
fn default_recovery_delay_secs() -> u64 {
    5
}
fn default_max_rate_limit_retries() -> usize {
    3
}
fn default_rate_limit_fallback_secs() -> u64 {
    30
}
fn default_screenshot_folder() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Screenshots")
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_endpoint() -> String {
    GOOGLE_API_BASE.to_string()
}
fn default_cli_binary() -> String {
    "gemini".to_string()
}
fn default_analysis_timeout_secs() -> u64 {
    120
}
fn default_capture_program() -> String {
    if cfg!(target_os = "macos") {
        "screencapture".to_string()
    } else if cfg!(windows) {
        "nircmd".to_string()
    } else {
        "grim".to_string()
    }
}
fn default_capture_args() -> Vec<String> {
    let args: &[&str] = if cfg!(target_os = "macos") {
        &["-x", "{output}"]
    } else if cfg!(windows) {
        &["savescreenshot", "{output}"]
    } else {
        &["{output}"]
    };
    args.iter().map(|arg| (*arg).to_string()).collect()
}
fn default_capture_timeout_secs() -> u64 {
    30
}
fn default_alert_volume() -> f32 {
    1.0
}
fn default_alert_max_secs() -> u64 {
    30
}
fn default_tone_repeats() -> u32 {
    3
}
fn default_key_delay_ms() -> u64 {
    1000
}
fn default_pointer_poll_ms() -> u64 {
    2
}
fn default_pointer_gain() -> f64 {
    1.5
}
fn default_pointer_duration_secs() -> u64 {
    30
}
fn default_lock_grace_secs() -> u64 {
    3
}
fn default_shutdown_grace_secs() -> u64 {
    5
}

// Default implementations
impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            recovery_delay_secs: default_recovery_delay_secs(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            rate_limit_fallback_secs: default_rate_limit_fallback_secs(),
            screenshot_folder: default_screenshot_folder(),
            keep_screenshots: false,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            model: default_model(),
            endpoint: default_endpoint(),
            cli_binary: default_cli_binary(),
            cli_args: Vec::new(),
            timeout_secs: default_analysis_timeout_secs(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            program: default_capture_program(),
            args: default_capture_args(),
            displays: Vec::new(),
            timeout_secs: default_capture_timeout_secs(),
        }
    }
}

impl Default for InterventionSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            alert_volume: default_alert_volume(),
            alert_max_secs: default_alert_max_secs(),
            tone_command: None,
            tone_repeats: default_tone_repeats(),
            key_delay_ms: default_key_delay_ms(),
            pointer_poll_ms: default_pointer_poll_ms(),
            pointer_gain: default_pointer_gain(),
            pointer_duration_secs: default_pointer_duration_secs(),
            lock_grace_secs: default_lock_grace_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            lock_command: None,
            power_off_command: None,
        }
    }
}

impl AppConfig {
    /// Reject values that would make the loop or the effects misbehave.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.monitor.interval_secs == 0 {
            return invalid("monitor.interval_secs must be a positive integer");
        }
        if self.analysis.model.trim().is_empty() {
            return invalid("analysis.model must not be empty");
        }
        if self.analysis.timeout_secs == 0 {
            return invalid("analysis.timeout_secs must be positive");
        }
        if self.analysis.transport == Transport::Cli && self.analysis.cli_binary.trim().is_empty() {
            return invalid("analysis.cli_binary must not be empty");
        }
        if self.capture.program.trim().is_empty() {
            return invalid("capture.program must not be empty");
        }
        if !self
            .capture
            .args
            .iter()
            .any(|arg| arg.contains("{output}") || arg.contains("{path}"))
        {
            return invalid("capture.args must contain an {output} placeholder");
        }
        if !(0.0..=1.0).contains(&self.intervention.alert_volume) {
            return invalid("intervention.alert_volume must be between 0.0 and 1.0");
        }
        if self.intervention.pointer_poll_ms == 0 {
            return invalid("intervention.pointer_poll_ms must be positive");
        }
        if !(self.intervention.pointer_gain.is_finite() && self.intervention.pointer_gain > 0.0) {
            return invalid("intervention.pointer_gain must be a positive number");
        }
        Ok(())
    }

    pub fn scheduler_config(&self, rules: &str) -> SchedulerConfig {
        SchedulerConfig {
            window: Duration::from_secs(self.monitor.interval_secs),
            recovery_delay: Duration::from_secs(self.monitor.recovery_delay_secs),
            screenshot_folder: self.monitor.screenshot_folder.clone(),
            rules: rules.to_string(),
            model: self.analysis.model.clone(),
            retry: self.retry_config(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_rate_limit_retries: self.monitor.max_rate_limit_retries,
            fallback_wait: Duration::from_secs(self.monitor.rate_limit_fallback_secs),
            ..RetryConfig::default()
        }
    }

    pub fn capture_config(&self) -> CommandCaptureConfig {
        CommandCaptureConfig {
            program: self.capture.program.clone(),
            args: self.capture.args.clone(),
            displays: self.capture.displays.clone(),
            keep_screenshots: self.monitor.keep_screenshots,
            timeout: Duration::from_secs(self.capture.timeout_secs),
        }
    }

    pub fn api_config(&self, api_key: &str) -> GeminiApiConfig {
        GeminiApiConfig {
            api_key: api_key.to_string(),
            base_url: self.analysis.endpoint.clone(),
            timeout: Duration::from_secs(self.analysis.timeout_secs),
        }
    }

    pub fn cli_config(&self) -> GeminiCliConfig {
        GeminiCliConfig {
            binary_path: self.analysis.cli_binary.clone(),
            extra_args: self.analysis.cli_args.clone(),
            timeout: Duration::from_secs(self.analysis.timeout_secs),
        }
    }

    pub fn intervention_config(&self) -> InterventionConfig {
        let settings = &self.intervention;
        InterventionConfig {
            alert_volume: settings.alert_volume,
            alert_max_duration: Duration::from_secs(settings.alert_max_secs),
            lock_grace: Duration::from_secs(settings.lock_grace_secs),
            shutdown_grace: Duration::from_secs(settings.shutdown_grace_secs),
        }
    }

    pub fn backend_options(&self) -> BackendOptions {
        let settings = &self.intervention;
        BackendOptions {
            key_delay: Duration::from_millis(settings.key_delay_ms),
            pointer: PointerConfig {
                poll_interval: Duration::from_millis(settings.pointer_poll_ms),
                gain: settings.pointer_gain,
                duration: Duration::from_secs(settings.pointer_duration_secs),
            },
            tone_command: settings.tone_command.clone(),
            tone_repeats: settings.tone_repeats,
            lock_command: settings.lock_command.clone(),
            power_off_command: settings.power_off_command.clone(),
        }
    }
}

/// Configuration loader with layered merging support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration with layered merging:
    /// 1. Start with defaults (from Default implementations)
    /// 2. Merge config file if provided
    /// 3. Override with environment variables (VIGIL_ prefix)
    pub fn load(&self) -> Result<AppConfig> {
        let mut builder = Config::builder();

        let defaults_json = serde_json::to_string(&AppConfig::default())?;
        builder = builder.add_source(File::from_str(&defaults_json, config::FileFormat::Json));

        if let Some(ref path) = self.config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            builder = builder.add_source(File::from(path.as_ref()));
        }

        // Example: VIGIL_MONITOR__INTERVAL_SECS=30
        builder = builder.add_source(
            Environment::with_prefix("VIGIL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("capture.args")
                .with_list_parse_key("capture.displays")
                .with_list_parse_key("analysis.cli_args"),
        );

        let app_config: AppConfig = builder.build()?.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Locate the default config file in standard locations:
    /// 1. Current directory: ./vigil.toml
    /// 2. XDG config: ~/.config/vigil/config.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./vigil.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("vigil").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        None
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<AppConfig> {
        match Self::find_config_file() {
            Some(config_path) => ConfigLoader::new().with_file(config_path).load(),
            None => ConfigLoader::new().load(),
        }
    }
}
