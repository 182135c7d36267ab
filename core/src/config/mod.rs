//! Runtime configuration and persisted user settings.

mod error;
mod loader;
mod settings;

pub use error::{ConfigError, Result, SettingsError};
pub use loader::{
    AnalysisConfig, AppConfig, CaptureConfig, ConfigLoader, InterventionSettings, MonitorConfig, Transport,
};
pub use settings::{Settings, SettingsStore, mask_key};
