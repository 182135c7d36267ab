//! Concrete implementations of the intervention capabilities.

pub mod command;
pub mod dry_run;
mod unsupported;
#[cfg(windows)]
pub mod win32;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::intervention::{Backend, DEFAULT_KEY_DELAY, PointerConfig};

/// Which backend drives the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Native backend where one exists, otherwise [`BackendKind::Command`].
    #[default]
    Auto,
    /// System commands only.
    Command,
    /// Log actions without performing them.
    DryRun,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Command => f.write_str("command"),
            Self::DryRun => f.write_str("dry-run"),
        }
    }
}

/// Backend construction parameters.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub key_delay: Duration,
    pub pointer: PointerConfig,
    /// Overrides the platform tone command (argv form).
    pub tone_command: Option<Vec<String>>,
    pub tone_repeats: u32,
    pub lock_command: Option<Vec<String>>,
    pub power_off_command: Option<Vec<String>>,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            key_delay: DEFAULT_KEY_DELAY,
            pointer: PointerConfig::default(),
            tone_command: None,
            tone_repeats: 3,
            lock_command: None,
            power_off_command: None,
        }
    }
}

pub fn build_backend(kind: BackendKind, options: &BackendOptions) -> Backend {
    match kind {
        BackendKind::DryRun => dry_run::backend(options),
        BackendKind::Command => command::backend(options),
        BackendKind::Auto => native_backend(options),
    }
}

#[cfg(windows)]
fn native_backend(options: &BackendOptions) -> Backend {
    win32::backend(options)
}

#[cfg(not(windows))]
fn native_backend(options: &BackendOptions) -> Backend {
    command::backend(options)
}
