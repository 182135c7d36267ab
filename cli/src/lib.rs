//! `vigil` command-line host.
//!
//! ## Commands
//!
//! - `vigil run` - monitor until Ctrl-C
//! - `vigil classify [FILE]` - classify a saved response
//! - `vigil levels [--score N]` - show the escalation table
//! - `vigil settings ...` - inspect or edit the persisted settings
//!
//! ## Exit Codes
//!
//! - 0: Success
//! - 1: Runtime failure
//! - 2: Configuration error (bad config, missing key or rules)

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vigil_core::config::{SettingsError, SettingsStore};

mod classify_cmd;
mod levels_cmd;
mod run_cmd;
mod settings_cmd;

pub use classify_cmd::ClassifyArgs;
pub use levels_cmd::LevelsArgs;
pub use run_cmd::{RunArgs, render_event};
pub use settings_cmd::{SettingsCli, SettingsSubcommand};

/// Exit codes for all commands
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

/// Vigil - screen-monitoring self-enforcement
#[derive(Debug, Parser)]
#[command(name = "vigil", version)]
pub struct Cli {
    /// Configuration file (default: ./vigil.toml, then <config dir>/vigil/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Settings file (default: <config dir>/vigil/settings.toml)
    #[arg(long = "settings-file", global = true, value_name = "PATH")]
    pub settings_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Monitor the screen until interrupted
    Run(RunArgs),

    /// Classify a saved analysis response (file or stdin) and print JSON
    Classify(ClassifyArgs),

    /// Print the escalation table, or the level for one score
    Levels(LevelsArgs),

    /// Show or edit the persisted API key and rules
    Settings(SettingsCli),
}

impl Cli {
    pub async fn run(self) -> i32 {
        match self.command {
            Command::Run(args) => match settings_store(self.settings_file) {
                Ok(store) => run_cmd::run_monitor(args, self.config, store).await,
                Err(err) => config_error(err),
            },
            Command::Classify(args) => classify_cmd::run_classify(args).await,
            Command::Levels(args) => levels_cmd::run_levels(args),
            Command::Settings(cli) => match settings_store(self.settings_file) {
                Ok(store) => cli.run(&store).await,
                Err(err) => config_error(err),
            },
        }
    }

    /// Only `run` is chatty by default; the one-shot commands keep stderr
    /// quiet unless `RUST_LOG` says otherwise.
    pub fn default_log_filter(&self) -> &'static str {
        match self.command {
            Command::Run(_) => "info",
            _ => "warn",
        }
    }
}

fn config_error(err: impl std::fmt::Display) -> i32 {
    eprintln!("Error: {err}");
    exit_codes::CONFIG_ERROR
}

fn settings_store(path: Option<PathBuf>) -> Result<SettingsStore, SettingsError> {
    match path {
        Some(path) => Ok(SettingsStore::with_path(path)),
        None => SettingsStore::new(),
    }
}

/// Read a whole file, or stdin for `None` / `-`.
pub(crate) async fn read_input(path: Option<&std::path::Path>) -> anyhow::Result<String> {
    use anyhow::Context;
    use tokio::io::AsyncReadExt;

    match path {
        Some(path) if path.as_os_str() != "-" => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}
