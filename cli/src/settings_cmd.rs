//! `vigil settings`: the persisted API key and rules.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vigil_core::config::{Settings, SettingsStore, mask_key};

use crate::exit_codes;

#[derive(Debug, Parser)]
pub struct SettingsCli {
    #[command(subcommand)]
    pub command: SettingsSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum SettingsSubcommand {
    /// Print the settings (the API key is masked)
    Show,

    /// Store the Gemini API key
    SetKey {
        /// The key; read from stdin when omitted
        key: Option<String>,
    },

    /// Store the rules the screen is judged against
    SetRules {
        /// Rules text; read from `--file` or stdin when omitted
        rules: Option<String>,

        /// Read the rules from a file (`-` for stdin)
        #[arg(long, value_name = "PATH", conflicts_with = "rules")]
        file: Option<PathBuf>,
    },

    /// Print the settings file location
    Path,
}

impl SettingsCli {
    pub async fn run(self, store: &SettingsStore) -> i32 {
        match self.command {
            SettingsSubcommand::Show => show(store),
            SettingsSubcommand::Path => {
                println!("{}", store.path().display());
                exit_codes::SUCCESS
            }
            SettingsSubcommand::SetKey { key } => {
                let key = match key {
                    Some(key) => key,
                    None => match crate::read_input(None).await {
                        Ok(text) => text,
                        Err(err) => return fail(err),
                    },
                };
                update(store, |settings| settings.api_key = key.trim().to_string())
            }
            SettingsSubcommand::SetRules { rules, file } => {
                let rules = match rules {
                    Some(rules) => rules,
                    None => match crate::read_input(file.as_deref()).await {
                        Ok(text) => text,
                        Err(err) => return fail(err),
                    },
                };
                update(store, |settings| settings.rules = rules.trim().to_string())
            }
        }
    }
}

fn show(store: &SettingsStore) -> i32 {
    let settings = match store.load() {
        Ok(settings) => settings,
        Err(err) => return fail(err.into()),
    };
    println!("file:    {}", store.path().display());
    println!("api_key: {}", mask_key(&settings.api_key));
    if settings.rules.trim().is_empty() {
        println!("rules:   (not set)");
    } else {
        println!("rules:");
        for line in settings.rules.lines() {
            println!("  {line}");
        }
    }
    exit_codes::SUCCESS
}

fn update(store: &SettingsStore, edit: impl FnOnce(&mut Settings)) -> i32 {
    let mut settings = match store.load() {
        Ok(settings) => settings,
        Err(err) => return fail(err.into()),
    };
    edit(&mut settings);
    match store.save(&settings) {
        Ok(()) => {
            println!("Saved {}", store.path().display());
            exit_codes::SUCCESS
        }
        Err(err) => fail(err.into()),
    }
}

fn fail(err: anyhow::Error) -> i32 {
    eprintln!("Error: {err:#}");
    exit_codes::FAILURE
}
