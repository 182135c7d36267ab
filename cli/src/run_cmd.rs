//! `vigil run`: the monitoring loop host.

use anyhow::{Context, bail};
use clap::Parser;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use vigil_core::analysis::{AnalysisAdapter, GeminiApiClient, GeminiCliAnalyzer};
use vigil_core::capture::CommandCapture;
use vigil_core::config::{AppConfig, ConfigLoader, Settings, SettingsStore, Transport};
use vigil_core::platform::{BackendKind, build_backend};
use vigil_core::{EventSink, InterventionController, MonitorEvent, Scheduler, StopReason, VigilError};

use crate::exit_codes;

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Log interventions instead of performing them
    #[arg(long)]
    pub dry_run: bool,

    /// Window length in seconds (one capture per window)
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Model name or preset (`flash`, `pro`, `gemini-2.5-flash-lite`, ...)
    #[arg(long)]
    pub model: Option<String>,

    /// Use the `gemini` command-line tool instead of the HTTP API
    #[arg(long)]
    pub cli: bool,

    /// Keep screenshots after analysis
    #[arg(long)]
    pub keep_screenshots: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(interval) = self.interval {
            config.monitor.interval_secs = interval;
        }
        if let Some(model) = &self.model {
            config.analysis.model = model.clone();
        }
        if self.cli {
            config.analysis.transport = Transport::Cli;
        }
        if self.keep_screenshots {
            config.monitor.keep_screenshots = true;
        }
        if self.dry_run {
            config.intervention.backend = BackendKind::DryRun;
        }
    }
}

pub(crate) async fn run_monitor(
    args: RunArgs,
    config_path: Option<std::path::PathBuf>,
    store: SettingsStore,
) -> i32 {
    let (config, settings) = match prepare(&args, config_path, &store) {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return exit_codes::CONFIG_ERROR;
        }
    };

    let code = match monitor(&config, &settings).await {
        Ok(StopReason::Cancelled | StopReason::PoweredOff) => exit_codes::SUCCESS,
        Err(VigilError::InvalidInput(message)) => {
            eprintln!("Error: {message}");
            exit_codes::CONFIG_ERROR
        }
        Err(err) => {
            eprintln!("Error: {err}");
            exit_codes::FAILURE
        }
    };

    if let Err(err) = store.save(&settings) {
        tracing::warn!(error = %err, "failed to save settings");
    }
    code
}

fn prepare(
    args: &RunArgs,
    config_path: Option<std::path::PathBuf>,
    store: &SettingsStore,
) -> anyhow::Result<(AppConfig, Settings)> {
    let mut config = match config_path {
        Some(path) => ConfigLoader::new().with_file(path).load(),
        None => ConfigLoader::load_default(),
    }
    .context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("invalid command-line override")?;

    let settings = store.load().context("failed to load settings")?;
    if settings.rules.trim().is_empty() {
        bail!(
            "no rules set; run `vigil settings set-rules \"...\"` first ({})",
            store.path().display()
        );
    }
    if config.analysis.transport == Transport::Api && settings.api_key.trim().is_empty() {
        bail!("no Gemini API key set; run `vigil settings set-key` or pass --cli");
    }
    Ok((config, settings))
}

async fn monitor(config: &AppConfig, settings: &Settings) -> Result<StopReason, VigilError> {
    let events = EventSink::new();
    let printer = tokio::spawn(print_events(events.subscribe()));

    let analysis: Box<dyn AnalysisAdapter> = match config.analysis.transport {
        Transport::Api => Box::new(GeminiApiClient::new(config.api_config(&settings.api_key))?),
        Transport::Cli => Box::new(GeminiCliAnalyzer::new(config.cli_config())),
    };
    let capture = Box::new(CommandCapture::new(config.capture_config()));
    let backend = build_backend(config.intervention.backend, &config.backend_options());
    let mut controller =
        InterventionController::new(backend, config.intervention_config(), events.clone());
    let mut scheduler = Scheduler::new(
        capture,
        analysis,
        config.scheduler_config(&settings.rules),
        events,
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, stopping");
                ctrl_c.cancel();
            }
            Err(err) => tracing::warn!(error = %err, "cannot listen for Ctrl-C"),
        }
    });

    let result = scheduler.run(&mut controller, &cancel).await;

    // The printer ends once every sender is gone.
    drop(scheduler);
    drop(controller);
    if let Err(err) = printer.await {
        tracing::warn!(error = %err, "event printer failed");
    }
    result
}

async fn print_events(mut rx: broadcast::Receiver<MonitorEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(text) = render_event(&event) {
                    println!("{text}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Console form of an event. Log lines are left to the tracing subscriber.
pub fn render_event(event: &MonitorEvent) -> Option<String> {
    match event {
        MonitorEvent::Log(_) => None,
        MonitorEvent::Notification { title, message } => Some(format!("[!] {title}: {message}")),
        MonitorEvent::Verdict(verdict) => {
            let label = if verdict.is_violation {
                "VIOLATION"
            } else {
                "ok"
            };
            Some(format!(
                "--- verdict ({}): {label} ---\n{}",
                verdict.source, verdict.display_text
            ))
        }
        MonitorEvent::Score { score, level } => Some(format!("score {score} ({level})")),
    }
}
