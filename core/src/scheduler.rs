//! The capture/analysis control loop.
//!
//! Each window of `window` length holds exactly one capture at a random
//! offset, so the user cannot predict when the screen is sampled. Cycles
//! never overlap: the loop awaits every stage before starting the next
//! window.

use std::path::PathBuf;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use vigil_async_utils::{OrCancelExt, sleep_or_cancel};

use crate::analysis::{AnalysisAdapter, AnalysisRequest};
use crate::capture::{CaptureAdapter, ensure_folder};
use crate::error::{Result, VigilError};
use crate::events::EventSink;
use crate::intervention::{InterventionController, LevelOutcome};
use crate::retry::{RetryConfig, execute_with_rate_limit_retry};
use crate::score::ScoreTracker;
use crate::verdict::Verdict;

/// Longest context label passed to notifications.
const CONTEXT_LABEL_MAX_CHARS: usize = 120;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fixed cycle length.
    pub window: Duration,
    /// Wait after a failed cycle before the next window starts.
    pub recovery_delay: Duration,
    pub screenshot_folder: PathBuf,
    pub rules: String,
    pub model: String,
    pub retry: RetryConfig,
}

/// Why [`Scheduler::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    PoweredOff,
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub cycles: u64,
    pub screenshots: u64,
    pub violations: u64,
    pub failures: u64,
}

/// Capture delay for one window: uniform over `[1s, window - 1s]` at
/// millisecond granularity, or `[0, window]` for windows shorter than 3s.
pub fn pick_capture_delay<R: Rng + ?Sized>(window: Duration, rng: &mut R) -> Duration {
    let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
    let (low, high) = if window_ms < 3_000 {
        (0, window_ms)
    } else {
        (1_000, window_ms - 1_000)
    };
    Duration::from_millis(rng.random_range(low..=high))
}

pub struct Scheduler {
    capture: Box<dyn CaptureAdapter>,
    analysis: Box<dyn AnalysisAdapter>,
    tracker: ScoreTracker,
    config: SchedulerConfig,
    events: EventSink,
    rng: StdRng,
    stats: RunStats,
}

impl Scheduler {
    pub fn new(
        capture: Box<dyn CaptureAdapter>,
        analysis: Box<dyn AnalysisAdapter>,
        config: SchedulerConfig,
        events: EventSink,
    ) -> Self {
        Self {
            capture,
            analysis,
            tracker: ScoreTracker::new(),
            config,
            events,
            rng: StdRng::from_os_rng(),
            stats: RunStats::default(),
        }
    }

    /// Deterministic jitter (for tests).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Start from an existing score.
    pub fn with_tracker(mut self, tracker: ScoreTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn score(&self) -> u32 {
        self.tracker.score()
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Check inputs, create the screenshot folder and log the displays.
    pub fn prepare(&self) -> Result<()> {
        if self.config.rules.trim().is_empty() {
            return Err(VigilError::InvalidInput(
                "rules are not set; nothing to judge the screen against".to_string(),
            ));
        }
        if self.config.window.is_zero() {
            return Err(VigilError::InvalidInput(
                "interval must be a positive number of seconds".to_string(),
            ));
        }
        ensure_folder(&self.config.screenshot_folder)?;

        let labels = self.capture.display_labels();
        self.events
            .info(format!("Detected displays: {} ({})", labels.len(), labels.join(", ")));
        Ok(())
    }

    /// Run until `cancel` fires or a power-off is issued.
    ///
    /// On exit the controller is reset and the score cleared, whatever the
    /// reason.
    pub async fn run(
        &mut self,
        controller: &mut InterventionController,
        cancel: &CancellationToken,
    ) -> Result<StopReason> {
        self.prepare()?;
        controller.bind_cancel(cancel);
        self.stats = RunStats::default();
        self.events.info(format!(
            "Monitoring started ({}s window, {} transport, {} backend)",
            self.config.window.as_secs(),
            self.analysis.source(),
            controller.backend_name()
        ));

        let reason = self.run_loop(controller, cancel).await;

        controller.shutdown().await;
        self.tracker.reset();
        self.events.info(format!(
            "Monitoring stopped: {} screenshots taken in {} cycles",
            self.stats.screenshots, self.stats.cycles
        ));
        Ok(reason)
    }

    async fn run_loop(
        &mut self,
        controller: &mut InterventionController,
        cancel: &CancellationToken,
    ) -> StopReason {
        loop {
            if cancel.is_cancelled() {
                return StopReason::Cancelled;
            }
            let window_start = Instant::now();
            let delay = pick_capture_delay(self.config.window, &mut self.rng);
            tracing::debug!(delay_ms = delay.as_millis() as u64, "next capture scheduled");
            if sleep_or_cancel(cancel, delay).await.is_err() {
                return StopReason::Cancelled;
            }

            self.stats.cycles += 1;
            let next_wait = match self.run_cycle(controller, cancel).await {
                Ok(LevelOutcome::PoweredOff) => return StopReason::PoweredOff,
                Ok(_) => self.config.window.saturating_sub(window_start.elapsed()),
                Err(VigilError::Cancelled) => return StopReason::Cancelled,
                Err(err) => {
                    self.stats.failures += 1;
                    self.events.error(format!("{} failed: {err}", err.stage()));
                    if err.is_persistent() {
                        self.events
                            .warn("This will fail again every cycle until the configuration is fixed");
                    }
                    self.config.recovery_delay
                }
            };
            if sleep_or_cancel(cancel, next_wait).await.is_err() {
                return StopReason::Cancelled;
            }
        }
    }

    /// One capture → analysis → classification → score → intervention pass.
    /// The batch is dropped (and its files deleted) when this returns.
    async fn run_cycle(
        &mut self,
        controller: &mut InterventionController,
        cancel: &CancellationToken,
    ) -> Result<LevelOutcome> {
        let batch = self
            .capture
            .capture_all(&self.config.screenshot_folder)
            .or_cancel(cancel)
            .await
            .map_err(|_| VigilError::Cancelled)??;
        self.stats.screenshots += batch.len() as u64;
        self.events.info(format!(
            "Captured {} screenshot(s) (total {}); analyzing",
            batch.len(),
            self.stats.screenshots
        ));

        let request = AnalysisRequest {
            rules: &self.config.rules,
            model: &self.config.model,
            images: batch.images(),
        };
        let analysis = self.analysis.as_ref();
        let events = &self.events;
        let max_retries = self.config.retry.max_rate_limit_retries;
        let text = execute_with_rate_limit_retry(
            || analysis.analyze(&request),
            &self.config.retry,
            cancel,
            |status| {
                events.warn(format!(
                    "Rate limited: retrying in {}s ({}/{max_retries})",
                    status.wait.as_secs(),
                    status.retry
                ));
            },
        )
        .await?;

        let verdict = Verdict::from_response(text, self.analysis.source());
        self.report_verdict(&verdict);

        let update = self.tracker.update(verdict.is_violation);
        let level = update.level();
        self.events.score(update.current, level);
        if update.level_changed() {
            self.events.info(format!(
                "Intervention level {} -> {level}",
                crate::level::level_for(update.previous)
            ));
        }
        self.events.info(format!(
            "Cycle {}: {} (score {} -> {}, {level})",
            self.stats.cycles,
            if verdict.is_violation { "violation" } else { "compliant" },
            update.previous,
            update.current
        ));

        if update.reached_zero {
            controller.reset();
            return Ok(LevelOutcome::Continue);
        }
        let context = if verdict.is_violation {
            context_label(&verdict)
        } else {
            format!("Compliant cycle, score down to {}", update.current)
        };
        Ok(controller.apply_level(update.current, &context).await)
    }

    fn report_verdict(&mut self, verdict: &Verdict) {
        self.events.verdict(verdict);
        if verdict.is_violation {
            self.stats.violations += 1;
            self.events.notify("Violation detected", context_label(verdict));
        } else if verdict.basis.is_ambiguous() {
            self.events
                .warn("Verdict was ambiguous; treating the cycle as compliant");
        }
    }
}

/// The reason line of a verdict, or its first line, shortened.
fn context_label(verdict: &Verdict) -> String {
    let lines = || verdict.display_text.lines().map(str::trim).filter(|l| !l.is_empty());
    let line = lines()
        .find(|line| {
            let lower = line.to_lowercase();
            lower.starts_with("reason") || line.starts_with("理由")
        })
        .or_else(|| lines().next())
        .unwrap_or("");
    let mut label: String = line.chars().take(CONTEXT_LABEL_MAX_CHARS).collect();
    if line.chars().count() > CONTEXT_LABEL_MAX_CHARS {
        label.push('…');
    }
    label
}
