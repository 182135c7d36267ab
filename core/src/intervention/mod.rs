//! Intervention controller: maps the violation score to a level and owns
//! every reversible session effect.
//!
//! Held effects are acquired on first entry into the level that needs them,
//! kept across cycles, and released exactly once by [`InterventionController::reset`].
//! Dropping the controller resets it.

mod alert;
mod effects;
mod grayscale;
mod input_delay;
mod pointer;

pub use alert::run_alert;
pub use effects::{AlertTone, AudioOutput, AudioState, EffectError, SessionControl, SessionEffect};
pub use grayscale::{ColorFilter, ColorMatrix, GRAYSCALE_MATRIX, GrayscaleEffect, IDENTITY_MATRIX};
pub use input_delay::{
    DEFAULT_KEY_DELAY, InputDelayEffect, KeyDecision, KeyDelayFilter, KeyEvent, KeyInjector, KeyboardHook,
};
pub use pointer::{PointerConfig, PointerDevice, PointerInversionEffect, inverted_target};

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vigil_async_utils::sleep_or_cancel;

use crate::events::EventSink;
use crate::level::{InterventionLevel, Resource, level_for, required_resources};

/// Timing and volume knobs for the controller.
#[derive(Debug, Clone)]
pub struct InterventionConfig {
    /// Volume scalar forced during an alert.
    pub alert_volume: f32,
    /// Upper bound on alert playback before audio is restored.
    pub alert_max_duration: Duration,
    pub lock_grace: Duration,
    pub shutdown_grace: Duration,
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            alert_volume: 1.0,
            alert_max_duration: Duration::from_secs(30),
            lock_grace: Duration::from_secs(3),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Platform capabilities handed to the controller.
pub struct Backend {
    pub name: &'static str,
    pub audio: Arc<dyn AudioOutput>,
    pub tone: Arc<dyn AlertTone>,
    pub session: Arc<dyn SessionControl>,
    pub effects: Vec<Box<dyn SessionEffect>>,
}

/// What the loop should do after a level was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelOutcome {
    Continue,
    /// The session was locked; the cycle ends.
    SessionLocked,
    /// Power-off was issued; the loop ends.
    PoweredOff,
}

pub struct InterventionController {
    effects: BTreeMap<Resource, Box<dyn SessionEffect>>,
    /// Held resources in acquisition order.
    held: Vec<Resource>,
    audio: Arc<dyn AudioOutput>,
    tone: Arc<dyn AlertTone>,
    session: Arc<dyn SessionControl>,
    config: InterventionConfig,
    events: EventSink,
    alert_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    backend_name: &'static str,
}

impl InterventionController {
    pub fn new(backend: Backend, config: InterventionConfig, events: EventSink) -> Self {
        let effects = backend
            .effects
            .into_iter()
            .map(|effect| (effect.resource(), effect))
            .collect();
        Self {
            effects,
            held: Vec::new(),
            audio: backend.audio,
            tone: backend.tone,
            session: backend.session,
            config,
            events,
            alert_task: None,
            cancel: CancellationToken::new(),
            backend_name: backend.name,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Tie grace delays to `parent`: cancelling it aborts a pending lock or
    /// power-off.
    pub fn bind_cancel(&mut self, parent: &CancellationToken) {
        self.cancel = parent.child_token();
    }

    /// Resources currently in effect, in acquisition order. An effect that
    /// stopped on its own (pointer expiry) is no longer listed.
    pub fn held_resources(&self) -> Vec<Resource> {
        self.held
            .iter()
            .copied()
            .filter(|resource| self.is_held(*resource))
            .collect()
    }

    pub fn is_held(&self, resource: Resource) -> bool {
        self.held.contains(&resource)
            && self
                .effects
                .get(&resource)
                .is_some_and(|effect| effect.is_engaged())
    }

    pub fn alert_in_flight(&self) -> bool {
        self.alert_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Drive the effects for `score`. Repeated calls at the same level do not
    /// re-acquire held resources.
    pub async fn apply_level(&mut self, score: u32, context_label: &str) -> LevelOutcome {
        let level = level_for(score);
        tracing::debug!(score, %level, "applying intervention level");

        if score > 0 {
            self.events.notify(
                format!("Warning (score {score})"),
                context_label.to_string(),
            );
        }
        if level == InterventionLevel::Warn {
            return LevelOutcome::Continue;
        }

        self.start_alert();
        self.ensure_resources(level);

        match level {
            InterventionLevel::Lock => self.lock_session().await,
            InterventionLevel::Shutdown => self.power_off().await,
            _ => LevelOutcome::Continue,
        }
    }

    /// Release every held resource in reverse acquisition order. Each
    /// release is attempted even if an earlier one failed or panicked.
    pub fn reset(&mut self) {
        if self.held.is_empty() {
            return;
        }
        while let Some(resource) = self.held.pop() {
            let Some(effect) = self.effects.get_mut(&resource) else {
                continue;
            };
            match catch_unwind(AssertUnwindSafe(|| effect.release())) {
                Ok(Ok(())) => tracing::info!(%resource, "released"),
                Ok(Err(err)) => self.events.warn(format!("Failed to release {resource}: {err}")),
                Err(_) => self.events.error(format!("Release of {resource} panicked")),
            }
        }
        self.events.info("All interventions released");
    }

    /// Reset, stop background work and wait for a running alert to restore
    /// audio.
    pub async fn shutdown(&mut self) {
        self.reset();
        self.cancel.cancel();
        self.wait_for_alert().await;
    }

    /// Wait until a running alert has finished and restored audio.
    pub async fn wait_for_alert(&mut self) {
        if let Some(task) = self.alert_task.take()
            && let Err(err) = task.await
        {
            tracing::warn!(error = %err, "alert task failed");
        }
    }

    fn start_alert(&mut self) {
        if self.alert_in_flight() {
            tracing::debug!("alert already playing; not starting another");
            return;
        }
        let audio = Arc::clone(&self.audio);
        let tone = Arc::clone(&self.tone);
        let events = self.events.clone();
        let volume = self.config.alert_volume;
        let max_duration = self.config.alert_max_duration;
        self.alert_task = Some(tokio::spawn(async move {
            if let Err(err) = run_alert(audio, tone, volume, max_duration).await {
                events.warn(format!("Alert failed: {err}"));
            }
        }));
    }

    fn ensure_resources(&mut self, level: InterventionLevel) {
        for resource in required_resources(level) {
            let Some(effect) = self.effects.get_mut(&resource) else {
                tracing::debug!(%resource, "no backend for resource");
                continue;
            };

            if self.held.contains(&resource) {
                if effect.is_engaged() {
                    continue;
                }
                // Stopped on its own (pointer expiry); clear and take it again.
                if let Err(err) = effect.release() {
                    tracing::debug!(%resource, error = %err, "cleanup of lapsed effect failed");
                }
                self.held.retain(|held| *held != resource);
            }

            match effect.acquire() {
                Ok(()) => {
                    tracing::info!(%resource, "acquired");
                    self.held.push(resource);
                }
                Err(err) => {
                    self.events
                        .warn(format!("Could not enable {resource}: {err}"));
                }
            }
        }
    }

    async fn lock_session(&mut self) -> LevelOutcome {
        let grace = self.config.lock_grace;
        self.events
            .warn(format!("Violation limit reached. Locking the session in {}s", grace.as_secs()));
        if sleep_or_cancel(&self.cancel, grace).await.is_err() {
            return LevelOutcome::Continue;
        }
        match self.session.lock().await {
            Ok(()) => {
                self.events.info("Session locked");
                LevelOutcome::SessionLocked
            }
            Err(err) => {
                self.events.error(format!("Session lock failed: {err}"));
                LevelOutcome::Continue
            }
        }
    }

    async fn power_off(&mut self) -> LevelOutcome {
        let grace = self.config.shutdown_grace;
        self.events
            .warn(format!("Violation limit exceeded. Powering off in {}s", grace.as_secs()));
        if sleep_or_cancel(&self.cancel, grace).await.is_err() {
            return LevelOutcome::Continue;
        }
        self.reset();
        self.wait_for_alert().await;
        match self.session.power_off().await {
            Ok(()) => {
                self.events.info("Power-off issued");
                LevelOutcome::PoweredOff
            }
            Err(err) => {
                self.events.error(format!("Power-off failed: {err}"));
                LevelOutcome::Continue
            }
        }
    }
}

impl Drop for InterventionController {
    fn drop(&mut self) {
        self.reset();
        self.cancel.cancel();
    }
}
