//! Pointer inversion: movement is amplified and reversed by a polling task
//! that stops itself after a fixed duration.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use vigil_async_utils::sleep_or_cancel;

use super::effects::{EffectError, SessionEffect};
use crate::level::Resource;

/// Reads and moves the system pointer.
pub trait PointerDevice: Send + Sync {
    fn position(&self) -> Result<(i32, i32), EffectError>;
    fn set_position(&self, x: i32, y: i32) -> Result<(), EffectError>;
}

#[derive(Debug, Clone)]
pub struct PointerConfig {
    pub poll_interval: Duration,
    /// Multiplier applied to the reversed delta.
    pub gain: f64,
    /// The polling task stops on its own after this long.
    pub duration: Duration,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2),
            gain: 1.5,
            duration: Duration::from_secs(30),
        }
    }
}

/// Where to put the pointer after it moved from `last` to `current`.
pub fn inverted_target(last: (i32, i32), current: (i32, i32), gain: f64) -> (i32, i32) {
    (
        inverted_axis(last.0, current.0, gain),
        inverted_axis(last.1, current.1, gain),
    )
}

fn inverted_axis(last: i32, current: i32, gain: f64) -> i32 {
    let delta = f64::from(current) - f64::from(last);
    let target = (f64::from(last) - gain * delta).round();
    target.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

pub struct PointerInversionEffect {
    device: Arc<dyn PointerDevice>,
    config: PointerConfig,
    active: Option<CancellationToken>,
}

impl PointerInversionEffect {
    pub fn new(device: Arc<dyn PointerDevice>, config: PointerConfig) -> Self {
        Self {
            device,
            config,
            active: None,
        }
    }
}

impl SessionEffect for PointerInversionEffect {
    fn resource(&self) -> Resource {
        Resource::PointerInversion
    }

    fn acquire(&mut self) -> Result<(), EffectError> {
        if self.is_engaged() {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| EffectError::platform("start pointer polling", err))?;
        let start = self.device.position()?;

        let token = CancellationToken::new();
        runtime.spawn(poll_pointer(
            Arc::clone(&self.device),
            self.config.clone(),
            start,
            token.clone(),
        ));
        runtime.spawn(expire_after(self.config.duration, token.clone()));
        self.active = Some(token);
        Ok(())
    }

    fn release(&mut self) -> Result<(), EffectError> {
        if let Some(token) = self.active.take() {
            token.cancel();
        }
        Ok(())
    }

    fn is_engaged(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

async fn poll_pointer(
    device: Arc<dyn PointerDevice>,
    config: PointerConfig,
    start: (i32, i32),
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = start;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let current = match device.position() {
            Ok(position) => position,
            Err(err) => {
                tracing::warn!(error = %err, "pointer read failed; stopping inversion");
                token.cancel();
                break;
            }
        };
        if current == last {
            continue;
        }
        let target = inverted_target(last, current, config.gain);
        if let Err(err) = device.set_position(target.0, target.1) {
            tracing::warn!(error = %err, "pointer move failed; stopping inversion");
            token.cancel();
            break;
        }
        // The system clamps moves to the screen edges; track where the
        // pointer actually landed.
        last = match device.position() {
            Ok(position) => position,
            Err(err) => {
                tracing::warn!(error = %err, "pointer read failed; stopping inversion");
                token.cancel();
                break;
            }
        };
    }
    tracing::debug!("pointer polling stopped");
}

async fn expire_after(duration: Duration, token: CancellationToken) {
    if sleep_or_cancel(&token, duration).await.is_ok() {
        tracing::info!(seconds = duration.as_secs(), "pointer inversion expired");
        token.cancel();
    }
}
