//! Keystroke delay: alphanumeric keys are swallowed by the hook and replayed
//! after a fixed delay by a worker task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::effects::{EffectError, SessionEffect};
use crate::level::Resource;

/// Delay applied to each intercepted keystroke.
pub const DEFAULT_KEY_DELAY: Duration = Duration::from_secs(1);

/// One keyboard transition, identified by virtual-key and scan code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub vk: u16,
    pub scan: u16,
    pub pressed: bool,
}

impl KeyEvent {
    /// `0`-`9` and `A`-`Z` virtual-key codes.
    pub fn is_alphanumeric(&self) -> bool {
        matches!(self.vk, 0x30..=0x39 | 0x41..=0x5A)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDecision {
    Pass,
    Suppress,
}

/// Synthesizes key events into the session.
pub trait KeyInjector: Send + Sync {
    fn inject(&self, event: KeyEvent) -> Result<(), EffectError>;
}

/// Installs the low-level interception that feeds [`KeyDelayFilter::on_key`].
pub trait KeyboardHook: Send {
    fn install(&mut self, filter: Arc<KeyDelayFilter>) -> Result<(), EffectError>;
    fn uninstall(&mut self) -> Result<(), EffectError>;
}

/// Decision logic called from the hook callback. Never blocks.
pub struct KeyDelayFilter {
    queue: mpsc::UnboundedSender<(Instant, KeyEvent)>,
    delay: Duration,
    injecting: Arc<AtomicBool>,
}

impl KeyDelayFilter {
    /// Spawns the replay worker on `runtime`. The worker drains pending
    /// keys and exits once the filter is dropped.
    pub fn new(delay: Duration, injector: Arc<dyn KeyInjector>, runtime: &Handle) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let injecting = Arc::new(AtomicBool::new(false));
        runtime.spawn(replay_worker(rx, injector, Arc::clone(&injecting)));
        Self {
            queue,
            delay,
            injecting,
        }
    }

    pub fn on_key(&self, event: KeyEvent) -> KeyDecision {
        if self.injecting.load(Ordering::Acquire) || !event.is_alphanumeric() {
            return KeyDecision::Pass;
        }
        match self.queue.send((Instant::now() + self.delay, event)) {
            Ok(()) => KeyDecision::Suppress,
            Err(_) => KeyDecision::Pass,
        }
    }
}

async fn replay_worker(
    mut rx: mpsc::UnboundedReceiver<(Instant, KeyEvent)>,
    injector: Arc<dyn KeyInjector>,
    injecting: Arc<AtomicBool>,
) {
    while let Some((due, event)) = rx.recv().await {
        tokio::time::sleep_until(due).await;
        while injecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tokio::task::yield_now().await;
        }
        if let Err(err) = injector.inject(event) {
            tracing::warn!(vk = event.vk, error = %err, "failed to re-inject delayed key");
        }
        injecting.store(false, Ordering::Release);
    }
    tracing::debug!("key replay worker finished");
}

/// [`SessionEffect`] holding the keyboard hook.
pub struct InputDelayEffect {
    hook: Box<dyn KeyboardHook>,
    injector: Arc<dyn KeyInjector>,
    delay: Duration,
    filter: Option<Arc<KeyDelayFilter>>,
}

impl InputDelayEffect {
    pub fn new(hook: Box<dyn KeyboardHook>, injector: Arc<dyn KeyInjector>, delay: Duration) -> Self {
        Self {
            hook,
            injector,
            delay,
            filter: None,
        }
    }
}

impl SessionEffect for InputDelayEffect {
    fn resource(&self) -> Resource {
        Resource::InputHook
    }

    fn acquire(&mut self) -> Result<(), EffectError> {
        if self.filter.is_some() {
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|err| EffectError::platform("start key replay worker", err))?;
        let filter = Arc::new(KeyDelayFilter::new(
            self.delay,
            Arc::clone(&self.injector),
            &runtime,
        ));
        self.hook.install(Arc::clone(&filter))?;
        self.filter = Some(filter);
        Ok(())
    }

    fn release(&mut self) -> Result<(), EffectError> {
        if self.filter.take().is_some() {
            self.hook.uninstall()?;
        }
        Ok(())
    }

    fn is_engaged(&self) -> bool {
        self.filter.is_some()
    }
}
