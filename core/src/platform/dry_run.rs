//! Backend that logs every action instead of touching the session.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::BackendOptions;
use crate::intervention::{
    AlertTone, AudioOutput, AudioState, Backend, ColorFilter, ColorMatrix, EffectError, GrayscaleEffect,
    InputDelayEffect, KeyDelayFilter, KeyEvent, KeyInjector, KeyboardHook, PointerDevice, PointerInversionEffect,
    SessionControl,
};

pub fn backend(options: &BackendOptions) -> Backend {
    Backend {
        name: "dry-run",
        audio: Arc::new(DryRunAudio::default()),
        tone: Arc::new(DryRunTone),
        session: Arc::new(DryRunSession),
        effects: vec![
            Box::new(InputDelayEffect::new(
                Box::new(DryRunHook::default()),
                Arc::new(DryRunInjector),
                options.key_delay,
            )),
            Box::new(GrayscaleEffect::new(Box::new(DryRunColorFilter))),
            Box::new(PointerInversionEffect::new(
                Arc::new(DryRunPointer::default()),
                options.pointer.clone(),
            )),
        ],
    }
}

pub struct DryRunAudio {
    state: Mutex<AudioState>,
}

impl Default for DryRunAudio {
    fn default() -> Self {
        Self {
            state: Mutex::new(AudioState {
                volume: 0.5,
                muted: false,
            }),
        }
    }
}

#[async_trait]
impl AudioOutput for DryRunAudio {
    async fn snapshot(&self) -> Result<AudioState, EffectError> {
        self.state
            .lock()
            .map(|state| *state)
            .map_err(|err| EffectError::platform("read audio state", err))
    }

    async fn apply(&self, state: AudioState) -> Result<(), EffectError> {
        tracing::info!(volume = state.volume, muted = state.muted, "[dry-run] set audio");
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
        Ok(())
    }
}

pub struct DryRunTone;

#[async_trait]
impl AlertTone for DryRunTone {
    async fn play(&self) -> Result<(), EffectError> {
        tracing::info!("[dry-run] alert tone");
        Ok(())
    }
}

pub struct DryRunSession;

#[async_trait]
impl SessionControl for DryRunSession {
    async fn lock(&self) -> Result<(), EffectError> {
        tracing::info!("[dry-run] lock session");
        Ok(())
    }

    async fn power_off(&self) -> Result<(), EffectError> {
        tracing::info!("[dry-run] power off");
        Ok(())
    }
}

#[derive(Default)]
pub struct DryRunHook {
    filter: Option<Arc<KeyDelayFilter>>,
}

impl KeyboardHook for DryRunHook {
    fn install(&mut self, filter: Arc<KeyDelayFilter>) -> Result<(), EffectError> {
        tracing::info!("[dry-run] keyboard hook installed");
        self.filter = Some(filter);
        Ok(())
    }

    fn uninstall(&mut self) -> Result<(), EffectError> {
        tracing::info!("[dry-run] keyboard hook removed");
        self.filter = None;
        Ok(())
    }
}

pub struct DryRunInjector;

impl KeyInjector for DryRunInjector {
    fn inject(&self, event: KeyEvent) -> Result<(), EffectError> {
        tracing::info!(vk = event.vk, "[dry-run] inject key");
        Ok(())
    }
}

pub struct DryRunColorFilter;

impl ColorFilter for DryRunColorFilter {
    fn apply(&mut self, _matrix: &ColorMatrix) -> Result<(), EffectError> {
        tracing::info!("[dry-run] grayscale on");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), EffectError> {
        tracing::info!("[dry-run] grayscale off");
        Ok(())
    }
}

/// Virtual pointer that never moves on its own.
#[derive(Default)]
pub struct DryRunPointer {
    position: Mutex<(i32, i32)>,
}

impl PointerDevice for DryRunPointer {
    fn position(&self) -> Result<(i32, i32), EffectError> {
        self.position
            .lock()
            .map(|position| *position)
            .map_err(|err| EffectError::platform("read pointer", err))
    }

    fn set_position(&self, x: i32, y: i32) -> Result<(), EffectError> {
        if let Ok(mut position) = self.position.lock() {
            *position = (x, y);
        }
        Ok(())
    }
}
