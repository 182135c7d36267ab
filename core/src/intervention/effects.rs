//! Capability traits the controller drives.
//!
//! Held effects implement [`SessionEffect`]; one-shot actions (audio, tone,
//! lock, power-off) are separate traits so tests can substitute recorders.

use async_trait::async_trait;
use thiserror::Error;

use crate::level::Resource;

#[derive(Debug, Error)]
pub enum EffectError {
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("{operation} failed: {message}")]
    Platform {
        operation: &'static str,
        message: String,
    },

    #[error("command `{program}` failed: {message}")]
    Command { program: String, message: String },

    #[error("background task failed: {0}")]
    Task(String),
}

impl EffectError {
    pub fn platform(operation: &'static str, message: impl ToString) -> Self {
        Self::Platform {
            operation,
            message: message.to_string(),
        }
    }
}

/// An exclusively held, reversible session effect.
pub trait SessionEffect: Send {
    fn resource(&self) -> Resource;

    fn acquire(&mut self) -> Result<(), EffectError>;

    /// Must be safe to call when not engaged.
    fn release(&mut self) -> Result<(), EffectError>;

    /// False once the effect stopped on its own (e.g. an expiry timer).
    fn is_engaged(&self) -> bool;
}

/// Master volume and mute state of the default output device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioState {
    /// Scalar in `0.0..=1.0`.
    pub volume: f32,
    pub muted: bool,
}

#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn snapshot(&self) -> Result<AudioState, EffectError>;
    async fn apply(&self, state: AudioState) -> Result<(), EffectError>;
}

#[async_trait]
pub trait AlertTone: Send + Sync {
    /// Play the full alert pattern; returns when playback ends.
    async fn play(&self) -> Result<(), EffectError>;
}

#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn lock(&self) -> Result<(), EffectError>;
    async fn power_off(&self) -> Result<(), EffectError>;
}
