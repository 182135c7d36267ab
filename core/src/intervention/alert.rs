//! Audible alert with scoped audio state.

use std::sync::Arc;
use std::time::Duration;

use super::effects::{AlertTone, AudioOutput, AudioState, EffectError};

/// Snapshot the output state, force it loud and un-muted, play the tone,
/// then restore the snapshot.
///
/// Restoration runs on every path once the snapshot succeeded: playback
/// errors, playback panics (the tone runs in its own task) and playback
/// exceeding `max_duration`.
pub async fn run_alert(
    audio: Arc<dyn AudioOutput>,
    tone: Arc<dyn AlertTone>,
    volume: f32,
    max_duration: Duration,
) -> Result<(), EffectError> {
    let original = audio.snapshot().await?;
    tracing::debug!(volume = original.volume, muted = original.muted, "audio snapshot taken");

    let played = play_loud(audio.as_ref(), tone, volume, max_duration).await;

    let restored = audio.apply(original).await;
    match &restored {
        Ok(()) => tracing::debug!("audio state restored"),
        Err(err) => tracing::error!(error = %err, "failed to restore audio state"),
    }
    played.and(restored)
}

async fn play_loud(
    audio: &dyn AudioOutput,
    tone: Arc<dyn AlertTone>,
    volume: f32,
    max_duration: Duration,
) -> Result<(), EffectError> {
    audio
        .apply(AudioState {
            volume: volume.clamp(0.0, 1.0),
            muted: false,
        })
        .await?;

    let playback = tokio::spawn(async move { tone.play().await });
    let abort = playback.abort_handle();
    match tokio::time::timeout(max_duration, playback).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(EffectError::Task(format!("alert playback: {join_err}"))),
        Err(_) => {
            abort.abort();
            Err(EffectError::Task(format!(
                "alert playback exceeded {}s",
                max_duration.as_secs()
            )))
        }
    }
}
