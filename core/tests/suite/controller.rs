use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use vigil_core::intervention::{
    InterventionConfig, InterventionController, PointerConfig, PointerInversionEffect,
};
use vigil_core::{EventSink, LevelOutcome, Resource};

use super::support::{
    INITIAL_AUDIO, StillPointer, drain, fake_backend, fake_backend_with, log_lines, notifications,
};

fn setup(session_fails: bool) -> (InterventionController, super::support::FakeHandles, EventSink) {
    let events = EventSink::new();
    let (backend, fakes) = fake_backend(session_fails);
    let controller = InterventionController::new(backend, InterventionConfig::default(), events.clone());
    (controller, fakes, events)
}

#[tokio::test(start_paused = true)]
async fn zero_score_is_silent() {
    let (mut controller, fakes, events) = setup(false);
    let mut rx = events.subscribe();

    let outcome = controller.apply_level(0, "compliant").await;

    assert_eq!(outcome, LevelOutcome::Continue);
    assert!(drain(&mut rx).is_empty());
    assert!(fakes.journal.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn warn_level_notifies_without_alert() {
    let (mut controller, fakes, events) = setup(false);
    let mut rx = events.subscribe();

    controller.apply_level(20, "Reason: chat app").await;
    controller.wait_for_alert().await;

    assert_eq!(
        notifications(&drain(&mut rx)),
        vec![("Warning (score 20)".to_string(), "Reason: chat app".to_string())]
    );
    assert_eq!(fakes.tone.plays.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn alert_restores_audio_exactly() {
    let (mut controller, fakes, _events) = setup(false);

    controller.apply_level(31, "Reason: video site").await;
    controller.wait_for_alert().await;

    assert_eq!(fakes.tone.plays.load(Ordering::SeqCst), 1);
    let applied = fakes.audio.applied.lock().unwrap().clone();
    assert_eq!(applied.len(), 2, "forced state then restore: {applied:?}");
    assert_eq!(applied[0].volume, 1.0);
    assert!(!applied[0].muted);
    assert_eq!(applied[1], INITIAL_AUDIO);
    assert!(!controller.alert_in_flight());
}

#[tokio::test(start_paused = true)]
async fn same_level_twice_acquires_once() {
    let (mut controller, fakes, _events) = setup(false);

    controller.apply_level(70, "first").await;
    controller.apply_level(75, "second").await;

    assert_eq!(fakes.journal.count("acquire input hook"), 1);
    assert_eq!(controller.held_resources(), vec![Resource::InputHook]);
}

#[tokio::test(start_paused = true)]
async fn reset_releases_in_reverse_order() {
    let (mut controller, fakes, _events) = setup(false);

    controller.apply_level(160, "pointer level").await;
    assert_eq!(
        controller.held_resources(),
        vec![
            Resource::InputHook,
            Resource::ColorFilter,
            Resource::PointerInversion
        ]
    );
    controller.reset();

    assert!(controller.held_resources().is_empty());
    assert_eq!(
        fakes.journal.entries(),
        vec![
            "acquire input hook",
            "acquire color filter",
            "acquire pointer inversion",
            "release pointer inversion",
            "release color filter",
            "release input hook",
        ]
    );

    // Nothing held: a second reset is a no-op.
    controller.reset();
    assert_eq!(fakes.journal.entries().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn lapsed_pointer_inversion_is_taken_again() {
    let (mut controller, fakes, _events) = setup(false);

    controller.apply_level(160, "first").await;
    fakes.lapse(Resource::PointerInversion);
    controller.apply_level(190, "second").await;

    assert_eq!(fakes.journal.count("acquire pointer inversion"), 2);
    assert_eq!(fakes.journal.count("acquire input hook"), 1);
    assert!(controller.is_held(Resource::PointerInversion));
}

#[tokio::test(start_paused = true)]
async fn pointer_inversion_expires_on_its_own() {
    let events = EventSink::new();
    let (mut backend, fakes) = fake_backend(false);
    backend
        .effects
        .retain(|effect| effect.resource() != Resource::PointerInversion);
    backend.effects.push(Box::new(PointerInversionEffect::new(
        Arc::new(StillPointer::default()),
        PointerConfig::default(),
    )));
    let mut controller = InterventionController::new(backend, InterventionConfig::default(), events);

    controller.apply_level(160, "pointer level").await;
    assert!(controller.is_held(Resource::PointerInversion));

    // No further violations: the score stays put while the timer runs out.
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert!(!controller.is_held(Resource::PointerInversion));
    assert_eq!(
        controller.held_resources(),
        vec![Resource::InputHook, Resource::ColorFilter]
    );
    assert_eq!(fakes.journal.count("release input hook"), 0);

    controller.apply_level(160, "still pointer level").await;
    assert!(controller.is_held(Resource::PointerInversion));
    assert_eq!(fakes.journal.count("acquire input hook"), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_grace_reenables_lapsed_effects() {
    let (mut controller, fakes, _events) = setup(false);

    controller.apply_level(160, "pointer level").await;
    fakes.lapse(Resource::PointerInversion);
    let outcome = controller.apply_level(260, "shutdown level").await;

    assert_eq!(outcome, LevelOutcome::PoweredOff);
    assert_eq!(fakes.journal.count("acquire pointer inversion"), 2);
    let entries = fakes.journal.entries();
    let reacquired = entries
        .iter()
        .rposition(|entry| entry == "acquire pointer inversion")
        .unwrap();
    let powered_off = entries.iter().position(|entry| entry == "power off").unwrap();
    assert!(reacquired < powered_off);
}

#[tokio::test(start_paused = true)]
async fn falling_level_keeps_resources_until_reset() {
    let (mut controller, fakes, _events) = setup(false);

    controller.apply_level(110, "grayscale").await;
    controller.apply_level(40, "back to alert").await;

    assert!(controller.is_held(Resource::ColorFilter));
    assert_eq!(fakes.journal.count("release color filter"), 0);
}

#[tokio::test(start_paused = true)]
async fn release_panic_does_not_stop_other_releases() {
    let events = EventSink::new();
    let mut rx = events.subscribe();
    let (backend, fakes) = fake_backend_with(false, |effect| {
        effect.panic_on_release = effect.resource == Resource::ColorFilter;
    });
    let mut controller = InterventionController::new(backend, InterventionConfig::default(), events);

    controller.apply_level(160, "pointer level").await;
    controller.reset();

    assert_eq!(fakes.journal.count("release input hook"), 1);
    assert_eq!(fakes.journal.count("release pointer inversion"), 1);
    assert!(controller.held_resources().is_empty());
    let lines = log_lines(&drain(&mut rx));
    assert!(lines.iter().any(|l| l.ends_with("Release of color filter panicked")));
}

#[tokio::test(start_paused = true)]
async fn lock_after_grace() {
    let (mut controller, fakes, _events) = setup(false);
    let start = tokio::time::Instant::now();

    let outcome = controller.apply_level(201, "lock level").await;

    assert_eq!(outcome, LevelOutcome::SessionLocked);
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert_eq!(fakes.journal.count("lock"), 1);
    assert!(controller.is_held(Resource::PointerInversion));
}

#[tokio::test(start_paused = true)]
async fn failed_lock_continues() {
    let (mut controller, fakes, events) = setup(true);
    let mut rx = events.subscribe();

    let outcome = controller.apply_level(230, "lock level").await;

    assert_eq!(outcome, LevelOutcome::Continue);
    assert_eq!(fakes.journal.count("lock"), 1);
    let lines = log_lines(&drain(&mut rx));
    assert!(lines.iter().any(|l| l.contains("Session lock failed")));
}

#[tokio::test(start_paused = true)]
async fn cancelled_grace_skips_lock() {
    let (mut controller, fakes, _events) = setup(false);
    let cancel = CancellationToken::new();
    controller.bind_cancel(&cancel);
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let outcome = controller.apply_level(220, "lock level").await;

    assert_eq!(outcome, LevelOutcome::Continue);
    assert_eq!(fakes.journal.count("lock"), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_then_powers_off() {
    let (mut controller, fakes, _events) = setup(false);

    controller.apply_level(160, "pointer level").await;
    let outcome = controller.apply_level(260, "shutdown level").await;

    assert_eq!(outcome, LevelOutcome::PoweredOff);
    assert!(controller.held_resources().is_empty());
    let entries = fakes.journal.entries();
    assert_eq!(entries.last().map(String::as_str), Some("power off"));
    assert_eq!(fakes.journal.count("release input hook"), 1);
    assert_eq!(*fakes.audio.state.lock().unwrap(), INITIAL_AUDIO);
}

#[tokio::test(start_paused = true)]
async fn failed_power_off_continues() {
    let (mut controller, fakes, _events) = setup(true);

    let outcome = controller.apply_level(300, "shutdown level").await;

    assert_eq!(outcome, LevelOutcome::Continue);
    assert_eq!(fakes.journal.count("power off"), 1);
}

#[tokio::test(start_paused = true)]
async fn drop_releases_held_resources() {
    let (mut controller, fakes, _events) = setup(false);

    controller.apply_level(110, "grayscale").await;
    drop(controller);

    assert_eq!(fakes.journal.count("release color filter"), 1);
    assert_eq!(fakes.journal.count("release input hook"), 1);
}

#[tokio::test(start_paused = true)]
async fn score_scenario_alert_then_warn() {
    let (mut controller, fakes, events) = setup(false);
    let mut rx = events.subscribe();

    controller.apply_level(31, "Reason: video site").await;
    controller.wait_for_alert().await;
    controller.apply_level(26, "Compliant cycle, score down to 26").await;
    controller.wait_for_alert().await;

    assert_eq!(fakes.tone.plays.load(Ordering::SeqCst), 1);
    let titles: Vec<String> = notifications(&drain(&mut rx))
        .into_iter()
        .map(|(title, _)| title)
        .collect();
    assert_eq!(titles, vec!["Warning (score 31)", "Warning (score 26)"]);
}
