use std::time::Duration;

use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use vigil_core::analysis::AnalysisError;
use vigil_core::intervention::{InterventionConfig, InterventionController};
use vigil_core::retry::RetryConfig;
use vigil_core::scheduler::pick_capture_delay;
use vigil_core::{
    EventSink, MonitorEvent, Resource, ScoreTracker, Scheduler, SchedulerConfig, StopReason,
    VigilError,
};

use super::support::{
    FakeCapture, INITIAL_AUDIO, ScriptedAnalysis, always_rate_limited, compliant, drain,
    fake_backend, log_lines, rate_limited, violation,
};

const WINDOW: Duration = Duration::from_secs(60);
const RECOVERY: Duration = Duration::from_secs(5);
const TOLERANCE: Duration = Duration::from_millis(10);

fn config(folder: &TempDir) -> SchedulerConfig {
    SchedulerConfig {
        window: WINDOW,
        recovery_delay: RECOVERY,
        screenshot_folder: folder.path().to_path_buf(),
        rules: "No video sites or social media during work hours.".to_string(),
        model: "flash".to_string(),
        retry: RetryConfig::default(),
    }
}

fn assert_near(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual <= expected + TOLERANCE,
        "expected ~{expected:?}, got {actual:?}"
    );
}

fn png_count(folder: &TempDir) -> usize {
    std::fs::read_dir(folder.path())
        .unwrap()
        .filter(|entry| {
            entry
                .as_ref()
                .is_ok_and(|e| e.path().extension().is_some_and(|ext| ext == "png"))
        })
        .count()
}

#[tokio::test(start_paused = true)]
async fn rate_limited_batch_is_resent_after_hinted_wait() {
    let folder = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let capture = FakeCapture::new(2);
    let capture_calls = capture.calls.clone();
    let analysis = ScriptedAnalysis::new(
        vec![Err(rate_limited(Some("2.5s"))), violation()],
        compliant,
        cancel.clone(),
        2,
    );
    let analysis_calls = analysis.calls.clone();
    let events = EventSink::new();
    let mut rx = events.subscribe();
    let (backend, _fakes) = fake_backend(false);
    let mut controller =
        InterventionController::new(backend, InterventionConfig::default(), events.clone());
    let mut scheduler = Scheduler::new(
        Box::new(capture),
        Box::new(analysis),
        config(&folder),
        events,
    )
    .with_seed(3);

    let reason = scheduler.run(&mut controller, &cancel).await.unwrap();

    assert_eq!(reason, StopReason::Cancelled);
    assert_eq!(capture_calls.lock().unwrap().len(), 1, "no fresh capture");
    let calls = analysis_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].images, calls[1].images);
    assert_eq!(calls[0].images.len(), 2);
    assert_near(calls[1].at - calls[0].at, Duration::from_secs(4));

    let stats = scheduler.stats();
    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.screenshots, 2);
    assert_eq!(stats.violations, 1);
    assert_eq!(stats.failures, 0);
    assert_eq!(scheduler.score(), 0, "score cleared on exit");
    assert_eq!(png_count(&folder), 0, "batch deleted after the cycle");

    let lines = log_lines(&drain(&mut rx));
    assert!(
        lines.iter().any(|l| l.ends_with("Rate limited: retrying in 4s (1/3)")),
        "{lines:#?}"
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_cycle() {
    let folder = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let analysis = ScriptedAnalysis::new(Vec::new(), always_rate_limited, cancel.clone(), 4);
    let analysis_calls = analysis.calls.clone();
    let events = EventSink::new();
    let mut rx = events.subscribe();
    let (backend, _fakes) = fake_backend(false);
    let mut controller =
        InterventionController::new(backend, InterventionConfig::default(), events.clone());
    let mut scheduler = Scheduler::new(
        Box::new(FakeCapture::new(1)),
        Box::new(analysis),
        config(&folder),
        events,
    );

    let reason = scheduler.run(&mut controller, &cancel).await.unwrap();

    assert_eq!(reason, StopReason::Cancelled);
    assert_eq!(analysis_calls.lock().unwrap().len(), 4, "1 call + 3 retries");
    assert_eq!(scheduler.stats().failures, 1);
    assert_eq!(scheduler.stats().violations, 0);

    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| matches!(e, MonitorEvent::Verdict(_))));
    let lines = log_lines(&events);
    assert!(
        lines
            .iter()
            .any(|l| l.contains("analysis failed: still rate limited after 3 retries")),
        "{lines:#?}"
    );
    assert_eq!(png_count(&folder), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_request_is_flagged_as_recurring() {
    let folder = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let analysis = ScriptedAnalysis::new(
        vec![
            Err(AnalysisError::Status {
                code: 403,
                body: "API key not valid".to_string(),
            }),
            Err(AnalysisError::Status {
                code: 503,
                body: "overloaded".to_string(),
            }),
        ],
        compliant,
        cancel.clone(),
        2,
    );
    let events = EventSink::new();
    let mut rx = events.subscribe();
    let (backend, _fakes) = fake_backend(false);
    let mut controller =
        InterventionController::new(backend, InterventionConfig::default(), events.clone());
    let mut scheduler = Scheduler::new(
        Box::new(FakeCapture::new(1)),
        Box::new(analysis),
        config(&folder),
        events,
    );

    scheduler.run(&mut controller, &cancel).await.unwrap();

    assert_eq!(scheduler.stats().failures, 2);
    let lines = log_lines(&drain(&mut rx));
    assert!(
        lines
            .iter()
            .any(|l| l.contains("analysis failed: service returned status 403")),
        "{lines:#?}"
    );
    let recurring = lines
        .iter()
        .filter(|l| l.contains("will fail again every cycle"))
        .count();
    assert_eq!(recurring, 1, "only the 403 is flagged: {lines:#?}");
}

#[tokio::test(start_paused = true)]
async fn one_capture_per_window_at_jittered_offset() {
    let folder = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let capture = FakeCapture::new(1);
    let capture_calls = capture.calls.clone();
    let analysis = ScriptedAnalysis::new(Vec::new(), compliant, cancel.clone(), 3);
    let events = EventSink::new();
    let (backend, _fakes) = fake_backend(false);
    let mut controller =
        InterventionController::new(backend, InterventionConfig::default(), events.clone());
    let mut scheduler = Scheduler::new(
        Box::new(capture),
        Box::new(analysis),
        config(&folder),
        events,
    )
    .with_seed(7);

    let mut rng = StdRng::seed_from_u64(7);
    let expected: Vec<Duration> = (0..3u32)
        .map(|k| WINDOW * k + pick_capture_delay(WINDOW, &mut rng))
        .collect();

    let start = Instant::now();
    scheduler.run(&mut controller, &cancel).await.unwrap();

    let calls = capture_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 3);
    for (k, (at, expected)) in calls.iter().zip(&expected).enumerate() {
        let offset = *at - start;
        assert_near(offset, *expected);
        let window_start = WINDOW * u32::try_from(k).unwrap();
        assert!(offset >= window_start + Duration::from_secs(1));
        assert!(offset <= window_start + WINDOW - Duration::from_secs(1));
    }
}

#[tokio::test(start_paused = true)]
async fn failed_capture_waits_recovery_delay() {
    let folder = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let mut capture = FakeCapture::new(1);
    capture.failing_calls = vec![0];
    let capture_calls = capture.calls.clone();
    let analysis = ScriptedAnalysis::new(Vec::new(), compliant, cancel.clone(), 1);
    let events = EventSink::new();
    let mut rx = events.subscribe();
    let (backend, _fakes) = fake_backend(false);
    let mut controller =
        InterventionController::new(backend, InterventionConfig::default(), events.clone());
    let mut scheduler = Scheduler::new(
        Box::new(capture),
        Box::new(analysis),
        config(&folder),
        events,
    )
    .with_seed(11);

    let mut rng = StdRng::seed_from_u64(11);
    let first = pick_capture_delay(WINDOW, &mut rng);
    let second = pick_capture_delay(WINDOW, &mut rng);

    let start = Instant::now();
    scheduler.run(&mut controller, &cancel).await.unwrap();

    let calls = capture_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_near(calls[0] - start, first);
    assert_near(calls[1] - start, first + RECOVERY + second);
    assert_eq!(scheduler.stats().failures, 1);

    let lines = log_lines(&drain(&mut rx));
    assert!(
        lines
            .iter()
            .any(|l| l.contains("capture failed: capture program fake-capture exited with code 1")),
        "{lines:#?}"
    );
}

#[tokio::test(start_paused = true)]
async fn escalation_is_undone_when_monitoring_stops() {
    let folder = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let analysis = ScriptedAnalysis::new(Vec::new(), violation, cancel.clone(), 3);
    let events = EventSink::new();
    let (backend, fakes) = fake_backend(false);
    let mut controller =
        InterventionController::new(backend, InterventionConfig::default(), events.clone());
    let mut scheduler = Scheduler::new(
        Box::new(FakeCapture::new(1)),
        Box::new(analysis),
        config(&folder),
        events,
    );

    scheduler.run(&mut controller, &cancel).await.unwrap();

    assert_eq!(
        fakes.journal.entries(),
        vec!["acquire input hook", "release input hook"]
    );
    assert!(controller.held_resources().is_empty());
    assert_eq!(scheduler.score(), 0);
    assert!(fakes.tone.plays.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    assert_eq!(*fakes.audio.state.lock().unwrap(), INITIAL_AUDIO);
}

#[tokio::test(start_paused = true)]
async fn reaching_zero_releases_everything_once() {
    let folder = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    // 66 + 30 = 96, then twenty compliant cycles bring it to 0.
    let analysis = ScriptedAnalysis::new(vec![violation()], compliant, cancel.clone(), 22);
    let events = EventSink::new();
    let mut rx = events.subscribe();
    let (backend, fakes) = fake_backend(false);
    let mut controller =
        InterventionController::new(backend, InterventionConfig::default(), events.clone());
    let mut scheduler = Scheduler::new(
        Box::new(FakeCapture::new(1)),
        Box::new(analysis),
        config(&folder),
        events,
    )
    .with_tracker(ScoreTracker::with_score(66));

    scheduler.run(&mut controller, &cancel).await.unwrap();

    assert_eq!(fakes.journal.count("acquire input hook"), 1);
    assert_eq!(fakes.journal.count("release input hook"), 1);
    let lines = log_lines(&drain(&mut rx));
    let released = lines
        .iter()
        .filter(|l| l.ends_with("All interventions released"))
        .count();
    assert_eq!(released, 1);
}

#[tokio::test(start_paused = true)]
async fn lock_keeps_the_loop_running() {
    let folder = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let capture = FakeCapture::new(1);
    let capture_calls = capture.calls.clone();
    let analysis = ScriptedAnalysis::new(vec![violation()], compliant, cancel.clone(), 2);
    let events = EventSink::new();
    let (backend, fakes) = fake_backend(false);
    let mut controller =
        InterventionController::new(backend, InterventionConfig::default(), events.clone());
    let mut scheduler = Scheduler::new(
        Box::new(capture),
        Box::new(analysis),
        config(&folder),
        events,
    )
    .with_tracker(ScoreTracker::with_score(181));

    let reason = scheduler.run(&mut controller, &cancel).await.unwrap();

    assert_eq!(reason, StopReason::Cancelled);
    assert_eq!(capture_calls.lock().unwrap().len(), 2);
    // The second lock is aborted during its grace delay by the stop.
    assert_eq!(fakes.journal.count("lock"), 1);
    assert!(controller.held_resources().is_empty());
}

#[tokio::test(start_paused = true)]
async fn power_off_ends_the_loop() {
    let folder = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let analysis = ScriptedAnalysis::new(Vec::new(), violation, cancel.clone(), usize::MAX);
    let events = EventSink::new();
    let (backend, fakes) = fake_backend(false);
    let mut controller =
        InterventionController::new(backend, InterventionConfig::default(), events.clone());
    let mut scheduler = Scheduler::new(
        Box::new(FakeCapture::new(1)),
        Box::new(analysis),
        config(&folder),
        events,
    )
    .with_tracker(ScoreTracker::with_score(241));

    let reason = scheduler.run(&mut controller, &cancel).await.unwrap();

    assert_eq!(reason, StopReason::PoweredOff);
    assert_eq!(fakes.journal.count("power off"), 1);
    assert!(!cancel.is_cancelled());
    assert_eq!(scheduler.score(), 0);
}

#[tokio::test(start_paused = true)]
async fn empty_rules_refuse_to_start() {
    let folder = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let capture = FakeCapture::new(1);
    let capture_calls = capture.calls.clone();
    let analysis = ScriptedAnalysis::new(Vec::new(), compliant, cancel.clone(), 1);
    let events = EventSink::new();
    let (backend, _fakes) = fake_backend(false);
    let mut controller =
        InterventionController::new(backend, InterventionConfig::default(), events.clone());
    let mut config = config(&folder);
    config.rules = "   \n".to_string();
    let mut scheduler = Scheduler::new(Box::new(capture), Box::new(analysis), config, events);

    let err = scheduler.run(&mut controller, &cancel).await.unwrap_err();

    assert!(matches!(err, VigilError::InvalidInput(_)));
    assert!(capture_calls.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rules_reach_the_analysis_request() {
    let folder = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let analysis = ScriptedAnalysis::new(Vec::new(), compliant, cancel.clone(), 1);
    let analysis_calls = analysis.calls.clone();
    let events = EventSink::new();
    let (backend, _fakes) = fake_backend(false);
    let mut controller =
        InterventionController::new(backend, InterventionConfig::default(), events.clone());
    let mut scheduler = Scheduler::new(
        Box::new(FakeCapture::new(1)),
        Box::new(analysis),
        config(&folder),
        events,
    );

    scheduler.run(&mut controller, &cancel).await.unwrap();

    let calls = analysis_calls.lock().unwrap().clone();
    assert_eq!(
        calls[0].rules,
        "No video sites or social media during work hours."
    );
    assert!(!controller.is_held(Resource::InputHook));
}
