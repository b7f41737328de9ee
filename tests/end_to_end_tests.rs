//! End-to-End Pipeline Tests
//!
//! Drives a full `Coordinator` with scripted devices and journaled outputs
//! on a paused Tokio clock, so every poll, cooldown and speech duration is
//! deterministic.

use canne::acquisition::{RangeStep, ScriptedRangeSource, ScriptedVisionSource, VisionStep};
use canne::config::{CanneConfig, ConfigError};
use canne::feedback::console::OutputJournal;
use canne::feedback::{LogAudioOutput, LogHapticOutput};
use canne::{Coordinator, CoordinatorStatus, Devices, OutputChannel, SensorError, Severity, StartupError};
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn range_only_config() -> CanneConfig {
    let mut config = CanneConfig::default();
    config.vision.enabled = false;
    config
}

fn devices(range: ScriptedRangeSource, journal: &OutputJournal) -> Devices {
    Devices::new(
        range,
        LogAudioOutput::new().with_journal(journal.clone()),
        LogHapticOutput::new().with_journal(journal.clone()),
    )
}

fn spoken(journal: &OutputJournal) -> Vec<String> {
    journal
        .on(OutputChannel::Audio)
        .into_iter()
        .map(|e| e.content)
        .collect()
}

/// Range sensor reporting the same distance forever.
fn steady(distance_cm: f64) -> ScriptedRangeSource {
    ScriptedRangeSource::distances([distance_cm]).then_repeat(RangeStep::Distance(distance_cm))
}

fn repeating(step: VisionStep) -> ScriptedVisionSource {
    ScriptedVisionSource::new([step.clone()]).then_repeat(step)
}

async fn run_for(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn clear_path_stays_silent() {
    let journal = OutputJournal::new();
    let range = ScriptedRangeSource::distances([120.0, 118.0, 121.0]).then_repeat(RangeStep::Distance(121.0));
    let mut coordinator = Coordinator::new(devices(range, &journal));

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);
    run_for(500).await;

    let hazard = coordinator.hazard();
    assert_eq!(hazard.severity, Severity::None);
    assert_eq!(hazard.distance_cm, Some(121.0));

    let stats = coordinator.stop().await;
    assert_eq!(stats.commands_issued, 0);
    assert!(journal.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn close_obstacle_raises_one_danger_on_both_channels() {
    let journal = OutputJournal::new();
    let range = steady(45.0);
    let mut coordinator = Coordinator::new(devices(range, &journal));

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);
    run_for(550).await;

    assert_eq!(coordinator.hazard().severity, Severity::Danger);
    assert_eq!(coordinator.stats().commands_issued, 1);
    assert_eq!(spoken(&journal), vec!["Warning! Obstacle at 45 centimeters"]);
    let haptic = journal.on(OutputChannel::Haptic);
    assert_eq!(haptic.len(), 1);
    assert_eq!(haptic[0].content, "500/100 500/100 500/500");

    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn obstacle_in_warning_band_raises_warning() {
    let journal = OutputJournal::new();
    let range = steady(80.0);
    let mut coordinator = Coordinator::new(devices(range, &journal));

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);
    run_for(550).await;

    let hazard = coordinator.hazard();
    assert_eq!(hazard.severity, Severity::Warning);
    assert_eq!(hazard.object_label, None);
    assert_eq!(spoken(&journal), vec!["Obstacle at 80 centimeters"]);
    assert_eq!(journal.on(OutputChannel::Haptic)[0].content, "200/200 200/200");

    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn silent_sensor_announces_unavailable_once() {
    let journal = OutputJournal::new();
    let range = ScriptedRangeSource::new([RangeStep::NoEcho]);
    let mut coordinator = Coordinator::new(devices(range, &journal));

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);

    // Stale timeout is 1 s; nothing is said while the sensor is merely pending
    run_for(950).await;
    assert_eq!(coordinator.stats().commands_issued, 0);

    run_for(300).await;
    let stats = coordinator.stats();
    assert_eq!(stats.commands_issued, 1);
    assert_eq!(stats.range_unavailable_episodes, 1);
    assert_eq!(coordinator.hazard().severity, Severity::None);

    // Same episode: silence
    run_for(6000).await;
    assert_eq!(coordinator.stats().commands_issued, 1);

    let stats = coordinator.stop().await;
    assert_eq!(spoken(&journal), vec!["Sensors unavailable"]);
    assert!(journal.on(OutputChannel::Haptic).is_empty());
    assert_eq!(stats.status, CoordinatorStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn danger_repeats_only_after_cooldown() {
    let journal = OutputJournal::new();
    let range = steady(45.0);
    let mut coordinator = Coordinator::new(devices(range, &journal));

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);

    run_for(600).await;
    assert_eq!(coordinator.stats().commands_issued, 1);

    run_for(550).await;
    let stats = coordinator.stats();
    assert_eq!(stats.commands_issued, 2);
    assert_eq!(stats.queue.submitted, 2);

    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn approaching_danger_preempts_running_warning() {
    let journal = OutputJournal::new();
    // Priming read plus three cycles at 80 cm, then the median crosses to 45 cm
    let range = ScriptedRangeSource::distances([80.0, 80.0, 80.0, 80.0]).then_repeat(RangeStep::Distance(45.0));
    let mut coordinator = Coordinator::new(devices(range, &journal));

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);
    run_for(700).await;

    let audio = journal.on(OutputChannel::Audio);
    assert_eq!(audio.len(), 2);
    assert_eq!(audio[0].content, "Obstacle at 80 centimeters");
    assert!(!audio[0].finished);
    assert_eq!(audio[1].content, "Warning! Obstacle at 45 centimeters");

    let stats = coordinator.stop().await;
    assert_eq!(stats.queue.preempted, 2);
}

#[tokio::test(start_paused = true)]
async fn notice_refused_during_danger_is_spoken_afterwards() {
    let journal = OutputJournal::new();
    // The echo vanishes while the Danger alert is still being spoken
    let range = ScriptedRangeSource::distances([45.0, 45.0]);
    let mut coordinator = Coordinator::new(devices(range, &journal));

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);
    run_for(8000).await;

    let said = spoken(&journal);
    assert_eq!(said.last().map(String::as_str), Some("Sensors unavailable"), "spoken: {said:?}");
    assert!(said[..said.len() - 1].iter().all(|m| m.starts_with("Warning! Obstacle at")));
    let stats = coordinator.stats();
    assert!(stats.queue.rejected >= 1);
    assert_eq!(stats.range_unavailable_episodes, 1);

    // Still one notice for the episode
    run_for(10_000).await;
    let stats = coordinator.stop().await;
    let notices = spoken(&journal).iter().filter(|m| *m == "Sensors unavailable").count();
    assert_eq!(notices, 1);
    assert_eq!(stats.range_unavailable_episodes, 1);
}

#[tokio::test(start_paused = true)]
async fn warning_refused_during_danger_follows_it() {
    let journal = OutputJournal::new();
    let range = ScriptedRangeSource::distances([45.0, 45.0]).then_repeat(RangeStep::Distance(80.0));
    let mut coordinator = Coordinator::new(devices(range, &journal));

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);

    // The Warning arrives while the 2.3 s Danger phrase is playing and is
    // refused; it must not wait out its 3 s cooldown before being heard
    run_for(2900).await;
    let said = spoken(&journal);
    assert_eq!(said.len(), 2, "spoken: {said:?}");
    assert_eq!(said[0], "Warning! Obstacle at 45 centimeters");
    assert_eq!(said[1], "Obstacle at 80 centimeters");
    assert_eq!(coordinator.hazard().severity, Severity::Warning);

    let stats = coordinator.stop().await;
    assert!(stats.queue.rejected >= 1);
}

// ============================================================================
// Vision
// ============================================================================

#[tokio::test(start_paused = true)]
async fn confident_close_detection_warns_without_range() {
    let journal = OutputJournal::new();
    let range = steady(200.0);
    let vision = repeating(VisionStep::single("person", 0.9, Some(90.0)));
    let mut coordinator = Coordinator::new(devices(range, &journal).with_vision(vision));

    tokio_test::assert_ok!(coordinator.start(CanneConfig::default()).await);
    run_for(500).await;

    let hazard = coordinator.hazard();
    assert_eq!(hazard.severity, Severity::Warning);
    assert_eq!(hazard.object_label.as_deref(), Some("person"));
    assert_eq!(hazard.distance_cm, Some(90.0));
    assert_eq!(spoken(&journal), vec!["person ahead"]);

    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn range_danger_is_labelled_by_current_detection() {
    let journal = OutputJournal::new();
    let range = steady(40.0);
    let vision = repeating(VisionStep::single("bicycle", 0.7, None));
    let mut coordinator = Coordinator::new(devices(range, &journal).with_vision(vision));

    tokio_test::assert_ok!(coordinator.start(CanneConfig::default()).await);
    run_for(500).await;

    assert_eq!(coordinator.hazard().severity, Severity::Danger);
    assert_eq!(spoken(&journal), vec!["Warning! bicycle at 40 centimeters"]);

    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn distant_detections_are_summarised_as_info() {
    let journal = OutputJournal::new();
    let range = steady(250.0);
    let vision = repeating(VisionStep::Frame(vec![
        ("chair".to_string(), 0.6, Some(240.0)),
        ("person".to_string(), 0.55, None),
        ("cup".to_string(), 0.2, Some(100.0)),
    ]));
    let mut coordinator = Coordinator::new(devices(range, &journal).with_vision(vision));

    tokio_test::assert_ok!(coordinator.start(CanneConfig::default()).await);
    run_for(500).await;

    assert_eq!(coordinator.hazard().severity, Severity::Info);
    assert_eq!(spoken(&journal), vec!["Detected: a chair and a person."]);

    coordinator.stop().await;
}

// ============================================================================
// Degraded devices
// ============================================================================

#[tokio::test(start_paused = true)]
async fn stuck_range_sensor_does_not_stall_the_loop() {
    let journal = OutputJournal::new();
    let range = ScriptedRangeSource::new([RangeStep::NoEcho]).then_repeat(RangeStep::Stall(Duration::from_secs(30)));
    let mut coordinator = Coordinator::new(devices(range, &journal));

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);
    run_for(1000).await;

    let stats = coordinator.stats();
    assert!(stats.range_cycles >= 5, "only {} range cycles", stats.range_cycles);
    assert_eq!(stats.range_read_errors, stats.range_cycles);

    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn runtime_sensor_failure_degrades_to_missing_echo() {
    let journal = OutputJournal::new();
    let range = ScriptedRangeSource::distances([120.0])
        .then_repeat(RangeStep::Error(SensorError::Fatal("transducer open circuit".to_string())));
    let mut coordinator = Coordinator::new(devices(range, &journal));

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);
    run_for(1500).await;

    assert_eq!(coordinator.status(), CoordinatorStatus::Running);
    let stats = coordinator.stats();
    assert_eq!(stats.range_unavailable_episodes, 1);
    assert_eq!(spoken(&journal), vec!["Sensors unavailable"]);

    coordinator.stop().await;
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn lifecycle_transitions_are_published() {
    let journal = OutputJournal::new();
    let range = steady(150.0);
    let mut coordinator = Coordinator::new(devices(range, &journal));
    let status = coordinator.subscribe_status();
    assert_eq!(*status.borrow(), CoordinatorStatus::Starting);

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);
    assert_eq!(*status.borrow(), CoordinatorStatus::Running);
    assert!(coordinator.stats().started_at.is_some());

    let stats = coordinator.stop().await;
    assert_eq!(*status.borrow(), CoordinatorStatus::Stopped);
    assert_eq!(stats.status, CoordinatorStatus::Stopped);

    // Idempotent
    let again = coordinator.stop().await;
    assert_eq!(again.status, CoordinatorStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn hazard_subscribers_see_escalation() {
    let journal = OutputJournal::new();
    let range = steady(30.0);
    let mut coordinator = Coordinator::new(devices(range, &journal));
    let mut hazard = coordinator.subscribe_hazard();

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);
    tokio_test::assert_ok!(hazard.changed().await);
    assert_eq!(hazard.borrow().severity, Severity::Danger);
    assert_eq!(hazard.borrow().distance_cm, Some(30.0));

    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn fatal_range_sensor_aborts_startup() {
    let journal = OutputJournal::new();
    let range = ScriptedRangeSource::new([RangeStep::Error(SensorError::Fatal("i2c bus gone".to_string()))]);
    let reads = range.read_counter();
    let mut coordinator = Coordinator::new(devices(range, &journal));

    let err = coordinator.start(range_only_config()).await.unwrap_err();
    assert!(
        matches!(&err, StartupError::SensorFatal { source_name, reason } if source_name == "scripted-range" && reason == "i2c bus gone"),
        "unexpected error: {err}"
    );
    assert_eq!(coordinator.status(), CoordinatorStatus::Stopped);

    run_for(500).await;
    assert_eq!(reads.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn fatal_camera_aborts_startup() {
    let journal = OutputJournal::new();
    let range = steady(150.0);
    let vision = ScriptedVisionSource::new([VisionStep::Error(SensorError::Fatal("no camera".to_string()))]);
    let mut coordinator = Coordinator::new(devices(range, &journal).with_vision(vision));

    let err = coordinator.start(CanneConfig::default()).await.unwrap_err();
    assert!(matches!(err, StartupError::SensorFatal { .. }));
    assert_eq!(coordinator.status(), CoordinatorStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn camera_timeout_at_startup_is_tolerated() {
    let journal = OutputJournal::new();
    let range = steady(150.0);
    let vision = ScriptedVisionSource::new([VisionStep::Stall(Duration::from_secs(10))]);
    let mut coordinator = Coordinator::new(devices(range, &journal).with_vision(vision));

    tokio_test::assert_ok!(coordinator.start(CanneConfig::default()).await);
    assert_eq!(coordinator.status(), CoordinatorStatus::Running);
    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn invalid_config_is_rejected_at_start() {
    let journal = OutputJournal::new();
    let mut coordinator = Coordinator::new(devices(ScriptedRangeSource::new([RangeStep::NoEcho]), &journal));

    let mut config = range_only_config();
    config.range.danger_distance_cm = 120.0;
    config.range.warning_distance_cm = 100.0;

    let err = coordinator.start(config).await.unwrap_err();
    assert!(matches!(err, StartupError::Config(ConfigError::Validation(_))));
    assert_eq!(coordinator.status(), CoordinatorStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn second_start_is_refused() {
    let journal = OutputJournal::new();
    let range = steady(150.0);
    let mut coordinator = Coordinator::new(devices(range, &journal));

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);
    let err = coordinator.start(range_only_config()).await.unwrap_err();
    assert!(matches!(err, StartupError::AlreadyStarted));
    assert_eq!(coordinator.status(), CoordinatorStatus::Running);

    coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_cuts_off_long_speech_after_grace() {
    let journal = OutputJournal::new();
    let range = steady(45.0);
    let mut coordinator = Coordinator::new(devices(range, &journal));

    let mut config = range_only_config();
    config.feedback.drain_grace_ms = 200;
    tokio_test::assert_ok!(coordinator.start(config).await);
    run_for(100).await;

    let stopping = tokio::time::Instant::now();
    let stats = coordinator.stop().await;
    assert!(stopping.elapsed() <= Duration::from_millis(250));
    assert!(!journal.on(OutputChannel::Audio)[0].finished);
    assert!(stats.queue.abandoned >= 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_vision_never_polls_the_camera() {
    let journal = OutputJournal::new();
    let vision = repeating(VisionStep::single("person", 0.95, Some(60.0)));
    let polls = vision.poll_counter();
    let mut coordinator = Coordinator::new(devices(steady(150.0), &journal).with_vision(vision));

    tokio_test::assert_ok!(coordinator.start(range_only_config()).await);
    run_for(3000).await;

    assert_eq!(polls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(coordinator.hazard().severity, Severity::None);
    let stats = coordinator.stop().await;
    assert_eq!(stats.vision_cycles, 0);
}
