use std::sync::Arc;
use std::time::{Duration, Instant};

use wayfinder::kernel::arbiter::SubmitOutcome;
use wayfinder::kernel::config::PipelineConfig;
use wayfinder::kernel::error::ConfigError;
use wayfinder::kernel::event::{
    DetectionEvent, DetectionKind, Event, PowerState, ProximityEdge, ProximityEvent, Severity,
};
use wayfinder::outputs::MockSpeechEngine;
use wayfinder::sensors::{BoundingBox, RawDetection, ScriptedDetector, ScriptedRange, SimulatedBattery};
use wayfinder::{Reactor, Sources};

fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.processing_fps = 10.0;
    config.report_interval_ms = 100;
    config.speech_retry_ms = 20;
    config
}

fn sources(engine: Arc<MockSpeechEngine>, battery_pct: f32) -> Sources {
    let walk = [150.0, 150.0, 60.0, 60.0, 60.0, 60.0, 60.0, 60.0, 60.0, 60.0];
    Sources {
        range: vec![Box::new(ScriptedRange::new(walk))],
        detector: Arc::new(ScriptedDetector::new(vec![vec![RawDetection::new(
            "person",
            0.9,
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        )]])),
        signs: None,
        battery: Box::new(SimulatedBattery::new(battery_pct, 0.0)),
        speech: engine,
    }
}

#[tokio::test]
async fn test_pipeline_end_to_end() {
    let engine = MockSpeechEngine::shared(Duration::from_millis(5));
    let reactor = Reactor::new(fast_config(), sources(engine.clone(), 80.0)).unwrap();
    let session = reactor.session_id();
    let shutdown = reactor.shutdown_handle();
    let shutdown_request = reactor.shutdown_request();

    // 1. Let it run for a few range and vision cycles.
    let pipeline = tokio::spawn(reactor.run());
    tokio::time::sleep(Duration::from_millis(800)).await;
    shutdown.cancel();
    let report = tokio::time::timeout(Duration::from_secs(2), pipeline)
        .await
        .expect("pipeline stops on shutdown")
        .unwrap();

    // 2. Startup notice and the obstacle were spoken, one at a time.
    let texts = engine.texts();
    assert_eq!(texts.first().map(String::as_str), Some("Intelligent Eye system ready"));
    assert!(texts.iter().any(|t| t == "Obstacle detected at 60 centimeters"), "spoken: {:?}", texts);
    assert_eq!(texts.iter().filter(|t| t.starts_with("Obstacle")).count(), 1, "edge-triggered");
    assert_eq!(engine.max_concurrent(), 1);

    // 3. Report covers every component.
    assert_eq!(report.session_id, session);
    assert_eq!(report.range.len(), 1);
    assert!(report.range[0].polls >= 3);
    assert!(report.vision.cycles >= 1);
    assert_eq!(report.power.status.level_pct, Some(80.0));
    assert_eq!(report.power.status.state, PowerState::Normal);
    assert!(report.arbiter.announced >= 2);
    assert!(report.performance.latency.samples >= 2);
    assert!(!shutdown_request.is_cancelled());

    let json = report.to_json().unwrap();
    assert!(json.contains(&session.to_string()));
}

#[tokio::test]
async fn test_critical_battery_requests_shutdown() {
    let engine = MockSpeechEngine::shared(Duration::from_millis(5));
    let reactor = Reactor::new(fast_config(), sources(engine.clone(), 5.0)).unwrap();
    let shutdown = reactor.shutdown_handle();
    let shutdown_request = reactor.shutdown_request();

    let pipeline = tokio::spawn(reactor.run());
    tokio::time::timeout(Duration::from_secs(1), shutdown_request.cancelled())
        .await
        .expect("critical battery raises the request");

    // The controller lets the warning play before tearing down.
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.cancel();
    let report = pipeline.await.unwrap();

    assert_eq!(
        engine.texts().first().map(String::as_str),
        Some("Critical battery level, shutting down")
    );
    assert_eq!(report.power.status.state, PowerState::Critical);
    assert!(report.power.status.throttled);
}

/// Range sensor that never sees anything close, so the test owns every obstacle.
fn quiet_sources(engine: Arc<MockSpeechEngine>) -> Sources {
    let mut sources = sources(engine, 80.0);
    sources.range = vec![Box::new(ScriptedRange::new([150.0]).looping())];
    sources
}

async fn wait_for_line(engine: &MockSpeechEngine, prefix: &str, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if engine.texts().iter().any(|t| t.starts_with(prefix)) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    false
}

#[tokio::test]
async fn test_obstacle_cuts_off_detection_announcement() {
    // Slow enough that every line is still playing when the obstacle arrives.
    let engine = MockSpeechEngine::shared(Duration::from_millis(100));
    let reactor = Reactor::new(fast_config(), quiet_sources(engine.clone())).unwrap();
    let arbiter = reactor.arbiter();
    let shutdown = reactor.shutdown_handle();
    let pipeline = tokio::spawn(reactor.run());

    // 1. Wait for the person announcement to start playing.
    assert!(
        wait_for_line(&engine, "Object detected: person", Duration::from_secs(3)).await,
        "spoken: {:?}",
        engine.texts()
    );

    // 2. A Critical obstacle arrives mid-utterance.
    let submitted = Instant::now();
    let outcome = arbiter.submit(Event::proximity(
        submitted,
        Severity::Critical,
        ProximityEvent { edge: ProximityEdge::Entered { distance_cm: 40.0 }, direction: None },
    ));
    assert!(matches!(outcome, SubmitOutcome::Queued { preempted: Some(_) }));
    assert!(wait_for_line(&engine, "Obstacle detected", Duration::from_secs(1)).await);
    let waited = submitted.elapsed();

    shutdown.cancel();
    let report = pipeline.await.unwrap();

    // 3. It started well inside one cancellation bound and the detection was cut short.
    assert!(waited < Duration::from_millis(100), "obstacle started after {:?}", waited);
    let spoken = engine.spoken();
    let person = spoken.iter().find(|l| l.text.starts_with("Object detected: person")).unwrap();
    assert!(!person.finished, "detection playback was interrupted");
    assert_eq!(engine.max_concurrent(), 1);
    assert!(report.arbiter.preempted >= 1);
}

#[tokio::test]
async fn test_unavailable_engine_sheds_at_queue_bound() {
    let engine = MockSpeechEngine::shared(Duration::from_millis(5));
    engine.set_available(false);
    let mut config = fast_config();
    config.arbiter.max_queue_depth = 2;
    let reactor = Reactor::new(config, quiet_sources(engine.clone())).unwrap();
    let arbiter = reactor.arbiter();
    let shutdown = reactor.shutdown_handle();
    let pipeline = tokio::spawn(reactor.run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    // 1. Producers keep submitting; none of them waits on the dead engine.
    let started = Instant::now();
    for label in ["bench", "bus", "car", "truck", "bicycle", "motorcycle"] {
        arbiter.submit(Event::detection(
            Instant::now(),
            Severity::Info,
            DetectionEvent {
                label: label.to_string(),
                confidence: 0.9,
                kind: DetectionKind::Object,
                distance_cm: None,
                late: false,
            },
        ));
    }
    assert!(started.elapsed() < Duration::from_millis(20));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(arbiter.pending(), 2, "held at the bound");
    shutdown.cancel();
    let report = pipeline.await.unwrap();

    // 2. Nothing was spoken and the overflow was counted.
    assert!(engine.spoken().is_empty());
    assert_eq!(report.arbiter.announced, 0);
    assert!(report.arbiter.dropped >= 5, "dropped {}", report.arbiter.dropped);
}

#[test]
fn test_rejects_pipeline_without_range_sensor() {
    let engine = MockSpeechEngine::shared(Duration::from_millis(5));
    let mut sources = sources(engine, 80.0);
    sources.range.clear();

    let err = Reactor::new(fast_config(), sources).err().expect("no range sensor");
    assert!(matches!(err, ConfigError::Invalid { .. }));
}

#[test]
fn test_rejects_invalid_config() {
    let engine = MockSpeechEngine::shared(Duration::from_millis(5));
    let mut config = fast_config();
    config.power.critical_watermark_pct = 30.0;

    assert!(Reactor::new(config, sources(engine, 80.0)).is_err());
}
