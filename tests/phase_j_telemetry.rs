use std::time::{Duration, Instant};

use wayfinder::kernel::event::{Announcement, AnnouncementId, EventSource, Severity};
use wayfinder::kernel::telemetry::event::TelemetryEvent;
use wayfinder::kernel::telemetry::recorder::PerformanceRecorder;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn test_latency_summary_against_budget() {
    let mut recorder = PerformanceRecorder::new(64, ms(200));
    let t0 = Instant::now();

    assert_eq!(recorder.record(t0, t0 + ms(50)), ms(50));
    recorder.record(t0, t0 + ms(100));
    recorder.record(t0, t0 + ms(300));

    let snap = recorder.snapshot();
    assert_eq!(snap.latency.samples, 3);
    assert!(close(snap.latency.mean_ms, 150.0), "mean {}", snap.latency.mean_ms);
    assert!(close(snap.latency.p95_ms, 300.0), "nearest rank of 3 samples is the max");
    assert!(close(snap.latency.max_ms, 300.0));
    assert_eq!(snap.deadline_misses, 1);
    assert!(!snap.budget_met);
}

#[test]
fn test_budget_met_when_tail_fits() {
    let mut recorder = PerformanceRecorder::new(64, ms(200));
    let t0 = Instant::now();

    // 10, 20, ... 200ms
    for i in 1..=20 {
        recorder.record(t0, t0 + ms(10 * i));
    }

    let snap = recorder.snapshot();
    assert!(close(snap.latency.mean_ms, 105.0));
    assert!(close(snap.latency.p95_ms, 190.0));
    assert_eq!(snap.deadline_misses, 0, "exactly on budget is not a miss");
    assert!(snap.budget_met);
}

#[test]
fn test_empty_window_is_vacuously_within_budget() {
    let recorder = PerformanceRecorder::new(8, ms(200));
    let snap = recorder.snapshot();
    assert_eq!(snap.latency.samples, 0);
    assert!(snap.budget_met);
}

#[test]
fn test_window_evicts_oldest() {
    let mut recorder = PerformanceRecorder::new(4, ms(200));
    let t0 = Instant::now();

    // Two slow samples first, then four fast ones.
    recorder.record(t0, t0 + ms(900));
    recorder.record(t0, t0 + ms(900));
    for _ in 0..4 {
        recorder.record(t0, t0 + ms(20));
    }

    let snap = recorder.snapshot();
    assert_eq!(snap.latency.samples, 4);
    assert!(close(snap.latency.max_ms, 20.0), "slow samples aged out");
    assert!(snap.budget_met);

    recorder.clear();
    assert_eq!(recorder.snapshot().latency.samples, 0);
}

#[test]
fn test_per_source_breakdown_and_cycle_counters() {
    let mut recorder = PerformanceRecorder::new(64, ms(200));
    let t0 = Instant::now();
    let announcement = |source: EventSource| Announcement {
        id: AnnouncementId(0),
        text: String::new(),
        priority: Severity::Critical,
        source,
        event_timestamp: t0,
        deadline: t0 + ms(200),
    };

    recorder.record_announcement(&announcement(EventSource::Proximity), t0 + ms(30));
    recorder.record_announcement(&announcement(EventSource::Proximity), t0 + ms(50));
    recorder.record_announcement(&announcement(EventSource::Detection), t0 + ms(250));
    recorder.note(TelemetryEvent::LateInferenceCycle { overrun_us: 12_000 });
    recorder.note(TelemetryEvent::InferenceTimeout);

    let snap = recorder.snapshot();
    assert_eq!(snap.by_source.proximity.samples, 2);
    assert!(close(snap.by_source.proximity.mean_ms, 40.0));
    assert_eq!(snap.by_source.detection.samples, 1);
    assert_eq!(snap.by_source.power.samples, 0);
    assert_eq!(snap.deadline_misses, 1);
    assert_eq!(snap.late_cycles, 1);
    assert_eq!(snap.inference_timeouts, 1);
}

#[test]
fn test_cycle_notes_do_not_evict_latency_samples() {
    let mut recorder = PerformanceRecorder::new(8, ms(200));
    let t0 = Instant::now();

    recorder.record(t0, t0 + ms(40));
    for _ in 0..8 {
        recorder.note(TelemetryEvent::LateInferenceCycle { overrun_us: 5_000 });
    }
    recorder.note(TelemetryEvent::InferenceTimeout);

    let snap = recorder.snapshot();
    assert_eq!(snap.latency.samples, 1, "the announcement survives a burst of late cycles");
    assert!(close(snap.latency.max_ms, 40.0));
    assert_eq!(snap.late_cycles, 8);
    assert_eq!(snap.inference_timeouts, 1);
}

#[test]
fn test_counters_outlive_the_window() {
    let mut recorder = PerformanceRecorder::new(2, ms(200));
    let t0 = Instant::now();

    // Three misses, then enough fast samples to age them all out.
    for _ in 0..3 {
        recorder.record(t0, t0 + ms(500));
    }
    for _ in 0..2 {
        recorder.record(t0, t0 + ms(10));
    }

    let snap = recorder.snapshot();
    assert_eq!(snap.latency.samples, 2);
    assert!(snap.budget_met, "the window only holds fast samples now");
    assert_eq!(snap.deadline_misses, 3);
    assert_eq!(recorder.counters().deadline_misses, 3);

    recorder.clear();
    assert_eq!(recorder.snapshot().deadline_misses, 0);
}
