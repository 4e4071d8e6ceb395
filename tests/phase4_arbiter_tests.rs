use std::time::{Duration, Instant};

use wayfinder::kernel::arbiter::{preempts, Arbiter, ArbiterCore, SubmitOutcome};
use wayfinder::kernel::config::ArbiterConfig;
use wayfinder::kernel::event::{
    DetectionEvent, DetectionKind, DirectionHint, Event, EventSource, PowerEvent, PowerNotice,
    PowerState, ProximityEdge, ProximityEvent, Severity,
};

const MAX_LATENCY: Duration = Duration::from_millis(200);

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn core(reannounce_ms: u64, depth: usize) -> ArbiterCore {
    let config = ArbiterConfig { reannounce_interval_ms: reannounce_ms, max_queue_depth: depth };
    ArbiterCore::new(&config, MAX_LATENCY)
}

fn obstacle(at: Instant, distance_cm: f32) -> Event {
    Event::proximity(
        at,
        Severity::Critical,
        ProximityEvent { edge: ProximityEdge::Entered { distance_cm }, direction: None },
    )
}

fn path_clear(at: Instant) -> Event {
    Event::proximity(
        at,
        Severity::Info,
        ProximityEvent { edge: ProximityEdge::Cleared { distance_cm: 150.0 }, direction: None },
    )
}

fn seen(at: Instant, label: &str, severity: Severity) -> Event {
    let kind = if severity == Severity::Info { DetectionKind::Object } else { DetectionKind::Sign };
    Event::detection(
        at,
        severity,
        DetectionEvent { label: label.to_string(), confidence: 0.9, kind, distance_cm: None, late: false },
    )
}

fn battery(at: Instant, state: PowerState, severity: Severity) -> Event {
    Event::power(at, severity, PowerEvent { level_pct: 50.0, state, notice: PowerNotice::Transition })
}

#[test]
fn test_phase4_1_single_announcement_in_flight() {
    let mut arbiter = core(3000, 16);
    let t0 = Instant::now();
    arbiter.submit(seen(t0, "person", Severity::Info));
    arbiter.submit(seen(t0 + ms(1), "car", Severity::Info));

    // 1. First hand-off occupies the slot.
    let first = arbiter.next_announcement(t0 + ms(2)).expect("first");
    assert_eq!(arbiter.in_flight(), Some(first.id));
    assert!(arbiter.next_announcement(t0 + ms(3)).is_none(), "slot is busy");

    // 2. Completion frees it.
    assert!(arbiter.complete(first.id));
    let second = arbiter.next_announcement(t0 + ms(4)).expect("second");
    assert_ne!(first.id, second.id);
    assert_eq!(arbiter.stats().announced, 2);
}

#[test]
fn test_phase4_2_critical_obstacle_preempts_detection() {
    let mut arbiter = core(3000, 16);
    let t0 = Instant::now();
    arbiter.submit(seen(t0, "stop", Severity::Warning));
    let sign = arbiter.next_announcement(t0).expect("sign");

    // 1. Obstacle arrives mid-sentence.
    let outcome = arbiter.submit(obstacle(t0 + ms(50), 60.0));
    assert_eq!(outcome, SubmitOutcome::Queued { preempted: Some(sign.id) });
    assert_eq!(arbiter.in_flight(), None);

    // 2. The preempted announcement is gone, not re-queued.
    let next = arbiter.next_announcement(t0 + ms(51)).expect("obstacle");
    assert_eq!(next.priority, Severity::Critical);
    assert_eq!(next.text, "Obstacle detected at 60 centimeters");
    assert_eq!(next.deadline, t0 + ms(50) + MAX_LATENCY);
    assert!(!arbiter.complete(sign.id), "stale completion is ignored");
    assert!(arbiter.complete(next.id));
    assert!(arbiter.next_announcement(t0 + ms(52)).is_none());
    assert_eq!(arbiter.stats().preempted, 1);
}

#[test]
fn test_phase4_3_detection_never_preempts_obstacle() {
    let mut arbiter = core(3000, 16);
    let t0 = Instant::now();
    arbiter.submit(obstacle(t0, 40.0));
    let warning = arbiter.next_announcement(t0).expect("obstacle");

    let outcome = arbiter.submit(seen(t0 + ms(10), "stop", Severity::Warning));
    assert_eq!(outcome, SubmitOutcome::Queued { preempted: None });
    assert_eq!(arbiter.in_flight(), Some(warning.id));
}

#[test]
fn test_phase4_4_preemption_rules() {
    use EventSource::*;
    assert!(preempts((Severity::Warning, Detection), (Severity::Info, Detection)));
    assert!(preempts((Severity::Critical, Proximity), (Severity::Critical, Power)));
    assert!(!preempts((Severity::Critical, Power), (Severity::Critical, Proximity)));
    assert!(!preempts((Severity::Critical, Proximity), (Severity::Critical, Proximity)));
    assert!(!preempts((Severity::Info, Proximity), (Severity::Warning, Detection)));
}

#[test]
fn test_phase4_5_repeat_sign_within_interval_is_one_announcement() {
    let mut arbiter = core(5000, 16);
    let t0 = Instant::now();

    // 1. Second sighting while the first is still pending.
    assert!(matches!(arbiter.submit(seen(t0, "stop sign", Severity::Info)), SubmitOutcome::Queued { .. }));
    assert_eq!(arbiter.submit(seen(t0 + ms(200), "stop sign", Severity::Info)), SubmitOutcome::Suppressed);

    let only = arbiter.next_announcement(t0 + ms(210)).expect("one");
    arbiter.complete(only.id);

    // 2. Third sighting after it was spoken, still inside the interval.
    assert_eq!(arbiter.submit(seen(t0 + ms(900), "stop sign", Severity::Info)), SubmitOutcome::Suppressed);
    assert!(arbiter.next_announcement(t0 + ms(910)).is_none());
    assert_eq!(arbiter.stats().announced, 1);
    assert_eq!(arbiter.stats().suppressed, 2);

    // 3. Past the interval it is news again.
    assert!(matches!(
        arbiter.submit(seen(t0 + ms(5300), "stop sign", Severity::Info)),
        SubmitOutcome::Queued { .. }
    ));
}

#[test]
fn test_phase4_6_escalation_bypasses_dedup() {
    let mut arbiter = core(5000, 16);
    let t0 = Instant::now();

    arbiter.submit(seen(t0, "stop sign", Severity::Info));
    let first = arbiter.next_announcement(t0).expect("first");
    arbiter.complete(first.id);

    let outcome = arbiter.submit(seen(t0 + ms(200), "stop sign", Severity::Warning));
    assert!(matches!(outcome, SubmitOutcome::Queued { .. }), "higher severity is not a repeat");
    let second = arbiter.next_announcement(t0 + ms(201)).expect("second");
    assert_eq!(second.priority, Severity::Warning);
}

#[test]
fn test_phase4_7_overflow_sheds_oldest_lowest() {
    let mut arbiter = core(3000, 2);
    let t0 = Instant::now();

    arbiter.submit(seen(t0, "person", Severity::Info));
    arbiter.submit(seen(t0 + ms(1), "car", Severity::Info));

    // 1. A Warning pushes out the oldest Info.
    assert!(matches!(arbiter.submit(seen(t0 + ms(2), "stop", Severity::Warning)), SubmitOutcome::Queued { .. }));
    assert_eq!(arbiter.pending(), 2);

    // 2. An Info older than every pending Info is itself shed.
    assert_eq!(arbiter.submit(seen(t0, "bench", Severity::Info)), SubmitOutcome::Dropped);
    assert_eq!(arbiter.stats().dropped, 2);

    let first = arbiter.next_announcement(t0 + ms(3)).expect("warning");
    assert_eq!(first.text, "Road sign detected: stop");
    arbiter.complete(first.id);
    let second = arbiter.next_announcement(t0 + ms(4)).expect("survivor");
    assert_eq!(second.text, "Object detected: car");
}

#[test]
fn test_phase4_8_severity_then_arrival_order() {
    let mut arbiter = core(3000, 16);
    let t0 = Instant::now();

    // Submitted out of timestamp order on purpose.
    arbiter.submit(seen(t0 + ms(5), "bus", Severity::Info));
    arbiter.submit(seen(t0 + ms(1), "person", Severity::Info));
    arbiter.submit(battery(t0 + ms(1), PowerState::Normal, Severity::Info));
    arbiter.submit(path_clear(t0 + ms(1)));
    arbiter.submit(battery(t0 + ms(9), PowerState::Low, Severity::Warning));
    arbiter.submit(obstacle(t0 + ms(10), 70.0));

    let mut spoken = Vec::new();
    let mut now = t0 + ms(20);
    while let Some(next) = arbiter.next_announcement(now) {
        spoken.push(next.text.clone());
        arbiter.complete(next.id);
        now += ms(1);
    }

    assert_eq!(
        spoken,
        vec![
            "Obstacle detected at 70 centimeters",
            "Battery low, please recharge",
            "Path clear",
            "Battery restored",
            "Object detected: person",
            "Object detected: bus",
        ]
    );
}

#[test]
fn test_phase4_10_spoken_clear_rearms_obstacle() {
    let mut arbiter = core(3000, 16);
    let t0 = Instant::now();
    let speak = |arbiter: &mut ArbiterCore, event: Event, at: Instant| {
        let outcome = arbiter.submit(event);
        let next = arbiter.next_announcement(at).map(|a| {
            arbiter.complete(a.id);
            a.text
        });
        (outcome, next)
    };

    // 1. Obstacle, then the path clears, then a new obstacle a second later.
    let (_, first) = speak(&mut arbiter, obstacle(t0, 80.0), t0);
    assert_eq!(first.as_deref(), Some("Obstacle detected at 80 centimeters"));
    let (_, clear) = speak(&mut arbiter, path_clear(t0 + ms(500)), t0 + ms(500));
    assert_eq!(clear.as_deref(), Some("Path clear"));

    // 2. Well inside the re-announce interval, yet a fresh crossing.
    let (outcome, again) = speak(&mut arbiter, obstacle(t0 + ms(1000), 60.0), t0 + ms(1000));
    assert_eq!(outcome, SubmitOutcome::Queued { preempted: None });
    assert_eq!(again.as_deref(), Some("Obstacle detected at 60 centimeters"));

    // 3. Without an intervening clear the repeat is still suppressed.
    let (outcome, _) = speak(&mut arbiter, obstacle(t0 + ms(1200), 55.0), t0 + ms(1200));
    assert_eq!(outcome, SubmitOutcome::Suppressed);
}

#[test]
fn test_phase4_11_clear_rearms_only_its_own_direction() {
    let mut arbiter = core(3000, 16);
    let t0 = Instant::now();
    let facing = |at: Instant, edge: ProximityEdge, severity: Severity, dir: DirectionHint| {
        Event::proximity(at, severity, ProximityEvent { edge, direction: Some(dir) })
    };
    let entered = ProximityEdge::Entered { distance_cm: 70.0 };
    let cleared = ProximityEdge::Cleared { distance_cm: 130.0 };

    for (i, dir) in [DirectionHint::Left, DirectionHint::Right].into_iter().enumerate() {
        arbiter.submit(facing(t0 + ms(i as u64), entered, Severity::Critical, dir));
        let a = arbiter.next_announcement(t0 + ms(i as u64)).expect("obstacle");
        arbiter.complete(a.id);
    }

    // Left clears; only the left obstacle may be spoken again.
    arbiter.submit(facing(t0 + ms(10), cleared, Severity::Info, DirectionHint::Left));
    let a = arbiter.next_announcement(t0 + ms(10)).expect("clear");
    arbiter.complete(a.id);

    let left = arbiter.submit(facing(t0 + ms(20), entered, Severity::Critical, DirectionHint::Left));
    let right = arbiter.submit(facing(t0 + ms(20), entered, Severity::Critical, DirectionHint::Right));
    assert!(matches!(left, SubmitOutcome::Queued { .. }));
    assert_eq!(right, SubmitOutcome::Suppressed);
}

#[tokio::test]
async fn test_phase4_9_handle_signals_preemption_and_readiness() {
    let config = ArbiterConfig::default();
    let arbiter = Arbiter::new(&config, MAX_LATENCY);
    let mut preemptions = arbiter.preemptions();
    let t0 = Instant::now();

    // 1. Submission wakes a waiting consumer.
    let waiter = {
        let arbiter = arbiter.clone();
        tokio::spawn(async move { arbiter.ready().await })
    };
    arbiter.submit(seen(t0, "person", Severity::Info));
    tokio::time::timeout(ms(500), waiter).await.expect("woken").unwrap();

    let playing = arbiter.next_announcement(Instant::now()).expect("person");

    // 2. A Critical obstacle names the id that must stop.
    arbiter.submit(obstacle(Instant::now(), 30.0));
    assert!(preemptions.has_changed().unwrap());
    assert_eq!(*preemptions.borrow_and_update(), Some(playing.id));
    assert_eq!(arbiter.in_flight(), None);
    assert_eq!(arbiter.pending(), 1);
}
