use serde::Serialize;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::kernel::arbiter::Arbiter;
use crate::kernel::config::{PipelineConfig, RangeConfig};
use crate::kernel::error::SensorFault;
use crate::kernel::event::{DirectionHint, Event, ProximityEdge, ProximityEvent, Severity};
use crate::kernel::throttle::ThrottleSignal;
use crate::kernel::time::Cadence;
use crate::sensors::RangeSensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ZoneState {
    Clear,
    Warning,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RangeStats {
    pub polls: u64,
    pub faults: u64,
    pub events: u64,
    pub degraded_episodes: u64,
}

/// Edge-triggered obstacle detector over one ultrasonic sensor.
///
/// Emits only when the reading crosses `warning_distance_cm`:
/// - Clear -> Warning when `distance < warning` (Critical)
/// - Warning -> Clear when `distance > warning` (Info)
///
/// A reading exactly at the boundary keeps the current state.
pub struct RangeMonitor {
    sensor: Box<dyn RangeSensor>,
    config: RangeConfig,
    cadence: Cadence,
    throttle: ThrottleSignal,
    direction: Option<DirectionHint>,

    state: ZoneState,
    last_distance: Option<f32>,
    consecutive_faults: u32,
    degraded: bool,
    stats: RangeStats,
}

impl RangeMonitor {
    pub fn new(
        sensor: impl RangeSensor + 'static,
        config: &PipelineConfig,
        throttle: ThrottleSignal,
    ) -> Self {
        let cadence = Cadence::new(config.range_period(), config.range.throttle_backoff)
            .with_ceiling(Duration::from_millis(config.range.poll_ceiling_ms));
        let direction = sensor.direction();
        Self {
            sensor: Box::new(sensor),
            config: config.range.clone(),
            cadence,
            throttle,
            direction,
            state: ZoneState::Clear,
            last_distance: None,
            consecutive_faults: 0,
            degraded: false,
            stats: RangeStats::default(),
        }
    }

    pub fn state(&self) -> ZoneState {
        self.state
    }

    /// Most recent valid sample.
    pub fn last_distance(&self) -> Option<f32> {
        self.last_distance
    }

    pub fn stats(&self) -> &RangeStats {
        &self.stats
    }

    /// Current polling period, stretched while the battery is low.
    pub fn period(&self) -> Duration {
        self.cadence.period(self.throttle.is_throttled())
    }

    /// One trigger/echo cycle.
    pub fn poll(&mut self, now: Instant) -> Option<Event> {
        let started = Instant::now();
        let mut reading = self.sensor.measure_cm();
        let timeout_ms = self.config.sensor_timeout_ms;
        if reading.is_ok() && started.elapsed() > Duration::from_millis(timeout_ms) {
            // Echo arrived too late to describe the present.
            reading = Err(SensorFault::Timeout { timeout_ms });
        }
        self.ingest(reading, now)
    }

    /// State machine step for one reading. Separate from `poll` so it can be
    /// driven without hardware.
    pub fn ingest(&mut self, reading: Result<f32, SensorFault>, now: Instant) -> Option<Event> {
        self.stats.polls += 1;

        let distance = match reading.and_then(|d| self.validate(d)) {
            Ok(d) => d,
            Err(fault) => return self.on_fault(fault, now),
        };

        self.consecutive_faults = 0;
        self.last_distance = Some(distance);

        let restored = std::mem::take(&mut self.degraded);
        if restored {
            info!("Ranging restored at {:.1}cm", distance);
        }

        // A zone crossing on the restoring reading outranks the restore notice.
        match self.zone_step(distance, now) {
            Some(event) => Some(event),
            None if restored => Some(self.emit(now, Severity::Info, ProximityEdge::Restored)),
            None => None,
        }
    }

    fn zone_step(&mut self, distance: f32, now: Instant) -> Option<Event> {
        let warning = self.config.warning_distance_cm;
        match self.state {
            ZoneState::Clear if distance < warning => {
                self.state = ZoneState::Warning;
                debug!("Obstacle at {:.1}cm (threshold {:.0}cm)", distance, warning);
                Some(self.emit(now, Severity::Critical, ProximityEdge::Entered { distance_cm: distance }))
            }
            ZoneState::Warning if distance > warning => {
                self.state = ZoneState::Clear;
                debug!("Path clear at {:.1}cm", distance);
                Some(self.emit(now, Severity::Info, ProximityEdge::Cleared { distance_cm: distance }))
            }
            _ => None,
        }
    }

    fn validate(&self, distance: f32) -> Result<f32, SensorFault> {
        let (min, max) = (self.config.min_distance_cm, self.config.max_distance_cm);
        if distance.is_finite() && (min..=max).contains(&distance) {
            Ok(distance)
        } else {
            Err(SensorFault::OutOfRange { value: distance, min, max })
        }
    }

    fn on_fault(&mut self, fault: SensorFault, now: Instant) -> Option<Event> {
        self.stats.faults += 1;
        self.consecutive_faults += 1;
        warn!(
            "Range sensor fault: {} (consecutive {}, total {})",
            fault, self.consecutive_faults, self.stats.faults
        );

        // Escalate once per streak.
        if !self.degraded && self.consecutive_faults >= self.config.fault_escalation {
            self.degraded = true;
            self.stats.degraded_episodes += 1;
            warn!("Ranging degraded after {} consecutive faults", self.consecutive_faults);
            let edge = ProximityEdge::Degraded { consecutive_faults: self.consecutive_faults };
            return Some(self.emit(now, Severity::Info, edge));
        }
        None
    }

    fn emit(&mut self, now: Instant, severity: Severity, edge: ProximityEdge) -> Event {
        self.stats.events += 1;
        Event::proximity(now, severity, ProximityEvent { edge, direction: self.direction })
    }

    /// Periodic driver. Returns final counters once `shutdown` fires.
    pub async fn run(mut self, arbiter: Arbiter, shutdown: CancellationToken) -> RangeStats {
        info!(
            "Range monitor started ({:?} period, {:?} direction)",
            self.cadence.base(),
            self.direction
        );
        let mut next = tokio::time::Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep_until(next) => {}
            }

            if let Some(event) = self.poll(Instant::now()) {
                arbiter.submit(event);
            }

            // Missed deadlines are skipped, not replayed.
            next = (next + self.period()).max(tokio::time::Instant::now());
        }

        info!("Range monitor stopped: {:?}", self.stats);
        self.stats
    }
}
