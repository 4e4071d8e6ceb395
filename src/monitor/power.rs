use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::kernel::arbiter::Arbiter;
use crate::kernel::config::PowerConfig;
use crate::kernel::event::{Event, PowerEvent, PowerNotice, PowerState, Severity};
use crate::kernel::throttle::PowerPublisher;
use crate::sensors::{BatteryReading, BatterySource};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PowerStats {
    pub samples: u64,
    pub faults: u64,
    pub transitions: u64,
}

/// Point-in-time battery view for reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PowerStatus {
    pub level_pct: Option<f32>,
    pub charging: bool,
    pub state: PowerState,
    pub throttled: bool,
    /// `None` while charging or before the first sample.
    pub estimated_hours_remaining: Option<f32>,
}

/// Final counters plus the last known battery view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PowerReport {
    pub status: PowerStatus,
    pub stats: PowerStats,
}

/// Battery state machine.
///
/// ```text
/// Normal --(< low)--> Low --(< critical)--> Critical
///    ^                 |                       |
///    +---(> low + hysteresis)------------------+
/// ```
///
/// Only transitions are emitted. Entering Critical raises the shutdown request.
pub struct PowerMonitor {
    source: Box<dyn BatterySource>,
    config: PowerConfig,
    publisher: PowerPublisher,
    state: PowerState,
    last: Option<BatteryReading>,
    stats: PowerStats,
}

/// Pure transition function. Returns the state after observing `level_pct`.
pub fn next_state(config: &PowerConfig, current: PowerState, level_pct: f32) -> PowerState {
    let recovered = level_pct > config.low_watermark_pct + config.hysteresis_pct;
    match current {
        PowerState::Normal if level_pct < config.critical_watermark_pct => PowerState::Critical,
        PowerState::Normal if level_pct < config.low_watermark_pct => PowerState::Low,
        PowerState::Normal => PowerState::Normal,
        PowerState::Low if level_pct < config.critical_watermark_pct => PowerState::Critical,
        PowerState::Low | PowerState::Critical if recovered => PowerState::Normal,
        other => other,
    }
}

impl PowerMonitor {
    pub fn new(
        source: impl BatterySource + 'static,
        config: &PowerConfig,
        publisher: PowerPublisher,
    ) -> Self {
        Self {
            source: Box::new(source),
            config: config.clone(),
            publisher,
            state: PowerState::Normal,
            last: None,
            stats: PowerStats::default(),
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn stats(&self) -> &PowerStats {
        &self.stats
    }

    pub fn status(&self) -> PowerStatus {
        let charging = self.last.map(|r| r.charging).unwrap_or(false);
        let estimated_hours_remaining = match self.last {
            Some(r) if !r.charging && self.config.draw_ma > 0.0 => {
                Some((r.level_pct / 100.0 * self.config.capacity_mah / self.config.draw_ma).max(0.0))
            }
            _ => None,
        };
        PowerStatus {
            level_pct: self.last.map(|r| r.level_pct),
            charging,
            state: self.state,
            throttled: self.state != PowerState::Normal,
            estimated_hours_remaining,
        }
    }

    /// Read the battery once. Faults are counted and swallowed.
    pub fn sample(&mut self, now: Instant) -> Option<Event> {
        match self.source.read() {
            Ok(reading) => self.ingest(reading, now),
            Err(fault) => {
                self.stats.faults += 1;
                warn!("Battery read failed: {} (total {})", fault, self.stats.faults);
                None
            }
        }
    }

    pub fn ingest(&mut self, reading: BatteryReading, now: Instant) -> Option<Event> {
        self.stats.samples += 1;
        self.last = Some(reading);

        let next = next_state(&self.config, self.state, reading.level_pct);
        if next == self.state {
            return None;
        }

        let previous = self.state;
        self.state = next;
        self.stats.transitions += 1;
        self.publisher.publish(next);

        let severity = match next {
            PowerState::Normal => {
                info!("Battery recovered: {:?} -> Normal at {:.1}%", previous, reading.level_pct);
                Severity::Info
            }
            PowerState::Low => {
                warn!("Battery low at {:.1}%, throttling monitors", reading.level_pct);
                Severity::Warning
            }
            PowerState::Critical => {
                warn!("Battery critical at {:.1}%, requesting shutdown", reading.level_pct);
                Severity::Critical
            }
        };

        Some(Event::power(
            now,
            severity,
            PowerEvent { level_pct: reading.level_pct, state: next, notice: PowerNotice::Transition },
        ))
    }

    /// Periodic driver. The first sample is left to the caller so startup can
    /// act on it before the loop begins.
    pub async fn run(mut self, arbiter: Arbiter, shutdown: CancellationToken) -> PowerReport {
        let period = Duration::from_millis(self.config.sample_interval_ms);
        info!("Power monitor started ({:?} period)", period);

        let mut cadence = interval_at(tokio::time::Instant::now() + period, period);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = cadence.tick() => {}
            }
            if let Some(event) = self.sample(Instant::now()) {
                arbiter.submit(event);
            }
        }

        info!("Power monitor stopped: {:?}", self.stats);
        PowerReport { status: self.status(), stats: self.stats }
    }
}
