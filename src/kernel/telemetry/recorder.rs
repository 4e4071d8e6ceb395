use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::event::TelemetryEvent;
use super::metrics::{compute_snapshot, CycleCounters, LatencySample, PerformanceSnapshot};
use crate::kernel::event::{Announcement, EventSource};

/// Sliding window of announcement latencies plus running cycle counters.
///
/// Only latency samples occupy the window, so a burst of late or aborted
/// inference cycles never pushes them out.
#[derive(Debug)]
pub struct PerformanceRecorder {
    samples: VecDeque<LatencySample>,
    counters: CycleCounters,
    window: usize,
    budget: Duration,
}

impl PerformanceRecorder {
    pub fn new(window: usize, budget: Duration) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            counters: CycleCounters::default(),
            window,
            budget,
        }
    }

    pub fn note(&mut self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::Announced { source, latency_us, deadline_missed } => {
                if deadline_missed {
                    self.counters.deadline_misses += 1;
                }
                if self.samples.len() >= self.window {
                    self.samples.pop_front();
                }
                self.samples.push_back(LatencySample { source, latency_us });
            }
            TelemetryEvent::LateInferenceCycle { .. } => self.counters.late_cycles += 1,
            TelemetryEvent::InferenceTimeout => self.counters.inference_timeouts += 1,
        }
    }

    pub fn counters(&self) -> CycleCounters {
        self.counters
    }

    /// `announcement_timestamp - event_timestamp`, recorded against the budget.
    pub fn record(&mut self, event_timestamp: Instant, announcement_timestamp: Instant) -> Duration {
        self.record_from(None, event_timestamp, announcement_timestamp)
    }

    pub fn record_from(
        &mut self,
        source: Option<EventSource>,
        event_timestamp: Instant,
        announcement_timestamp: Instant,
    ) -> Duration {
        let latency = announcement_timestamp.saturating_duration_since(event_timestamp);
        self.note(TelemetryEvent::Announced {
            source,
            latency_us: latency.as_micros() as u64,
            deadline_missed: latency > self.budget,
        });
        latency
    }

    pub fn record_announcement(&mut self, announcement: &Announcement, handed_off: Instant) -> Duration {
        self.record_from(Some(announcement.source), announcement.event_timestamp, handed_off)
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        compute_snapshot(&self.samples, &self.counters, self.budget)
    }

    /// Drops the window and zeroes the counters.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.counters = CycleCounters::default();
    }
}

/// Shared handle so the speech driver and the vision monitor can both report.
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    inner: Arc<Mutex<PerformanceRecorder>>,
}

impl TelemetryHandle {
    pub fn new(recorder: PerformanceRecorder) -> Self {
        Self { inner: Arc::new(Mutex::new(recorder)) }
    }

    fn with<R>(&self, f: impl FnOnce(&mut PerformanceRecorder) -> R) -> R {
        let mut recorder = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut recorder)
    }

    pub fn note(&self, event: TelemetryEvent) {
        self.with(|r| r.note(event));
    }

    pub fn record_announcement(&self, announcement: &Announcement, handed_off: Instant) -> Duration {
        self.with(|r| r.record_announcement(announcement, handed_off))
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        self.with(|r| r.snapshot())
    }
}
