use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use crate::kernel::event::EventSource;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub mean_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceLatency {
    pub proximity: LatencyStats,
    pub power: LatencyStats,
    pub detection: LatencyStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub budget_ms: f64,
    /// Whole window, every source.
    pub latency: LatencyStats,
    pub by_source: SourceLatency,
    /// Running totals, not limited to the window.
    pub deadline_misses: u64,
    pub late_cycles: u64,
    pub inference_timeouts: u64,
    /// p95 over the window is within budget. Vacuously true with no samples.
    pub budget_met: bool,
}

fn stats(mut samples_us: Vec<u64>) -> LatencyStats {
    if samples_us.is_empty() {
        return LatencyStats::default();
    }
    samples_us.sort_unstable();
    let n = samples_us.len();
    let total: u64 = samples_us.iter().sum();
    // Nearest-rank percentile.
    let rank = ((n as f64) * 0.95).ceil() as usize;
    let p95 = samples_us[rank.clamp(1, n) - 1];
    let max = samples_us[n - 1];
    LatencyStats {
        samples: n,
        mean_ms: total as f64 / n as f64 / 1000.0,
        p95_ms: p95 as f64 / 1000.0,
        max_ms: max as f64 / 1000.0,
    }
}

/// One announcement latency held in the recorder's window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySample {
    pub source: Option<EventSource>,
    pub latency_us: u64,
}

/// Running totals since the recorder was created or last cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CycleCounters {
    pub deadline_misses: u64,
    pub late_cycles: u64,
    pub inference_timeouts: u64,
}

/// Pure aggregation over the latency window plus the running counters.
pub fn compute_snapshot(
    samples: &VecDeque<LatencySample>,
    counters: &CycleCounters,
    budget: Duration,
) -> PerformanceSnapshot {
    let mut all = Vec::with_capacity(samples.len());
    let mut proximity = Vec::new();
    let mut power = Vec::new();
    let mut detection = Vec::new();

    for sample in samples {
        all.push(sample.latency_us);
        match sample.source {
            Some(EventSource::Proximity) => proximity.push(sample.latency_us),
            Some(EventSource::Power) => power.push(sample.latency_us),
            Some(EventSource::Detection) => detection.push(sample.latency_us),
            None => {}
        }
    }

    let latency = stats(all);
    let budget_ms = budget.as_secs_f64() * 1000.0;
    PerformanceSnapshot {
        budget_ms,
        budget_met: latency.samples == 0 || latency.p95_ms <= budget_ms,
        latency,
        by_source: SourceLatency {
            proximity: stats(proximity),
            power: stats(power),
            detection: stats(detection),
        },
        deadline_misses: counters.deadline_misses,
        late_cycles: counters.late_cycles,
        inference_timeouts: counters.inference_timeouts,
    }
}
