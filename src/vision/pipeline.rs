use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::nms::non_max_suppression;
use crate::kernel::arbiter::Arbiter;
use crate::kernel::config::{PipelineConfig, VisionConfig};
use crate::kernel::error::InferenceError;
use crate::kernel::event::{DetectionEvent, DetectionKind, Event, Severity};
use crate::kernel::telemetry::event::TelemetryEvent;
use crate::kernel::telemetry::recorder::TelemetryHandle;
use crate::kernel::throttle::ThrottleSignal;
use crate::kernel::time::Cadence;
use crate::sensors::{BoundingBox, Detector, RawDetection, SignClassifier};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisionStats {
    pub cycles: u64,
    pub late_cycles: u64,
    /// Watchdog aborts plus backend-reported timeouts (InferenceTimeout).
    pub timeouts: u64,
    pub backend_faults: u64,
    /// Raw detections rejected by confidence, allow-list or NMS.
    pub filtered: u64,
    pub emitted: u64,
}

/// Rough range from box size, calibrated per object family.
pub fn estimate_distance_cm(label: &str, region: &BoundingBox) -> Option<f32> {
    let area = region.area();
    if area <= 0.0 {
        return None;
    }
    let root = area.sqrt();
    let estimate = match label.to_ascii_lowercase().as_str() {
        "person" | "bicycle" => (1000.0 / root).max(50.0),
        "car" | "truck" | "bus" => (2000.0 / root).max(100.0),
        _ => (800.0 / root).max(30.0),
    };
    Some(estimate)
}

type CycleOutput = (Vec<RawDetection>, Option<Result<Option<RawDetection>, InferenceError>>);
type CycleJob = JoinHandle<Result<CycleOutput, InferenceError>>;

/// Drives the camera/detector black box at its own cadence.
///
/// Throttling stretches the frame period only; thresholds never change.
pub struct VisionMonitor {
    detector: Arc<dyn Detector>,
    signs: Option<Arc<dyn SignClassifier>>,
    config: VisionConfig,
    cadence: Cadence,
    budget: Duration,
    watchdog: Duration,
    throttle: ThrottleSignal,
    telemetry: Option<TelemetryHandle>,
    /// Worker abandoned by the watchdog and still running.
    stalled: Option<CycleJob>,
    stats: VisionStats,
}

impl VisionMonitor {
    pub fn new(
        detector: Arc<dyn Detector>,
        signs: Option<Arc<dyn SignClassifier>>,
        config: &PipelineConfig,
        throttle: ThrottleSignal,
    ) -> Self {
        Self {
            detector,
            signs,
            cadence: Cadence::new(config.frame_period(), config.vision.throttle_backoff),
            budget: config.inference_budget(),
            watchdog: Duration::from_millis(config.vision.inference_watchdog_ms),
            config: config.vision.clone(),
            throttle,
            telemetry: None,
            stalled: None,
            stats: VisionStats::default(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryHandle) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn stats(&self) -> &VisionStats {
        &self.stats
    }

    pub fn period(&self) -> Duration {
        self.cadence.period(self.throttle.is_throttled())
    }

    /// One capture + inference cycle under the watchdog.
    ///
    /// The backends run on the blocking pool. A cycle that outlives the
    /// watchdog is abandoned and its results are never emitted. At most one
    /// worker is outstanding: while an abandoned one is still running, every
    /// cycle counts as a timeout without starting new work.
    pub async fn capture_and_infer(&mut self) -> Vec<Event> {
        let watchdog_ms = self.watchdog.as_millis() as u64;
        if let Some(stalled) = &self.stalled {
            if !stalled.is_finished() {
                debug!("Previous inference worker still busy, skipping frame");
                return self.on_inference_error(InferenceError::Timeout { watchdog_ms });
            }
            self.stalled = None;
        }

        let captured_at = Instant::now();
        let detector = Arc::clone(&self.detector);
        let signs = self.signs.clone();

        let mut job: CycleJob = tokio::task::spawn_blocking(move || -> Result<CycleOutput, InferenceError> {
            let objects = detector.detect()?;
            // Sign classification fails independently of object detection.
            let sign = signs.map(|s| s.classify());
            Ok((objects, sign))
        });

        let finished = tokio::time::timeout(self.watchdog, &mut job).await;
        let output = match finished {
            Err(_) => {
                self.stalled = Some(job);
                return self.on_inference_error(InferenceError::Timeout { watchdog_ms });
            }
            Ok(Err(join_err)) => {
                return self.on_inference_error(InferenceError::Backend(join_err.to_string()));
            }
            Ok(Ok(Err(e))) => return self.on_inference_error(e),
            Ok(Ok(Ok(output))) => output,
        };

        let (objects, sign) = output;
        let sign = match sign {
            Some(Ok(sign)) => sign,
            Some(Err(e)) => {
                self.count_fault(&e);
                None
            }
            None => None,
        };

        self.process_cycle(objects, sign, captured_at.elapsed(), captured_at)
    }

    fn count_fault(&mut self, error: &InferenceError) {
        match error {
            InferenceError::Timeout { .. } => {
                self.stats.timeouts += 1;
                if let Some(t) = &self.telemetry {
                    t.note(TelemetryEvent::InferenceTimeout);
                }
            }
            InferenceError::Backend(_) => self.stats.backend_faults += 1,
        }
        warn!(
            "Inference cycle aborted: {} (timeouts {}, faults {})",
            error, self.stats.timeouts, self.stats.backend_faults
        );
    }

    fn on_inference_error(&mut self, error: InferenceError) -> Vec<Event> {
        self.stats.cycles += 1;
        self.count_fault(&error);
        Vec::new()
    }

    /// Gating and suppression for one cycle's raw output. Pure apart from counters.
    ///
    /// Order: confidence + allow-list, then per-class NMS, then the sign
    /// result on its own threshold. Lateness flags results, never drops them.
    pub fn process_cycle(
        &mut self,
        objects: Vec<RawDetection>,
        sign: Option<RawDetection>,
        elapsed: Duration,
        captured_at: Instant,
    ) -> Vec<Event> {
        self.stats.cycles += 1;

        let late = elapsed > self.budget;
        if late {
            self.stats.late_cycles += 1;
            let overrun = elapsed - self.budget;
            debug!("Inference ran {:?} over its {:?} budget", overrun, self.budget);
            if let Some(t) = &self.telemetry {
                t.note(TelemetryEvent::LateInferenceCycle { overrun_us: overrun.as_micros() as u64 });
            }
        }

        let raw_count = objects.len();
        let gated: Vec<RawDetection> = objects
            .into_iter()
            .filter(|d| d.confidence >= self.config.confidence_threshold)
            .filter(|d| contains_label(&self.config.classes_to_detect, &d.label))
            .collect();
        let kept = non_max_suppression(gated, self.config.nms_threshold);
        self.stats.filtered += (raw_count - kept.len()) as u64;

        let mut events: Vec<Event> = kept
            .into_iter()
            .map(|d| {
                let distance_cm = estimate_distance_cm(&d.label, &d.region);
                Event::detection(
                    captured_at,
                    Severity::Info,
                    DetectionEvent {
                        label: d.label,
                        confidence: d.confidence,
                        kind: DetectionKind::Object,
                        distance_cm,
                        late,
                    },
                )
            })
            .collect();

        if let Some(s) = sign {
            if s.confidence >= self.config.sign_confidence_threshold
                && contains_label(&self.config.sign_classes, &s.label)
            {
                events.push(Event::detection(
                    captured_at,
                    Severity::Warning,
                    DetectionEvent {
                        label: s.label,
                        confidence: s.confidence,
                        kind: DetectionKind::Sign,
                        distance_cm: None,
                        late,
                    },
                ));
            } else {
                self.stats.filtered += 1;
            }
        }

        self.stats.emitted += events.len() as u64;
        events
    }

    pub async fn run(mut self, arbiter: Arbiter, shutdown: CancellationToken) -> VisionStats {
        info!("Vision monitor started ({:?} frame period, {:?} budget)", self.cadence.base(), self.budget);
        let mut next = tokio::time::Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep_until(next) => {}
            }

            let events = tokio::select! {
                _ = shutdown.cancelled() => break,
                events = self.capture_and_infer() => events,
            };
            for event in events {
                arbiter.submit(event);
            }

            // Slow inference pushes the next frame out rather than queueing frames.
            next = (next + self.period()).max(tokio::time::Instant::now());
        }

        info!("Vision monitor stopped: {:?}", self.stats);
        self.stats
    }
}

fn contains_label(allowed: &[String], label: &str) -> bool {
    allowed.iter().any(|a| a.eq_ignore_ascii_case(label))
}
