//! Top-level controller. Wires the monitors, the Arbiter and the speech
//! driver together and owns their lifetimes.
//!
//! Data flow is one-way: monitors -> Arbiter -> SpeechOutput. The only other
//! channel is the power side-channel (throttle + shutdown request).

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::arbiter::{Arbiter, ArbiterStats};
use super::config::PipelineConfig;
use super::error::ConfigError;
use super::event::{Event, PowerEvent, PowerNotice, Severity};
use super::speech::output::{Completion, SpeechEngine, SpeechOutput};
use super::telemetry::metrics::PerformanceSnapshot;
use super::telemetry::recorder::{PerformanceRecorder, TelemetryHandle};
use super::throttle::{power_channel, PowerPublisher, ThrottleSignal};
use crate::monitor::power::{PowerMonitor, PowerReport};
use crate::monitor::range::{RangeMonitor, RangeStats};
use crate::sensors::{BatterySource, Detector, RangeSensor, SignClassifier};
use crate::vision::{VisionMonitor, VisionStats};

/// Everything the pipeline reads from or speaks to.
pub struct Sources {
    /// One monitor per sensor.
    pub range: Vec<Box<dyn RangeSensor>>,
    pub detector: Arc<dyn Detector>,
    pub signs: Option<Arc<dyn SignClassifier>>,
    pub battery: Box<dyn BatterySource>,
    pub speech: Arc<dyn SpeechEngine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub session_id: Uuid,
    pub uptime_ms: u64,
    pub performance: PerformanceSnapshot,
    pub arbiter: ArbiterStats,
    pub range: Vec<RangeStats>,
    pub vision: VisionStats,
    pub power: PowerReport,
}

impl PipelineReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Serialize)]
struct StatusLine<'a> {
    session_id: &'a Uuid,
    throttled: bool,
    pending: usize,
    performance: PerformanceSnapshot,
    arbiter: ArbiterStats,
}

pub struct Reactor {
    config: PipelineConfig,
    sources: Sources,
    session_id: Uuid,
    arbiter: Arbiter,
    telemetry: TelemetryHandle,
    publisher: PowerPublisher,
    throttle: ThrottleSignal,
    shutdown_request: CancellationToken,
    shutdown: CancellationToken,
}

impl Reactor {
    pub fn new(config: PipelineConfig, sources: Sources) -> Result<Self, ConfigError> {
        config.validate()?;
        if sources.range.is_empty() {
            return Err(ConfigError::invalid("range", "at least one range sensor is required"));
        }

        let (publisher, throttle, shutdown_request) = power_channel();
        let arbiter = Arbiter::new(&config.arbiter, config.max_latency());
        let telemetry =
            TelemetryHandle::new(PerformanceRecorder::new(config.recorder.window, config.max_latency()));

        Ok(Self {
            config,
            sources,
            session_id: Uuid::new_v4(),
            arbiter,
            telemetry,
            publisher,
            throttle,
            shutdown_request,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn arbiter(&self) -> Arbiter {
        self.arbiter.clone()
    }

    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry.clone()
    }

    /// Fires once the battery reaches Critical. The caller decides when to
    /// act on it; the pipeline keeps running until `shutdown_handle` fires.
    pub fn shutdown_request(&self) -> CancellationToken {
        self.shutdown_request.clone()
    }

    /// Cancelling this stops every task and makes `run` return.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(self) -> PipelineReport {
        let Reactor {
            config,
            sources,
            session_id,
            arbiter,
            telemetry,
            publisher,
            throttle,
            shutdown_request: _,
            shutdown,
        } = self;
        let started = Instant::now();
        info!("Pipeline {} starting ({} range sensors)", session_id, sources.range.len());

        // 1. Power first: its opening sample decides whether we start throttled.
        let mut power = PowerMonitor::new(sources.battery, &config.power, publisher);
        if let Some(event) = power.sample(Instant::now()) {
            arbiter.submit(event);
        }
        let level_pct = power.status().level_pct.unwrap_or_default();
        arbiter.submit(Event::power(
            Instant::now(),
            Severity::Info,
            PowerEvent { level_pct, state: power.state(), notice: PowerNotice::SystemReady },
        ));

        // 2. Speech driver.
        let speech = SpeechOutput::new(sources.speech);
        if !speech.is_available() {
            warn!("Speech engine unavailable at startup; announcements will be retried");
        }
        let speech_task = tokio::spawn(speech_loop(
            arbiter.clone(),
            speech,
            telemetry.clone(),
            Duration::from_millis(config.speech_retry_ms),
            shutdown.clone(),
        ));

        // 3. Monitors.
        let power_task = tokio::spawn(power.run(arbiter.clone(), shutdown.clone()));
        let range_tasks: Vec<JoinHandle<RangeStats>> = sources
            .range
            .into_iter()
            .map(|sensor| {
                let monitor = RangeMonitor::new(sensor, &config, throttle.clone());
                tokio::spawn(monitor.run(arbiter.clone(), shutdown.clone()))
            })
            .collect();
        let vision = VisionMonitor::new(sources.detector, sources.signs, &config, throttle.clone())
            .with_telemetry(telemetry.clone());
        let vision_task = tokio::spawn(vision.run(arbiter.clone(), shutdown.clone()));

        // 4. Periodic status until shutdown.
        let period = Duration::from_millis(config.report_interval_ms.max(1));
        let mut cadence = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = cadence.tick() => {
                    let line = StatusLine {
                        session_id: &session_id,
                        throttled: throttle.is_throttled(),
                        pending: arbiter.pending(),
                        performance: telemetry.snapshot(),
                        arbiter: arbiter.stats(),
                    };
                    match serde_json::to_string(&line) {
                        Ok(json) => info!("Pipeline status: {}", json),
                        Err(e) => warn!("Could not render pipeline status: {}", e),
                    }
                }
            }
        }

        // 5. Collect.
        info!("Pipeline {} shutting down", session_id);
        let mut range = Vec::with_capacity(range_tasks.len());
        for task in range_tasks {
            range.push(joined(task, "range monitor").await);
        }
        let vision = joined(vision_task, "vision monitor").await;
        let power = joined(power_task, "power monitor").await;
        joined(speech_task, "speech driver").await;

        let report = PipelineReport {
            session_id,
            uptime_ms: started.elapsed().as_millis() as u64,
            performance: telemetry.snapshot(),
            arbiter: arbiter.stats(),
            range,
            vision,
            power,
        };
        info!(
            "Pipeline {} stopped after {}ms: {} announced, p95 {:.1}ms, budget met: {}",
            session_id,
            report.uptime_ms,
            report.arbiter.announced,
            report.performance.latency.p95_ms,
            report.performance.budget_met
        );
        report
    }
}

async fn joined<T: Default>(task: JoinHandle<T>, name: &str) -> T {
    match task.await {
        Ok(value) => value,
        Err(e) => {
            error!("{} task failed: {}", name, e);
            T::default()
        }
    }
}

/// Pulls from the Arbiter and plays one announcement at a time.
///
/// Latency is recorded at hand-off. A preemption or shutdown cancels the
/// current utterance; the slot is handed back only after playback stopped.
async fn speech_loop(
    arbiter: Arbiter,
    speech: SpeechOutput,
    telemetry: TelemetryHandle,
    retry: Duration,
    shutdown: CancellationToken,
) {
    let mut preemptions = arbiter.preemptions();

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        // Engine down: leave events in the Arbiter, where the depth bound sheds them.
        if !speech.is_available() {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(retry) => continue,
            }
        }

        let announcement = match arbiter.next_announcement(Instant::now()) {
            Some(announcement) => announcement,
            None => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = arbiter.ready() => {}
                }
                continue;
            }
        };

        let handed_off = Instant::now();
        let latency = telemetry.record_announcement(&announcement, handed_off);
        if handed_off > announcement.deadline {
            warn!(
                "{} ({:?}) started {:?} after its event, past the deadline",
                announcement.id, announcement.source, latency
            );
        }

        let completion = {
            let playback = speech.speak(&announcement);
            tokio::pin!(playback);
            loop {
                tokio::select! {
                    biased;
                    completion = &mut playback => break completion,
                    _ = shutdown.cancelled() => {
                        speech.cancel_current();
                    }
                    changed = preemptions.changed() => {
                        if changed.is_ok() && *preemptions.borrow_and_update() == Some(announcement.id) {
                            speech.cancel_current();
                        }
                    }
                }
            }
        };

        arbiter.complete(announcement.id);

        if completion == Completion::Failed {
            // SpeechUnavailable: the announcement is lost, the pipeline keeps going.
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(retry) => {}
            }
        }
    }

    speech.cancel_current();
    info!("Speech driver stopped");
}
