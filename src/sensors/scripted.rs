use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{Detector, RangeSensor, RawDetection, SignClassifier};
use crate::kernel::error::{InferenceError, SensorFault};
use crate::kernel::event::DirectionHint;

/// Replays a fixed sequence of distance readings. Stands in for the
/// trigger/echo hardware in tests and the demo binary.
#[derive(Debug, Clone)]
pub struct ScriptedRange {
    readings: Vec<Result<f32, SensorFault>>,
    cursor: usize,
    looping: bool,
    direction: Option<DirectionHint>,
}

impl ScriptedRange {
    pub fn new(readings: impl IntoIterator<Item = f32>) -> Self {
        Self::with_faults(readings.into_iter().map(Ok))
    }

    pub fn with_faults(readings: impl IntoIterator<Item = Result<f32, SensorFault>>) -> Self {
        Self { readings: readings.into_iter().collect(), cursor: 0, looping: false, direction: None }
    }

    /// Restart from the first reading once exhausted.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn facing(mut self, direction: DirectionHint) -> Self {
        self.direction = Some(direction);
        self
    }
}

impl RangeSensor for ScriptedRange {
    fn measure_cm(&mut self) -> Result<f32, SensorFault> {
        if self.cursor >= self.readings.len() {
            if !self.looping || self.readings.is_empty() {
                return Err(SensorFault::Unavailable("script exhausted".to_string()));
            }
            self.cursor = 0;
        }
        let reading = self.readings[self.cursor].clone();
        self.cursor += 1;
        reading
    }

    fn direction(&self) -> Option<DirectionHint> {
        self.direction
    }
}

type DetectionFrame = Result<Vec<RawDetection>, InferenceError>;

/// Replays detection frames, optionally taking `latency` per call to exercise
/// the late-cycle and watchdog paths.
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    frames: Mutex<VecDeque<DetectionFrame>>,
    latency: Duration,
}

impl ScriptedDetector {
    pub fn new(frames: impl IntoIterator<Item = Vec<RawDetection>>) -> Self {
        Self::with_results(frames.into_iter().map(Ok))
    }

    pub fn with_results(frames: impl IntoIterator<Item = DetectionFrame>) -> Self {
        Self { frames: Mutex::new(frames.into_iter().collect()), latency: Duration::ZERO }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self) -> DetectionFrame {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        // An empty script is an empty scene.
        frames.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Debug, Default)]
pub struct ScriptedSigns {
    results: Mutex<VecDeque<Option<RawDetection>>>,
}

impl ScriptedSigns {
    pub fn new(results: impl IntoIterator<Item = Option<RawDetection>>) -> Self {
        Self { results: Mutex::new(results.into_iter().collect()) }
    }
}

impl SignClassifier for ScriptedSigns {
    fn classify(&self) -> Result<Option<RawDetection>, InferenceError> {
        let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(results.pop_front().flatten())
    }
}
