//! Interfaces to the hardware and model black boxes.
//!
//! Each source is owned by exactly one monitor. Nothing here is shared across
//! tasks except the vision backends, which the VisionMonitor hands to a
//! blocking worker per cycle.

pub mod battery;
pub mod scripted;

use serde::{Deserialize, Serialize};

use crate::kernel::error::{InferenceError, SensorFault};
use crate::kernel::event::DirectionHint;

pub use battery::{SimulatedBattery, SysfsBattery};
pub use scripted::{ScriptedDetector, ScriptedRange, ScriptedSigns};

/// Ultrasonic ranging hardware. One call is one trigger/echo cycle and must
/// return within the sensor timeout.
pub trait RangeSensor: Send {
    fn measure_cm(&mut self) -> Result<f32, SensorFault>;

    /// Logical direction this sensor faces.
    fn direction(&self) -> Option<DirectionHint> {
        None
    }
}

impl<S: RangeSensor + ?Sized> RangeSensor for Box<S> {
    fn measure_cm(&mut self) -> Result<f32, SensorFault> {
        (**self).measure_cm()
    }

    fn direction(&self) -> Option<DirectionHint> {
        (**self).direction()
    }
}

/// Axis-aligned region in frame pixels, `(x1, y1)` top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// One (label, confidence, region) tuple from a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    pub region: BoundingBox,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, confidence: f32, region: BoundingBox) -> Self {
        Self { label: label.into(), confidence, region }
    }
}

/// Camera capture plus object detector. Called from a blocking worker thread.
pub trait Detector: Send + Sync {
    fn detect(&self) -> Result<Vec<RawDetection>, InferenceError>;
}

/// Road sign classifier run on the same frame cadence.
pub trait SignClassifier: Send + Sync {
    fn classify(&self) -> Result<Option<RawDetection>, InferenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub level_pct: f32,
    pub charging: bool,
}

pub trait BatterySource: Send {
    fn read(&mut self) -> Result<BatteryReading, SensorFault>;
}

impl<B: BatterySource + ?Sized> BatterySource for Box<B> {
    fn read(&mut self) -> Result<BatteryReading, SensorFault> {
        (**self).read()
    }
}
