use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ConfigError;

fn default_processing_fps() -> f64 {
    5.0
}

fn default_max_latency_ms() -> u64 {
    200
}

/// Static configuration for the whole pipeline. Every field has a default so a
/// partial document deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    #[serde(default = "default_processing_fps")]
    pub processing_fps: f64,
    /// End-to-end budget from event emission to announcement hand-off.
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,
    pub range: RangeConfig,
    pub vision: VisionConfig,
    pub power: PowerConfig,
    pub arbiter: ArbiterConfig,
    pub recorder: RecorderConfig,
    /// How often the reactor logs a performance report.
    pub report_interval_ms: u64,
    /// Back-off while the speech engine reports itself unavailable.
    pub speech_retry_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            processing_fps: default_processing_fps(),
            max_latency_ms: default_max_latency_ms(),
            range: RangeConfig::default(),
            vision: VisionConfig::default(),
            power: PowerConfig::default(),
            arbiter: ArbiterConfig::default(),
            recorder: RecorderConfig::default(),
            report_interval_ms: 10_000,
            speech_retry_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    pub min_distance_cm: f32,
    pub max_distance_cm: f32,
    pub warning_distance_cm: f32,
    /// Explicit poll period. `None` derives it from `processing_fps`.
    pub poll_interval_ms: Option<u64>,
    /// Throttled polling never gets slower than this.
    pub poll_ceiling_ms: u64,
    /// Multiplier (>= 1) applied to poll periods while throttled.
    pub throttle_backoff: f64,
    /// Consecutive faults before a degraded-mode event is emitted.
    pub fault_escalation: u32,
    /// Upper bound a single hardware read may take.
    pub sensor_timeout_ms: u64,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            min_distance_cm: 2.0,
            max_distance_cm: 400.0,
            warning_distance_cm: 100.0,
            poll_interval_ms: None,
            poll_ceiling_ms: 250,
            throttle_backoff: 2.0,
            fault_escalation: 3,
            sensor_timeout_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub sign_confidence_threshold: f32,
    pub classes_to_detect: Vec<String>,
    pub sign_classes: Vec<String>,
    /// Hard stop for a stuck inference call.
    pub inference_watchdog_ms: u64,
    /// Multiplier (>= 1) applied to the frame period while throttled.
    pub throttle_backoff: f64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        let classes = [
            "person",
            "bicycle",
            "car",
            "motorcycle",
            "bus",
            "truck",
            "traffic light",
            "stop sign",
            "parking meter",
            "bench",
        ];
        let signs = [
            "stop",
            "yield",
            "speed_limit",
            "no_entry",
            "one_way",
            "pedestrian_crossing",
            "school_zone",
            "construction",
        ];
        Self {
            confidence_threshold: 0.5,
            nms_threshold: 0.4,
            sign_confidence_threshold: 0.6,
            classes_to_detect: classes.iter().map(|c| c.to_string()).collect(),
            sign_classes: signs.iter().map(|c| c.to_string()).collect(),
            inference_watchdog_ms: 1000,
            throttle_backoff: 2.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    pub low_watermark_pct: f32,
    pub critical_watermark_pct: f32,
    /// Recovery to Normal requires level > low_watermark + hysteresis.
    pub hysteresis_pct: f32,
    pub sample_interval_ms: u64,
    pub capacity_mah: f32,
    pub draw_ma: f32,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            low_watermark_pct: 20.0,
            critical_watermark_pct: 10.0,
            hysteresis_pct: 5.0,
            sample_interval_ms: 5000,
            capacity_mah: 5000.0,
            draw_ma: 500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Minimum gap before the same (source, bucket) may be spoken again.
    pub reannounce_interval_ms: u64,
    /// Pending events beyond this are shed, oldest lowest-severity first.
    pub max_queue_depth: usize,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self { reannounce_interval_ms: 3000, max_queue_depth: 16 }
    }
}

impl ArbiterConfig {
    pub fn reannounce_interval(&self) -> Duration {
        Duration::from_millis(self.reannounce_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Sliding window length, in samples.
    pub window: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self { window: 512 }
    }
}

impl PipelineConfig {
    pub fn from_json_str(doc: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(doc).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn max_latency(&self) -> Duration {
        Duration::from_millis(self.max_latency_ms)
    }

    /// Frame period at the configured processing rate.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.processing_fps)
    }

    /// Unthrottled range poll period. Defaults to twice the frame rate.
    pub fn range_period(&self) -> Duration {
        match self.range.poll_interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.frame_period() / 2,
        }
    }

    /// Per-cycle inference budget. Half the end-to-end budget is reserved for
    /// arbitration and speech hand-off.
    pub fn inference_budget(&self) -> Duration {
        self.max_latency() / 2
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.processing_fps > 0.0 && self.processing_fps.is_finite()) {
            return Err(ConfigError::invalid("processing_fps", "must be a positive number"));
        }
        if self.max_latency_ms == 0 {
            return Err(ConfigError::invalid("max_latency_ms", "must be non-zero"));
        }

        let r = &self.range;
        if !(r.min_distance_cm < r.warning_distance_cm && r.warning_distance_cm < r.max_distance_cm)
        {
            return Err(ConfigError::invalid(
                "range.warning_distance_cm",
                format!(
                    "expected {} < {} < {}",
                    r.min_distance_cm, r.warning_distance_cm, r.max_distance_cm
                ),
            ));
        }
        if r.throttle_backoff < 1.0 {
            return Err(ConfigError::invalid("range.throttle_backoff", "must be >= 1"));
        }
        if r.poll_interval_ms == Some(0) {
            return Err(ConfigError::invalid("range.poll_interval_ms", "must be non-zero"));
        }
        if self.range_period() > Duration::from_millis(r.poll_ceiling_ms) {
            return Err(ConfigError::invalid(
                "range.poll_ceiling_ms",
                "ceiling is shorter than the base poll period",
            ));
        }
        if r.fault_escalation == 0 {
            return Err(ConfigError::invalid("range.fault_escalation", "must be non-zero"));
        }

        let v = &self.vision;
        for (field, value) in [
            ("vision.confidence_threshold", v.confidence_threshold),
            ("vision.nms_threshold", v.nms_threshold),
            ("vision.sign_confidence_threshold", v.sign_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, "must lie in [0, 1]"));
            }
        }
        if v.throttle_backoff < 1.0 {
            return Err(ConfigError::invalid("vision.throttle_backoff", "must be >= 1"));
        }
        if v.inference_watchdog_ms == 0 {
            return Err(ConfigError::invalid("vision.inference_watchdog_ms", "must be non-zero"));
        }

        let p = &self.power;
        if !(0.0 <= p.critical_watermark_pct
            && p.critical_watermark_pct < p.low_watermark_pct
            && p.low_watermark_pct + p.hysteresis_pct <= 100.0)
        {
            return Err(ConfigError::invalid(
                "power.low_watermark_pct",
                "expected 0 <= critical < low and low + hysteresis <= 100",
            ));
        }
        if p.hysteresis_pct < 0.0 {
            return Err(ConfigError::invalid("power.hysteresis_pct", "must be >= 0"));
        }
        if p.sample_interval_ms == 0 {
            return Err(ConfigError::invalid("power.sample_interval_ms", "must be non-zero"));
        }

        if self.arbiter.max_queue_depth == 0 {
            return Err(ConfigError::invalid("arbiter.max_queue_depth", "must be non-zero"));
        }
        if self.recorder.window == 0 {
            return Err(ConfigError::invalid("recorder.window", "must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.range_period(), Duration::from_millis(100));
        assert_eq!(config.inference_budget(), Duration::from_millis(100));
    }

    #[test]
    fn partial_document_fills_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{ "max_latency_ms": 150, "arbiter": { "reannounce_interval_ms": 5000 } }"#,
        )
        .unwrap();
        assert_eq!(config.max_latency_ms, 150);
        assert_eq!(config.arbiter.reannounce_interval_ms, 5000);
        assert_eq!(config.arbiter.max_queue_depth, 16);
        assert_eq!(config.range.warning_distance_cm, 100.0);
    }

    #[test]
    fn rejects_inverted_watermarks() {
        let mut config = PipelineConfig::default();
        config.power.critical_watermark_pct = 30.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_backoff_below_one() {
        let mut config = PipelineConfig::default();
        config.range.throttle_backoff = 0.5;
        assert!(config.validate().is_err());
    }
}
