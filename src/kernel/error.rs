use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid configuration for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("malformed configuration document: {0}")]
    Parse(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

/// A ranging or battery reading that cannot be trusted. Always handled inside
/// the owning monitor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorFault {
    #[error("reading {value} outside valid range [{min}, {max}]")]
    OutOfRange { value: f32, min: f32, max: f32 },

    #[error("sensor did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("sensor unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("inference exceeded watchdog of {watchdog_ms}ms")]
    Timeout { watchdog_ms: u64 },

    #[error("inference backend failed: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpeechError {
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),

    #[error("speech engine failed: {0}")]
    Engine(String),
}
