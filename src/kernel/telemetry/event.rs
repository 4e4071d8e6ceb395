use serde::{Deserialize, Serialize};

use crate::kernel::event::EventSource;

// Allowed: sources, durations, counts.
// Forbidden: utterance text, labels, raw readings.

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    /// Announcement handed to SpeechOutput. `source` is `None` for bare
    /// timestamp pairs.
    Announced {
        source: Option<EventSource>,
        latency_us: u64,
        deadline_missed: bool,
    },

    /// Vision cycle finished over its per-cycle budget. Results were still emitted.
    LateInferenceCycle {
        overrun_us: u64,
    },

    /// Watchdog abandoned an inference cycle.
    InferenceTimeout,
}
