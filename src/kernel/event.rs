use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Identity of one announcement. Monotonic per Arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnnouncementId(pub u64);

impl fmt::Display for AnnouncementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// Ordered: `Info < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    Proximity,
    Detection,
    Power,
}

impl EventSource {
    /// Fixed tie-break order: Proximity > Power > Detection.
    pub fn rank(self) -> u8 {
        match self {
            EventSource::Proximity => 2,
            EventSource::Power => 1,
            EventSource::Detection => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectionHint {
    Ahead,
    Left,
    Right,
}

impl DirectionHint {
    pub fn as_phrase(self) -> &'static str {
        match self {
            DirectionHint::Ahead => "ahead",
            DirectionHint::Left => "on the left",
            DirectionHint::Right => "on the right",
        }
    }
}

/// Which edge of the warning boundary a range reading crossed, or a change in
/// sensor health.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProximityEdge {
    /// Clear -> Warning. Always Critical.
    Entered { distance_cm: f32 },
    /// Warning -> Clear.
    Cleared { distance_cm: f32 },
    /// Consecutive faults crossed the escalation threshold.
    Degraded { consecutive_faults: u32 },
    /// First valid reading after a degraded period.
    Restored,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityEvent {
    pub edge: ProximityEdge,
    pub direction: Option<DirectionHint>,
}

impl ProximityEvent {
    pub fn distance_cm(&self) -> Option<f32> {
        match self.edge {
            ProximityEdge::Entered { distance_cm } | ProximityEdge::Cleared { distance_cm } => {
                Some(distance_cm)
            }
            ProximityEdge::Degraded { .. } | ProximityEdge::Restored => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionKind {
    Object,
    Sign,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub label: String,
    /// Already gated against the configured threshold by the VisionMonitor.
    pub confidence: f32,
    pub kind: DetectionKind,
    /// Rough range estimate from the bounding region, objects only.
    pub distance_cm: Option<f32>,
    /// The inference cycle that produced this ran over its time budget.
    pub late: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerState {
    Normal,
    Low,
    Critical,
}

impl Default for PowerState {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerNotice {
    /// Battery state machine changed state.
    Transition,
    /// Pipeline started; carried on the power channel as it has no sensor of its own.
    SystemReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerEvent {
    pub level_pct: f32,
    pub state: PowerState,
    pub notice: PowerNotice,
}

/// Closed set of payloads. Arbiter dispatch is exhaustive over this.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Proximity(ProximityEvent),
    Detection(DetectionEvent),
    Power(PowerEvent),
}

/// Immutable once created. Owned by the Arbiter from `submit` until it is
/// announced or discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub timestamp: Instant,
    pub severity: Severity,
    pub payload: Payload,
}

impl Event {
    pub fn proximity(timestamp: Instant, severity: Severity, event: ProximityEvent) -> Self {
        Self { timestamp, severity, payload: Payload::Proximity(event) }
    }

    pub fn detection(timestamp: Instant, severity: Severity, event: DetectionEvent) -> Self {
        Self { timestamp, severity, payload: Payload::Detection(event) }
    }

    pub fn power(timestamp: Instant, severity: Severity, event: PowerEvent) -> Self {
        Self { timestamp, severity, payload: Payload::Power(event) }
    }

    pub fn source(&self) -> EventSource {
        match self.payload {
            Payload::Proximity(_) => EventSource::Proximity,
            Payload::Detection(_) => EventSource::Detection,
            Payload::Power(_) => EventSource::Power,
        }
    }

    /// Label or threshold bucket used to key deduplication.
    pub fn bucket(&self) -> String {
        match &self.payload {
            Payload::Proximity(p) => {
                let edge = match p.edge {
                    ProximityEdge::Entered { .. } => "obstacle",
                    ProximityEdge::Cleared { .. } => "clear",
                    ProximityEdge::Degraded { .. } => "degraded",
                    ProximityEdge::Restored => "restored",
                };
                match p.direction {
                    Some(dir) => format!("{edge}:{dir:?}"),
                    None => edge.to_string(),
                }
            }
            Payload::Detection(d) => d.label.to_lowercase(),
            Payload::Power(p) => match p.notice {
                PowerNotice::SystemReady => "ready".to_string(),
                PowerNotice::Transition => format!("{:?}", p.state).to_lowercase(),
            },
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey { source: self.source(), bucket: self.bucket() }
    }

    /// Key whose dedup record this event releases once spoken. An announced
    /// "path clear" re-arms the obstacle edge for the same direction.
    pub fn rearmed_key(&self) -> Option<DedupKey> {
        match &self.payload {
            Payload::Proximity(p) if matches!(p.edge, ProximityEdge::Cleared { .. }) => {
                let bucket = match p.direction {
                    Some(dir) => format!("obstacle:{dir:?}"),
                    None => "obstacle".to_string(),
                };
                Some(DedupKey { source: EventSource::Proximity, bucket })
            }
            _ => None,
        }
    }
}

/// (source, label/bucket)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub source: EventSource,
    pub bucket: String,
}

/// One scheduled unit of audio output, derived from exactly one Event.
/// Consumed once by SpeechOutput, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub id: AnnouncementId,
    pub text: String,
    pub priority: Severity,
    pub source: EventSource,
    /// Emission time of the originating event.
    pub event_timestamp: Instant,
    pub deadline: Instant,
}
