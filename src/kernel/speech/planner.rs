use crate::kernel::event::{
    DetectionKind, Event, Payload, PowerNotice, PowerState, ProximityEdge,
};

/// Turns events into the words the user hears. Pure: no state, no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnouncementPlanner;

impl AnnouncementPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn phrase(&self, event: &Event) -> String {
        match &event.payload {
            Payload::Proximity(p) => {
                let direction = p.direction.map(|d| format!(" {}", d.as_phrase())).unwrap_or_default();
                match p.edge {
                    ProximityEdge::Entered { distance_cm } => {
                        format!("Obstacle detected at {} centimeters{}", distance_cm.round() as i64, direction)
                    }
                    ProximityEdge::Cleared { .. } => format!("Path clear{}", direction),
                    ProximityEdge::Degraded { .. } => "Distance sensor unreliable".to_string(),
                    ProximityEdge::Restored => "Distance sensor restored".to_string(),
                }
            }
            Payload::Detection(d) => {
                let base = match d.kind {
                    DetectionKind::Sign => format!("Road sign detected: {}", humanize(&d.label)),
                    DetectionKind::Object => format!("Object detected: {}", humanize(&d.label)),
                };
                match d.distance_cm {
                    Some(cm) => format!("{} at {} centimeters", base, cm.round() as i64),
                    None => base,
                }
            }
            Payload::Power(p) => match (p.notice, p.state) {
                (PowerNotice::SystemReady, _) => "Intelligent Eye system ready".to_string(),
                (PowerNotice::Transition, PowerState::Low) => "Battery low, please recharge".to_string(),
                (PowerNotice::Transition, PowerState::Critical) => {
                    "Critical battery level, shutting down".to_string()
                }
                (PowerNotice::Transition, PowerState::Normal) => "Battery restored".to_string(),
            },
        }
    }
}

/// `speed_limit` -> `speed limit`
fn humanize(label: &str) -> String {
    label.replace('_', " ")
}
