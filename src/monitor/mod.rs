pub mod power;
pub mod range;

pub use power::{PowerMonitor, PowerReport, PowerStatus};
pub use range::{RangeMonitor, RangeStats, ZoneState};
