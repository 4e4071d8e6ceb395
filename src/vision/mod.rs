pub mod nms;
pub mod pipeline;

pub use pipeline::{VisionMonitor, VisionStats};
