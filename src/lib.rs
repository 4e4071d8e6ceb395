pub mod kernel;
pub mod monitor;
pub mod outputs;
pub mod sensors;
pub mod vision;

// Re-export specific items if needed for convenient access
pub use kernel::config::PipelineConfig;
pub use kernel::reactor::{PipelineReport, Reactor, Sources};
