pub mod arbiter;
pub mod config;
pub mod error;
pub mod event;
pub mod reactor;
pub mod speech;
pub mod telemetry;
pub mod throttle;
pub mod time;
