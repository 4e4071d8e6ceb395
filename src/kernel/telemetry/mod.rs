//! Performance observation for the announcement pipeline.
//!
//! # SAFETY INVARIANT
//! Telemetry is a READ-ONLY side-effect layer.
//! It must **NEVER** be read inside arbitration or monitor decisions.
//! It exists solely to report whether the latency budget is being met.

pub mod event;
pub mod metrics;
pub mod recorder;
