//! Telemetry and logging infrastructure
//!
//! Structured logging with tracing and per-frame pipeline timing.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogConfig};
pub use metrics::{PipelineStats, PipelineTimer};
