//! Telemetry for the caching allocator.
//!
//! Structured logging through `tracing` and allocator gauges through the
//! `metrics` facade. No exporter is installed here; the host process picks one.

mod logging;
mod metrics;

pub use logging::{config_from_env, init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{describe_metrics, record_allocator_stats};
