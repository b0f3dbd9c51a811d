//! REMAT Telemetry - Observability Infrastructure
//!
//! Prometheus metrics behind the [`crate::StatsSink`] seam and a
//! `tracing-subscriber` initializer for hosts that do not install their own.

pub mod metrics;
pub mod tracer;

pub use metrics::{gather_text, PrometheusStats, RematMetrics, METRICS};
pub use tracer::{init_tracing, TelemetryConfig};
