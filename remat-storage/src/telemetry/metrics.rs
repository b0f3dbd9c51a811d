//! Prometheus Metrics Definitions
//!
//! Every stats event becomes one histogram observation and one counter
//! increment, labelled by the rematerialization metric name
//! (`postgres_query_ms`, `memory_query_timeout`, ...).

use std::time::Instant;

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use remat_core::{RematError, RematResult};

use crate::stats::{sampled, StatsSink};

/// Backend call latency buckets (seconds)
/// Covers: 0.5ms, 1ms, 2.5ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s
const BACKEND_LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0,
];

/// Global metrics instance - initialized on first use
pub static METRICS: Lazy<RematResult<RematMetrics>> = Lazy::new(RematMetrics::new);

/// Container for all rematerialization metrics.
#[derive(Clone)]
pub struct RematMetrics {
    /// Backend call duration histogram - labels: metric
    pub backend_latency_seconds: HistogramVec,

    /// Backend event counter - labels: metric
    pub backend_events_total: CounterVec,
}

impl RematMetrics {
    /// Create and register all metrics with the default Prometheus registry.
    pub fn new() -> RematResult<Self> {
        Ok(Self {
            backend_latency_seconds: register_histogram_vec!(
                "remat_backend_latency_seconds",
                "Latency of rematerialization backend calls in seconds",
                &["metric"],
                BACKEND_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| telemetry_error("remat_backend_latency_seconds", e))?,

            backend_events_total: register_counter_vec!(
                "remat_backend_events_total",
                "Total rematerialization backend events",
                &["metric"]
            )
            .map_err(|e| telemetry_error("remat_backend_events_total", e))?,
        })
    }

    /// Record one event.
    pub fn record(&self, metric_name: &str, duration_secs: f64) {
        self.backend_events_total
            .with_label_values(&[metric_name])
            .inc();
        self.backend_latency_seconds
            .with_label_values(&[metric_name])
            .observe(duration_secs);
    }
}

fn telemetry_error(name: &str, err: prometheus::Error) -> RematError {
    RematError::Telemetry {
        reason: format!("Failed to register {}: {}", name, err),
    }
}

/// [`StatsSink`] backed by the global [`METRICS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusStats;

impl PrometheusStats {
    pub fn new() -> Self {
        Self
    }
}

impl StatsSink for PrometheusStats {
    fn report_latency(&self, metric_name: &str, start: Instant, note: &str, sample_rate_percent: u8) {
        if !sampled(sample_rate_percent) {
            return;
        }
        match METRICS.as_ref() {
            Ok(metrics) => metrics.record(metric_name, start.elapsed().as_secs_f64()),
            Err(e) => tracing::debug!(error = %e, metric = metric_name, "Metrics unavailable"),
        }
        if !note.is_empty() {
            tracing::debug!(metric = metric_name, note, "Backend event");
        }
    }
}

/// Render all registered metrics in Prometheus text format.
pub fn gather_text() -> RematResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| RematError::Telemetry {
            reason: format!("Failed to encode metrics: {}", e),
        })?;
    String::from_utf8(buffer).map_err(|e| RematError::Telemetry {
        reason: format!("Metrics are not UTF-8: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::FULL_SAMPLE_RATE;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e))?;
        metrics.record("unit_query_ms", 0.002);
        Ok(())
    }

    #[test]
    fn test_prometheus_stats_records() -> Result<(), String> {
        let stats = PrometheusStats::new();
        let start = Instant::now();
        stats.report_latency("unit_query_timeout", start, "timed out", FULL_SAMPLE_RATE);
        stats.report_latency("unit_query_ms", start, "", 0);

        let text = gather_text().map_err(|e| e.to_string())?;
        assert!(text.contains("remat_backend_events_total"));
        assert!(text.contains("unit_query_timeout"));
        Ok(())
    }
}
