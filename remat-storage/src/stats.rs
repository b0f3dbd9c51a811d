//! Latency and outcome reporting seam.

use std::time::Instant;

/// Sample rate used for every rematerialization event.
pub const FULL_SAMPLE_RATE: u8 = 100;

/// Fire-and-forget latency sink.
///
/// Implementations must never block the fetch path for long and must swallow
/// their own failures.
pub trait StatsSink: Send + Sync {
    /// Record the time elapsed since `start` under `metric_name`.
    ///
    /// `note` carries the error message for failure outcomes and is empty on
    /// success. `sample_rate_percent` is in `0..=100`.
    fn report_latency(&self, metric_name: &str, start: Instant, note: &str, sample_rate_percent: u8);
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn report_latency(&self, _metric_name: &str, _start: Instant, _note: &str, _rate: u8) {}
}

/// Outcome of one fetch, as reported to the stats sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchEvent {
    /// Query answered, row present or not.
    Success,
    Timeout,
    Transport,
    NoHost,
    /// Any other failure inside the fetch body.
    Error,
}

impl FetchEvent {
    pub fn suffix(&self) -> &'static str {
        match self {
            FetchEvent::Success => "query_ms",
            FetchEvent::Timeout => "query_timeout",
            FetchEvent::Transport => "transport_exception",
            FetchEvent::NoHost => "nohost_exception",
            FetchEvent::Error => "fetch_error",
        }
    }

    /// `<backend>_<suffix>`, e.g. `postgres_query_ms`.
    pub fn metric_name(&self, backend: &str) -> String {
        format!("{}_{}", backend, self.suffix())
    }
}

/// Decide whether an event at `sample_rate_percent` is recorded.
pub fn sampled(sample_rate_percent: u8) -> bool {
    match sample_rate_percent {
        0 => false,
        rate if rate >= 100 => true,
        rate => rand::random_range(0..100u8) < rate,
    }
}
