//! REMAT Storage - Rematerialization Orchestration
//!
//! The generic [`Rematerializer`], the [`BackendAdapter`] seam every backend
//! implements, latency stats sinks, and the in-memory wide-column backend.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(MemoryStore::new());
//! let adapter = MemoryAdapter::from_config(&config, store)?;
//! let remat = Rematerializer::configure(schema, adapter, Arc::new(PrometheusStats)).await;
//!
//! match remat.fetch(&[Value::BigInt(7)], 1).await? {
//!     Some(row) => cache.install(row),
//!     None => { /* absent, or timed out */ }
//! }
//! ```

pub mod adapter;
pub mod memory;
pub mod rematerializer;
pub mod stats;
pub mod telemetry;

pub use adapter::BackendAdapter;
pub use memory::{MemoryAdapter, MemoryPrepared, MemoryRow, MemoryStatement, MemoryStore};
pub use rematerializer::{FetchOutcome, Rematerializer};
pub use stats::{FetchEvent, NoopStats, StatsSink, FULL_SAMPLE_RATE};
pub use telemetry::{gather_text, init_tracing, PrometheusStats, RematMetrics, TelemetryConfig, METRICS};
