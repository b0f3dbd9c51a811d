//! REMAT Core - Rematerialization Data Model
//!
//! Schema metadata, cell values, configuration, health state, error taxonomy
//! and select synthesis shared by every backend. No I/O lives here; the
//! orchestration is in `remat-storage` and drivers in the backend crates.

pub mod config;
pub mod error;
pub mod health;
pub mod query;
pub mod schema;
pub mod value;

pub use config::{BackendKind, RematConfig};
pub use error::{
    BackendError, BackendErrorKind, BindError, ConfigError, RematError, RematResult,
};
pub use health::HealthState;
pub use query::{select_by_primary_key, Dialect};
pub use schema::{ColumnDescriptor, SchemaMetadata};
pub use value::{DataType, DataTypeParseError, Value};

/// One rematerialized row, in cache column order.
pub type CacheRow = Vec<Value>;
