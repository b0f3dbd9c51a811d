//! REMAT Cassandra Backend
//!
//! [`CassandraAdapter`] implements [`remat_storage::BackendAdapter`] over a
//! `scylla` driver session speaking the CQL native protocol, so it serves
//! Apache Cassandra and ScyllaDB clusters alike. Metric names are prefixed
//! `cassandra_`.

pub mod adapter;
pub mod error;
pub mod session;
pub mod values;

use std::sync::Arc;

pub use adapter::{CassandraAdapter, CassandraPrepared};
pub use error::{
    classify_attempt_error, classify_db_error, classify_execution_error, classify_prepare_error,
    classify_session_error,
};
pub use session::{SessionSettings, LOCAL_DATACENTER_OPTION};
pub use values::{from_cql, to_cql};

use remat_core::{ColumnDescriptor, RematConfig, RematResult, SchemaMetadata};
use remat_storage::{Rematerializer, StatsSink};

/// Validate the table description and configure a rematerializer for
/// `keyspace.table_name`.
///
/// Fails only on invalid schema metadata or configuration. An unreachable
/// cluster yields a `Disconnected` instance.
pub async fn configure<S: AsRef<str>>(
    keyspace: &str,
    table_name: &str,
    columns: Vec<ColumnDescriptor>,
    primary_key: &[S],
    config: &RematConfig,
    stats: Arc<dyn StatsSink>,
) -> RematResult<Rematerializer<CassandraAdapter>> {
    let schema = SchemaMetadata::new(keyspace, table_name, columns, primary_key)?;
    let adapter = CassandraAdapter::from_config(config)?;
    Ok(Rematerializer::configure(schema, adapter, stats).await)
}
