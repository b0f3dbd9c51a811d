//! REMAT PostgreSQL Backend
//!
//! [`PgAdapter`] implements [`remat_storage::BackendAdapter`] over a
//! `deadpool-postgres` pool. Primary-key values are bound with their exact
//! PostgreSQL types and every driver failure is classified before it reaches
//! the rematerializer.

pub mod adapter;
pub mod error;
pub mod params;
pub mod pool;

use std::sync::Arc;

pub use adapter::PgAdapter;
pub use error::{classify_pool_error, classify_query_error, classify_sql_state};
pub use params::{pg_type, PgParam};
pub use pool::{create_pool, APPLICATION_NAME_OPTION};

use remat_core::{ColumnDescriptor, RematConfig, RematResult, SchemaMetadata};
use remat_storage::{Rematerializer, StatsSink};

/// Validate the table description, build the pool and configure a
/// rematerializer for `schema_name.table_name`.
///
/// Fails only on invalid schema metadata or configuration. An unreachable
/// server yields a `Disconnected` instance.
pub async fn configure<S: AsRef<str>>(
    schema_name: &str,
    table_name: &str,
    columns: Vec<ColumnDescriptor>,
    primary_key: &[S],
    config: &RematConfig,
    stats: Arc<dyn StatsSink>,
) -> RematResult<Rematerializer<PgAdapter>> {
    let schema = SchemaMetadata::new(schema_name, table_name, columns, primary_key)?;
    let adapter = PgAdapter::from_config(config)?;
    Ok(Rematerializer::configure(schema, adapter, stats).await)
}
