//! Cassandra backend adapter.

use std::time::Duration;

use async_trait::async_trait;
use remat_core::{
    BackendError, BindError, CacheRow, DataType, Dialect, RematConfig, RematResult, SchemaMetadata,
    Value,
};
use remat_storage::BackendAdapter;
use scylla::client::session::Session;
use scylla::statement::prepared::PreparedStatement;
use scylla::value::{CqlValue, Row};

use crate::error::{classify_execution_error, classify_prepare_error};
use crate::session::SessionSettings;
use crate::values::{from_cql, to_cql};

/// A prepared select plus the declared types of its key slots.
#[derive(Debug)]
pub struct CassandraPrepared {
    statement: PreparedStatement,
    key_types: Vec<DataType>,
}

impl CassandraPrepared {
    pub fn key_types(&self) -> &[DataType] {
        &self.key_types
    }
}

/// Adapter holding one driver session.
pub struct CassandraAdapter {
    settings: SessionSettings,
    session: Option<Session>,
    query_timeout: Duration,
}

impl CassandraAdapter {
    pub fn new(settings: SessionSettings) -> Self {
        let query_timeout = settings.config().query_timeout;
        Self {
            settings,
            session: None,
            query_timeout,
        }
    }

    /// Check the configuration. Does not connect.
    pub fn from_config(config: &RematConfig) -> RematResult<Self> {
        Ok(Self::new(SessionSettings::from_config(config)?))
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    fn session(&self) -> Result<&Session, BackendError> {
        self.session
            .as_ref()
            .ok_or_else(|| BackendError::transport("no open Cassandra session"))
    }
}

#[async_trait]
impl BackendAdapter for CassandraAdapter {
    type Prepared = CassandraPrepared;
    type Statement = Vec<Option<CqlValue>>;
    type Row = Row;

    fn name(&self) -> &str {
        "cassandra"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Cql
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn connect(&mut self) -> Result<bool, BackendError> {
        if self.is_connected() {
            return Ok(true);
        }
        self.session = Some(self.settings.connect().await?);
        Ok(true)
    }

    async fn disconnect(&mut self) {
        // Dropping the session closes every node connection.
        if self.session.take().is_some() {
            tracing::debug!("Closed Cassandra session");
        }
    }

    async fn prepare(
        &mut self,
        text: &str,
        schema: &SchemaMetadata,
    ) -> Result<Self::Prepared, BackendError> {
        let session = self.session()?;
        let statement = session
            .prepare(text)
            .await
            .map_err(|e| classify_prepare_error(&e))?;
        Ok(CassandraPrepared {
            statement,
            key_types: schema.pk_columns().map(|c| c.data_type).collect(),
        })
    }

    fn statement(&self, prepared: &Self::Prepared) -> Self::Statement {
        vec![None; prepared.key_types.len()]
    }

    fn bind(
        &self,
        statement: &mut Self::Statement,
        slot: usize,
        value: &Value,
        data_type: DataType,
    ) -> Result<(), BackendError> {
        let slots = statement.len();
        let target = statement
            .get_mut(slot)
            .ok_or(BindError::SlotOutOfRange { slot, slots })?;
        *target = to_cql(value, data_type)?;
        Ok(())
    }

    async fn execute(
        &mut self,
        prepared: &Self::Prepared,
        statement: Self::Statement,
    ) -> Result<Option<Self::Row>, BackendError> {
        let session = self.session()?;
        let result = tokio::time::timeout(
            self.query_timeout,
            session.execute_unpaged(&prepared.statement, statement),
        )
        .await
        .map_err(|_| {
            BackendError::timeout(format!(
                "no answer within {} ms",
                self.query_timeout.as_millis()
            ))
        })?
        .map_err(|e| classify_execution_error(&e))?;

        let rows = result
            .into_rows_result()
            .map_err(|e| BackendError::other(format!("select returned no rows result: {}", e)))?;
        rows.maybe_first_row::<Row>()
            .map_err(|e| BackendError::other(format!("cannot decode row: {}", e)))
    }

    fn map_row(&self, row: Self::Row, schema: &SchemaMetadata) -> Result<CacheRow, BackendError> {
        if row.columns.len() != schema.column_count() {
            return Err(BackendError::other(format!(
                "row has {} columns, {} expects {}",
                row.columns.len(),
                schema.qualified_name(),
                schema.column_count()
            )));
        }
        // The select projects columns in cache order.
        row.columns
            .into_iter()
            .zip(schema.columns())
            .map(|(cell, column)| from_cql(cell, column.data_type))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remat_core::{BackendErrorKind, BackendKind, ColumnDescriptor};

    fn adapter() -> CassandraAdapter {
        let config = RematConfig::new(BackendKind::Cassandra)
            .with_hostnames(["localhost"])
            .with_query_timeout(Duration::from_millis(250));
        CassandraAdapter::from_config(&config).unwrap()
    }

    fn schema() -> SchemaMetadata {
        SchemaMetadata::new(
            "bank",
            "accounts",
            vec![
                ColumnDescriptor::new("id", 1, DataType::BigInt),
                ColumnDescriptor::new("name", 2, DataType::Varchar),
                ColumnDescriptor::new("balance", 3, DataType::BigInt),
            ],
            &["id"],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_adapter_is_disconnected() {
        let mut adapter = adapter();
        assert_eq!(adapter.name(), "cassandra");
        assert_eq!(adapter.dialect(), Dialect::Cql);
        assert_eq!(adapter.query_timeout(), Duration::from_millis(250));
        assert!(!adapter.is_connected());

        adapter.disconnect().await;
        adapter.disconnect().await;
        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn test_prepare_without_session_is_transport() {
        let mut adapter = adapter();
        let err = adapter
            .prepare("SELECT id FROM bank.accounts WHERE id = ?", &schema())
            .await
            .unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Transport);
    }

    #[test]
    fn test_bind_fills_slots() {
        let adapter = adapter();
        let mut stmt: Vec<Option<CqlValue>> = vec![None; 2];

        adapter
            .bind(&mut stmt, 1, &Value::BigInt(7), DataType::BigInt)
            .unwrap();
        assert_eq!(stmt, vec![None, Some(CqlValue::BigInt(7))]);

        let err = adapter
            .bind(&mut stmt, 2, &Value::BigInt(7), DataType::BigInt)
            .unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Other);

        let err = adapter
            .bind(&mut stmt, 0, &Value::from("x"), DataType::Uuid)
            .unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Other);
    }

    #[test]
    fn test_map_row_in_cache_order() {
        let adapter = adapter();
        let row = Row {
            columns: vec![
                Some(CqlValue::BigInt(7)),
                Some(CqlValue::Text("A".to_string())),
                Some(CqlValue::Int(42)),
            ],
        };
        assert_eq!(
            adapter.map_row(row, &schema()),
            Ok(vec![Value::BigInt(7), Value::from("A"), Value::BigInt(42)])
        );

        let short = Row {
            columns: vec![Some(CqlValue::BigInt(7))],
        };
        let err = adapter.map_row(short, &schema()).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Other);
    }

    #[test]
    fn test_from_config_rejects_postgres() {
        let config = RematConfig::new(BackendKind::Postgres).with_hostnames(["localhost"]);
        assert!(CassandraAdapter::from_config(&config).is_err());
    }
}
