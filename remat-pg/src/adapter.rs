//! PostgreSQL backend adapter.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use deadpool_postgres::{Object, Pool};
use remat_core::{
    BackendError, BindError, CacheRow, DataType, Dialect, RematConfig, RematResult, SchemaMetadata,
    Value,
};
use remat_storage::BackendAdapter;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{NoTls, Row, Statement};
use uuid::Uuid;

use crate::error::{classify_pool_error, classify_query_error};
use crate::params::{pg_type, PgParam};
use crate::pool::create_pool;

/// Adapter holding one pooled PostgreSQL session.
pub struct PgAdapter {
    pool: Pool,
    session: Option<Object>,
    query_timeout: Duration,
}

impl PgAdapter {
    pub fn new(pool: Pool, query_timeout: Duration) -> Self {
        Self {
            pool,
            session: None,
            query_timeout,
        }
    }

    /// Build the pool from configuration. Does not connect.
    pub fn from_config(config: &RematConfig) -> RematResult<Self> {
        let pool = create_pool(config)?;
        Ok(Self::new(pool, config.query_timeout))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    fn session(&self) -> Result<&Object, BackendError> {
        self.session
            .as_ref()
            .filter(|client| !client.is_closed())
            .ok_or_else(|| BackendError::transport("no open PostgreSQL session"))
    }
}

#[async_trait]
impl BackendAdapter for PgAdapter {
    type Prepared = Statement;
    type Statement = Vec<Option<PgParam>>;
    type Row = Row;

    fn name(&self) -> &str {
        "postgres"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn is_connected(&self) -> bool {
        self.session().is_ok()
    }

    async fn connect(&mut self) -> Result<bool, BackendError> {
        if self.is_connected() {
            return Ok(true);
        }
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| classify_pool_error(&e))?;
        self.session = Some(client);
        Ok(true)
    }

    async fn disconnect(&mut self) {
        let Some(client) = self.session.take() else {
            return;
        };
        // Never recycled: the next connect gets a fresh connection.
        let closed = client.is_closed();
        drop(Object::take(client));
        tracing::debug!(closed, "Detached PostgreSQL session");
    }

    async fn prepare(
        &mut self,
        text: &str,
        schema: &SchemaMetadata,
    ) -> Result<Self::Prepared, BackendError> {
        let types: Vec<Type> = schema.pk_columns().map(|c| pg_type(c.data_type)).collect();
        let client = self.session()?;
        client
            .prepare_typed_cached(text, &types)
            .await
            .map_err(|e| classify_query_error(&e))
    }

    fn statement(&self, prepared: &Self::Prepared) -> Self::Statement {
        vec![None; prepared.params().len()]
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
        *target = Some(PgParam::from_value(value, data_type)?);
        Ok(())
    }

    async fn execute(
        &mut self,
        prepared: &Self::Prepared,
        statement: Self::Statement,
    ) -> Result<Option<Self::Row>, BackendError> {
        let params = statement
            .into_iter()
            .enumerate()
            .map(|(slot, param)| {
                param.ok_or_else(|| BackendError::other(format!("parameter ${} unbound", slot + 1)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(PgParam::as_tosql).collect();

        let client = self.session()?;
        match tokio::time::timeout(self.query_timeout, client.query_opt(prepared, &refs)).await {
            Ok(result) => result.map_err(|e| classify_query_error(&e)),
            Err(_) => {
                // Must complete before the next query can be sent on this
                // session, or the cancel could land on that query instead.
                let token = client.cancel_token();
                match tokio::time::timeout(self.query_timeout, token.cancel_query(NoTls)).await {
                    Ok(Ok(())) => tracing::debug!("Cancelled timed out query"),
                    Ok(Err(e)) => tracing::debug!(error = %e, "Failed to cancel timed out query"),
                    Err(_) => tracing::debug!("Cancel request for timed out query did not complete"),
                }
                Err(BackendError::timeout(format!(
                    "no answer within {} ms",
                    self.query_timeout.as_millis()
                )))
            }
        }
    }

    fn map_row(&self, row: Self::Row, schema: &SchemaMetadata) -> Result<CacheRow, BackendError> {
        if row.len() != schema.column_count() {
            return Err(BackendError::other(format!(
                "row has {} columns, {} expects {}",
                row.len(),
                schema.qualified_name(),
                schema.column_count()
            )));
        }
        schema
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| read_cell(&row, idx, column.data_type))
            .collect()
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>, BackendError> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| BackendError::other(format!("column {}: {}", idx, e)))
}

/// Read column `idx` as `data_type`, accepting any server type of the same
/// family and narrowing with range checks.
fn read_cell(row: &Row, idx: usize, data_type: DataType) -> Result<Value, BackendError> {
    let server_type = row.columns()[idx].type_();

    let value = match data_type {
        DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt => {
            let wide = if *server_type == Type::INT2 {
                get::<i16>(row, idx)?.map(i64::from)
            } else if *server_type == Type::INT4 {
                get::<i32>(row, idx)?.map(i64::from)
            } else {
                get::<i64>(row, idx)?
            };
            match wide {
                Some(v) => Value::BigInt(v).coerce_to(data_type)?,
                None => Value::Null,
            }
        }
        DataType::Float => {
            let v = if *server_type == Type::FLOAT4 {
                get::<f32>(row, idx)?.map(f64::from)
            } else {
                get::<f64>(row, idx)?
            };
            v.map(Value::Float).unwrap_or(Value::Null)
        }
        DataType::Boolean => get::<bool>(row, idx)?.map(Value::Boolean).unwrap_or(Value::Null),
        DataType::Varchar => get::<String>(row, idx)?.map(Value::Varchar).unwrap_or(Value::Null),
        DataType::Varbinary => get::<Vec<u8>>(row, idx)?
            .map(Value::Varbinary)
            .unwrap_or(Value::Null),
        DataType::Timestamp => {
            let ts = if *server_type == Type::TIMESTAMP {
                get::<NaiveDateTime>(row, idx)?.map(|ts| ts.and_utc())
            } else {
                get::<DateTime<Utc>>(row, idx)?
            };
            ts.map(Value::Timestamp).unwrap_or(Value::Null)
        }
        DataType::Uuid => get::<Uuid>(row, idx)?.map(Value::Uuid).unwrap_or(Value::Null),
    };
    Ok(value)
}
