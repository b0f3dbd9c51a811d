//! In-memory wide-column backend.
//!
//! [`MemoryStore`] holds rows as column-name maps and can be made
//! unreachable, slow, or scripted to fail, so the rematerializer's failure
//! handling can be driven without a network. [`MemoryAdapter`] speaks the
//! CQL dialect against it and does its own type checking at bind time.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use remat_core::{
    BackendError, BackendKind, BindError, CacheRow, ConfigError, DataType, Dialect, RematConfig,
    RematResult, SchemaMetadata, Value,
};

use crate::adapter::BackendAdapter;

/// A stored row, keyed by column name.
pub type MemoryRow = BTreeMap<String, Value>;

#[derive(Default)]
struct StoreInner {
    rows: Vec<MemoryRow>,
    failures: VecDeque<BackendError>,
    latency: Duration,
}

/// Shared table contents plus fault injection.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    unreachable: AtomicBool,
    epoch: AtomicU64,
    prepares: AtomicUsize,
    executes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a row given as `(column, value)` pairs.
    pub fn insert<K: Into<String>>(&self, row: impl IntoIterator<Item = (K, Value)>) {
        let row = row.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.lock().rows.push(row);
    }

    pub fn clear(&self) {
        self.lock().rows.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// While unreachable, connects fail and queries report no host.
    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        !self.unreachable.load(Ordering::SeqCst)
    }

    /// Drop every open session, as a server restart would.
    pub fn kill_sessions(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Delay applied to every query before it is answered.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Queue an error for the next query. Queued errors are consumed in order.
    pub fn fail_next(&self, error: BackendError) {
        self.lock().failures.push_back(error);
    }

    pub fn prepare_count(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn execute_count(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Option<BackendError> {
        self.lock().failures.pop_front()
    }

    async fn lookup(&self, key: &[(String, DataType, Value)]) -> Option<MemoryRow> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let inner = self.lock();
        inner
            .rows
            .iter()
            .find(|row| {
                key.iter().all(|(column, data_type, expected)| {
                    row.get(column)
                        .and_then(|stored| stored.coerce_to(*data_type).ok())
                        .is_some_and(|stored| !stored.is_null() && &stored == expected)
                })
            })
            .cloned()
    }
}

/// Compiled form of a select over a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryPrepared {
    text: String,
    key_columns: Vec<(String, DataType)>,
}

impl MemoryPrepared {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Bind slots of one execution.
#[derive(Debug, Clone)]
pub struct MemoryStatement {
    slots: Vec<Option<Value>>,
}

/// Adapter over a [`MemoryStore`], using CQL identifier and placeholder rules.
pub struct MemoryAdapter {
    store: Arc<MemoryStore>,
    query_timeout: Duration,
    session: Option<u64>,
}

impl MemoryAdapter {
    pub fn new(store: Arc<MemoryStore>, query_timeout: Duration) -> Self {
        Self {
            store,
            query_timeout,
            session: None,
        }
    }

    /// Build from configuration. Only the `memory` backend is accepted.
    pub fn from_config(config: &RematConfig, store: Arc<MemoryStore>) -> RematResult<Self> {
        if config.backend != BackendKind::Memory {
            return Err(ConfigError::BackendNotSupported {
                backend: config.backend.to_string(),
            }
            .into());
        }
        config.validate()?;
        Ok(Self::new(store, config.query_timeout))
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

#[async_trait]
impl BackendAdapter for MemoryAdapter {
    type Prepared = MemoryPrepared;
    type Statement = MemoryStatement;
    type Row = MemoryRow;

    fn name(&self) -> &str {
        BackendKind::Memory.as_str()
    }

    fn dialect(&self) -> Dialect {
        Dialect::Cql
    }

    fn is_connected(&self) -> bool {
        self.session == Some(self.store.epoch())
    }

    async fn connect(&mut self) -> Result<bool, BackendError> {
        if !self.store.is_reachable() {
            self.session = None;
            return Err(BackendError::no_host_available("memory store unreachable"));
        }
        self.session = Some(self.store.epoch());
        Ok(true)
    }

    async fn disconnect(&mut self) {
        self.session = None;
    }

    async fn prepare(
        &mut self,
        text: &str,
        schema: &SchemaMetadata,
    ) -> Result<Self::Prepared, BackendError> {
        if !self.is_connected() {
            return Err(BackendError::transport("prepare on closed session"));
        }
        self.store.prepares.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryPrepared {
            text: text.to_string(),
            key_columns: schema
                .pk_columns()
                .map(|c| (c.name.clone(), c.data_type))
                .collect(),
        })
    }

    fn statement(&self, prepared: &Self::Prepared) -> Self::Statement {
        MemoryStatement {
            slots: vec![None; prepared.key_columns.len()],
        }
    }

    fn bind(
        &self,
        statement: &mut Self::Statement,
        slot: usize,
        value: &Value,
        data_type: DataType,
    ) -> Result<(), BackendError> {
        let slots = statement.slots.len();
        let target = statement
            .slots
            .get_mut(slot)
            .ok_or(BindError::SlotOutOfRange { slot, slots })?;

        match (value, data_type) {
            (Value::Null, _)
            | (Value::Boolean(_), DataType::Boolean)
            | (Value::TinyInt(_), DataType::TinyInt)
            | (Value::SmallInt(_), DataType::SmallInt)
            | (Value::Integer(_), DataType::Integer)
            | (Value::BigInt(_), DataType::BigInt)
            | (Value::Float(_), DataType::Float)
            | (Value::Varchar(_), DataType::Varchar)
            | (Value::Varbinary(_), DataType::Varbinary)
            | (Value::Timestamp(_), DataType::Timestamp)
            | (Value::Uuid(_), DataType::Uuid) => {
                *target = Some(value.clone());
                Ok(())
            }
            _ => Err(BindError::TypeMismatch {
                data_type,
                value: value.to_string(),
            }
            .into()),
        }
    }

    async fn execute(
        &mut self,
        prepared: &Self::Prepared,
        statement: Self::Statement,
    ) -> Result<Option<Self::Row>, BackendError> {
        if !self.is_connected() {
            return Err(BackendError::transport("execute on closed session"));
        }
        if !self.store.is_reachable() {
            return Err(BackendError::no_host_available(
                "all memory store hosts are down",
            ));
        }
        self.store.executes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.store.take_failure() {
            return Err(err);
        }

        let mut key = Vec::with_capacity(prepared.key_columns.len());
        for (slot, ((column, data_type), value)) in prepared
            .key_columns
            .iter()
            .zip(statement.slots)
            .enumerate()
        {
            let value = value.ok_or_else(|| BackendError::other(format!("slot {slot} unbound")))?;
            key.push((column.clone(), *data_type, value));
        }

        tokio::time::timeout(self.query_timeout, self.store.lookup(&key))
            .await
            .map_err(|_| {
                BackendError::timeout(format!(
                    "no answer within {} ms",
                    self.query_timeout.as_millis()
                ))
            })
    }

    fn map_row(&self, mut row: Self::Row, schema: &SchemaMetadata) -> Result<CacheRow, BackendError> {
        schema
            .columns()
            .iter()
            .map(|c| {
                row.remove(&c.name)
                    .unwrap_or(Value::Null)
                    .coerce_to(c.data_type)
                    .map_err(BackendError::from)
            })
            .collect()
    }
}
