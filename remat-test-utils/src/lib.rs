//! REMAT Test Utilities
//!
//! Shared test infrastructure for the REMAT workspace:
//! - A scripted backend adapter that records the order of every call
//! - A stats sink that keeps every reported event
//! - Proptest generators for data types, values and schemas
//! - Fixtures for the `bank.accounts` table used across the tests

pub use remat_core::{
    BackendError, BackendErrorKind, CacheRow, ColumnDescriptor, DataType, Dialect, HealthState,
    RematError, RematResult, SchemaMetadata, Value,
};
pub use remat_storage::{
    BackendAdapter, FetchOutcome, MemoryAdapter, MemoryStore, Rematerializer, StatsSink,
};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// SCRIPTED ADAPTER
// ============================================================================

/// What the next `execute` answers with.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Answer from the scripted rows.
    Lookup,
    Row(CacheRow),
    NoRow,
    Fail(BackendError),
}

#[derive(Default)]
struct ScriptState {
    rows: Vec<(Vec<Value>, CacheRow)>,
    responses: VecDeque<ScriptedResponse>,
    connect_results: VecDeque<Result<bool, BackendError>>,
    prepare_failures: VecDeque<BackendError>,
    trace: Vec<String>,
    execute_delay: Duration,
    binds: Vec<(usize, Value, DataType)>,
    prepares: usize,
    executes: usize,
    disconnects: usize,
}

/// Shared control handle for a [`ScriptedAdapter`].
///
/// Tests keep a clone of the script and steer the adapter through it while
/// the rematerializer owns the adapter itself.
#[derive(Clone, Default)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `row` for the primary key `key`.
    pub fn insert(&self, key: Vec<Value>, row: CacheRow) {
        lock(&self.state).rows.push((key, row));
    }

    /// Queue the answer of a future `execute`.
    pub fn respond(&self, response: ScriptedResponse) {
        lock(&self.state).responses.push_back(response);
    }

    pub fn fail_next(&self, error: BackendError) {
        self.respond(ScriptedResponse::Fail(error));
    }

    /// Queue the result of a future `connect`. Unscripted connects succeed.
    pub fn connect_result(&self, result: Result<bool, BackendError>) {
        lock(&self.state).connect_results.push_back(result);
    }

    pub fn fail_next_prepare(&self, error: BackendError) {
        lock(&self.state).prepare_failures.push_back(error);
    }

    /// Delay between an execute's start and end trace records.
    pub fn set_execute_delay(&self, delay: Duration) {
        lock(&self.state).execute_delay = delay;
    }

    /// Call-order trace: `connect`, `disconnect`, `prepare`, `execute:start`,
    /// `execute:end`.
    pub fn trace(&self) -> Vec<String> {
        lock(&self.state).trace.clone()
    }

    pub fn clear_trace(&self) {
        lock(&self.state).trace.clear();
    }

    /// Every bind as `(slot, value, data_type)`.
    pub fn binds(&self) -> Vec<(usize, Value, DataType)> {
        lock(&self.state).binds.clone()
    }

    pub fn prepare_count(&self) -> usize {
        lock(&self.state).prepares
    }

    pub fn execute_count(&self) -> usize {
        lock(&self.state).executes
    }

    pub fn disconnect_count(&self) -> usize {
        lock(&self.state).disconnects
    }

    fn record(&self, event: &str) {
        lock(&self.state).trace.push(event.to_string());
    }
}

/// [`BackendAdapter`] whose every answer comes from a [`Script`].
pub struct ScriptedAdapter {
    script: Script,
    dialect: Dialect,
    connected: bool,
}

impl ScriptedAdapter {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            dialect: Dialect::Postgres,
            connected: false,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }
}

#[async_trait]
impl BackendAdapter for ScriptedAdapter {
    type Prepared = String;
    type Statement = Vec<Option<Value>>;
    type Row = CacheRow;

    fn name(&self) -> &str {
        "scripted"
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<bool, BackendError> {
        self.script.record("connect");
        let result = lock(&self.script.state)
            .connect_results
            .pop_front()
            .unwrap_or(Ok(true));
        self.connected = matches!(result, Ok(true));
        result
    }

    async fn disconnect(&mut self) {
        self.script.record("disconnect");
        lock(&self.script.state).disconnects += 1;
        self.connected = false;
    }

    async fn prepare(
        &mut self,
        text: &str,
        _schema: &SchemaMetadata,
    ) -> Result<Self::Prepared, BackendError> {
        self.script.record("prepare");
        let mut state = lock(&self.script.state);
        state.prepares += 1;
        match state.prepare_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(text.to_string()),
        }
    }

    fn statement(&self, prepared: &Self::Prepared) -> Self::Statement {
        let slots = match self.dialect {
            Dialect::Postgres => prepared.matches('$').count(),
            Dialect::Cql | Dialect::Ansi => prepared.matches('?').count(),
        };
        vec![None; slots]
    }

    fn bind(
        &self,
        statement: &mut Self::Statement,
        slot: usize,
        value: &Value,
        data_type: DataType,
    ) -> Result<(), BackendError> {
        lock(&self.script.state)
            .binds
            .push((slot, value.clone(), data_type));
        let slots = statement.len();
        let target = statement.get_mut(slot).ok_or_else(|| {
            BackendError::other(format!("slot {} out of range for {} slots", slot, slots))
        })?;
        *target = Some(value.clone());
        Ok(())
    }

    async fn execute(
        &mut self,
        _prepared: &Self::Prepared,
        statement: Self::Statement,
    ) -> Result<Option<Self::Row>, BackendError> {
        self.script.record("execute:start");
        let delay = {
            let mut state = lock(&self.script.state);
            state.executes += 1;
            state.execute_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let key: Vec<Value> = statement.into_iter().map(|v| v.unwrap_or(Value::Null)).collect();
        let result = {
            let mut state = lock(&self.script.state);
            match state.responses.pop_front().unwrap_or(ScriptedResponse::Lookup) {
                ScriptedResponse::Lookup => Ok(state
                    .rows
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, row)| row.clone())),
                ScriptedResponse::Row(row) => Ok(Some(row)),
                ScriptedResponse::NoRow => Ok(None),
                ScriptedResponse::Fail(err) => Err(err),
            }
        };
        self.script.record("execute:end");
        result
    }

    fn map_row(&self, row: Self::Row, _schema: &SchemaMetadata) -> Result<CacheRow, BackendError> {
        Ok(row)
    }
}

/// Configure a rematerializer over `bank.accounts` with a fresh script.
pub async fn scripted_accounts() -> (Rematerializer<ScriptedAdapter>, Script, Arc<RecordingStats>) {
    let script = Script::new();
    let stats = Arc::new(RecordingStats::new());
    let remat = Rematerializer::configure(
        fixtures::accounts_schema(),
        ScriptedAdapter::new(script.clone()),
        stats.clone(),
    )
    .await;
    (remat, script, stats)
}

// ============================================================================
// RECORDING STATS
// ============================================================================

/// One event seen by [`RecordingStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsEvent {
    pub metric_name: String,
    pub note: String,
    pub sample_rate_percent: u8,
}

/// [`StatsSink`] that keeps every report in memory.
#[derive(Default)]
pub struct RecordingStats {
    events: Mutex<Vec<StatsEvent>>,
}

impl RecordingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatsEvent> {
        lock(&self.events).clone()
    }

    pub fn metric_names(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .map(|e| e.metric_name.clone())
            .collect()
    }

    pub fn count(&self, metric_name: &str) -> usize {
        lock(&self.events)
            .iter()
            .filter(|e| e.metric_name == metric_name)
            .count()
    }
}

impl StatsSink for RecordingStats {
    fn report_latency(&self, metric_name: &str, _start: Instant, note: &str, sample_rate_percent: u8) {
        lock(&self.events).push(StatsEvent {
            metric_name: metric_name.to_string(),
            note: note.to_string(),
            sample_rate_percent,
        });
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for REMAT types.

    use super::*;
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;
    use uuid::Uuid;

    pub fn arb_data_type() -> impl Strategy<Value = DataType> {
        proptest::sample::select(DataType::ALL.to_vec())
    }

    pub fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
        // 1970-01-01 .. 2100-01-01, whole microseconds
        (0i64..4_102_444_800_000_000).prop_filter_map("timestamp in range", |micros| {
            DateTime::<Utc>::from_timestamp_micros(micros)
        })
    }

    /// A non-null value whose type is exactly `data_type`.
    pub fn arb_value_of(data_type: DataType) -> BoxedStrategy<Value> {
        match data_type {
            DataType::Boolean => any::<bool>().prop_map(Value::Boolean).boxed(),
            DataType::TinyInt => any::<i8>().prop_map(Value::TinyInt).boxed(),
            DataType::SmallInt => any::<i16>().prop_map(Value::SmallInt).boxed(),
            DataType::Integer => any::<i32>().prop_map(Value::Integer).boxed(),
            DataType::BigInt => any::<i64>().prop_map(Value::BigInt).boxed(),
            DataType::Float => (-1.0e12f64..1.0e12).prop_map(Value::Float).boxed(),
            DataType::Varchar => "[a-zA-Z0-9 _-]{0,24}".prop_map(Value::Varchar).boxed(),
            DataType::Varbinary => proptest::collection::vec(any::<u8>(), 0..32)
                .prop_map(Value::Varbinary)
                .boxed(),
            DataType::Timestamp => arb_timestamp().prop_map(Value::Timestamp).boxed(),
            DataType::Uuid => any::<[u8; 16]>()
                .prop_map(|b| Value::Uuid(Uuid::from_bytes(b)))
                .boxed(),
        }
    }

    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}"
    }

    /// A valid schema with 1..=8 columns and a non-empty primary key.
    pub fn arb_schema() -> impl Strategy<Value = SchemaMetadata> {
        (
            arb_identifier(),
            arb_identifier(),
            proptest::collection::vec(arb_data_type(), 1..=8),
        )
            .prop_flat_map(|(schema, table, types)| {
                let width = types.len();
                (
                    Just(schema),
                    Just(table),
                    Just(types),
                    proptest::sample::subsequence((0..width).collect::<Vec<_>>(), 1..=width)
                        .prop_shuffle(),
                )
            })
            .prop_filter_map("valid schema", |(schema, table, types, pk)| {
                let columns: Vec<ColumnDescriptor> = types
                    .iter()
                    .enumerate()
                    .map(|(i, t)| ColumnDescriptor::new(format!("c{}", i), i + 1, *t))
                    .collect();
                let pk: Vec<String> = pk.iter().map(|i| format!("c{}", i)).collect();
                SchemaMetadata::new(schema, table, columns, &pk).ok()
            })
    }

    /// A schema plus one primary-key tuple of matching types.
    pub fn arb_schema_with_key() -> impl Strategy<Value = (SchemaMetadata, Vec<Value>)> {
        arb_schema().prop_flat_map(|schema| {
            let key: Vec<BoxedStrategy<Value>> = schema
                .pk_columns()
                .map(|c| arb_value_of(c.data_type))
                .collect();
            (Just(schema), key)
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built schemas and rows.

    use super::*;

    /// `bank.accounts(id BIGINT, name VARCHAR, balance BIGINT)`, keyed on `id`.
    pub fn accounts_schema() -> SchemaMetadata {
        accounts_schema_keyed(&["id"])
    }

    pub fn accounts_schema_keyed(pk: &[&str]) -> SchemaMetadata {
        let columns = vec![
            ColumnDescriptor::new("id", 1, DataType::BigInt),
            ColumnDescriptor::new("name", 2, DataType::Varchar),
            ColumnDescriptor::new("balance", 3, DataType::BigInt),
        ];
        match SchemaMetadata::new("bank", "accounts", columns, pk) {
            Ok(schema) => schema,
            Err(e) => panic!("accounts fixture is invalid: {}", e),
        }
    }

    pub fn account_row(id: i64, name: &str, balance: i64) -> CacheRow {
        vec![Value::BigInt(id), Value::from(name), Value::BigInt(balance)]
    }

    /// A memory store holding accounts 7 ("A", 42) and 8 ("B", -3).
    pub fn accounts_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (id, name, balance) in [(7, "A", 42), (8, "B", -3)] {
            store.insert(vec![
                ("id", Value::BigInt(id)),
                ("name", Value::from(name)),
                ("balance", Value::BigInt(balance)),
            ]);
        }
        store
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over rematerializer outcomes.

    use super::*;

    #[track_caller]
    pub fn assert_not_connected<T: std::fmt::Debug>(result: &RematResult<T>) {
        match result {
            Err(RematError::NotConnected { .. }) => {}
            other => panic!("Expected NotConnected, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_fatal_connection<T: std::fmt::Debug>(result: &RematResult<T>, kind: BackendErrorKind) {
        match result {
            Err(RematError::FatalConnection { kind: got, .. }) if *got == kind => {}
            other => panic!("Expected FatalConnection({}), got: {:?}", kind, other),
        }
    }

    #[track_caller]
    pub fn assert_unclassified<T: std::fmt::Debug>(result: &RematResult<T>) {
        match result {
            Err(RematError::UnclassifiedFetch { .. }) => {}
            other => panic!("Expected UnclassifiedFetch, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
