//! Cache-miss rematerialization with explicit failure classification.
//!
//! A [`Rematerializer`] owns one backend adapter and reconstructs single
//! cache rows from the system of record by primary key.
//!
//! # Serialization
//!
//! All mutable state (adapter session, health, cached select text, prepared
//! query) sits in one record behind a `tokio::sync::Mutex` that is held for
//! the whole body of [`Rematerializer::fetch`], [`Rematerializer::disconnect`]
//! and [`Rematerializer::reconnect`]. Fetches against one instance therefore
//! form a total order and a disconnect never tears a session down mid-fetch.
//!
//! # Failure classification
//!
//! | Backend outcome        | Health after | Caller sees           |
//! |------------------------|--------------|-----------------------|
//! | row / no row           | unchanged    | `Some(row)` / `None`  |
//! | timeout                | unchanged    | `None`                |
//! | transport, no host     | `Broken`     | `FatalConnection`     |
//! | anything else          | `Broken`     | `UnclassifiedFetch`   |
//!
//! Fatal outcomes disconnect before the error is returned, so the next
//! caller observes `NotConnected` until someone calls `reconnect`.

use std::sync::Arc;
use std::time::Instant;

use remat_core::{
    select_by_primary_key, BackendError, BackendErrorKind, CacheRow, HealthState, RematError,
    RematResult, SchemaMetadata, Value,
};
use tokio::sync::Mutex;

use crate::adapter::BackendAdapter;
use crate::stats::{FetchEvent, StatsSink, FULL_SAMPLE_RATE};

/// Detailed result of a fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Row present, values in cache column order.
    Found(CacheRow),
    /// The backend answered and has no such row.
    NotFound,
    /// The backend did not answer within its query timeout.
    TimedOut,
}

impl FetchOutcome {
    /// Collapse into the cache-facing form, where a timeout reads as "no data".
    pub fn into_row(self) -> Option<CacheRow> {
        match self {
            FetchOutcome::Found(row) => Some(row),
            FetchOutcome::NotFound | FetchOutcome::TimedOut => None,
        }
    }
}

/// State mutated by fetch, guarded by the fetch lock.
struct RematState<A: BackendAdapter> {
    adapter: A,
    health: HealthState,
    select_text: Option<String>,
    prepared: Option<A::Prepared>,
}

/// Rematerializes cache rows for one table from one backend.
///
/// # Type Parameters
///
/// - `A`: the backend adapter, chosen at configuration time
pub struct Rematerializer<A: BackendAdapter> {
    schema: SchemaMetadata,
    backend: String,
    stats: Arc<dyn StatsSink>,
    state: Mutex<RematState<A>>,
}

impl<A: BackendAdapter> Rematerializer<A> {
    /// Configure a rematerializer and attempt an initial connection.
    ///
    /// A failed connection attempt is logged and leaves the instance
    /// `Disconnected`; it is not an error. Schema validation already happened
    /// in [`SchemaMetadata::new`].
    pub async fn configure(schema: SchemaMetadata, mut adapter: A, stats: Arc<dyn StatsSink>) -> Self {
        let backend = adapter.name().to_string();
        let table = schema.qualified_name();

        let health = connect_adapter(&mut adapter, &table).await;
        tracing::info!(table = %table, backend = %backend, state = %health, "Rematerializer configured");

        Self {
            schema,
            backend,
            stats,
            state: Mutex::new(RematState {
                adapter,
                health,
                select_text: None,
                prepared: None,
            }),
        }
    }

    pub fn schema(&self) -> &SchemaMetadata {
        &self.schema
    }

    pub fn backend_name(&self) -> &str {
        &self.backend
    }

    /// Current health. Waits for any in-flight fetch.
    pub async fn health(&self) -> HealthState {
        self.state.lock().await.health
    }

    /// The select this instance issues, synthesized on demand.
    pub async fn select_text(&self) -> String {
        let dialect = self.state.lock().await.adapter.dialect();
        select_by_primary_key(&self.schema, dialect)
    }

    /// Fetch one row by primary key.
    ///
    /// Returns the row in cache column order, or `None` when the row is
    /// absent or the query timed out. `pk_values` must hold at least
    /// `pk_count` values, and `pk_count` must equal the table's key width;
    /// values past `pk_count` are ignored.
    pub async fn fetch(&self, pk_values: &[Value], pk_count: usize) -> RematResult<Option<CacheRow>> {
        self.fetch_outcome(pk_values, pk_count)
            .await
            .map(FetchOutcome::into_row)
    }

    /// Like [`Self::fetch`], but keeps "not found" and "timed out" apart.
    #[tracing::instrument(skip_all, fields(table = %self.schema.table_name(), backend = %self.backend))]
    pub async fn fetch_outcome(&self, pk_values: &[Value], pk_count: usize) -> RematResult<FetchOutcome> {
        let expected = self.schema.pk_count();
        if pk_count != expected || pk_values.len() < pk_count {
            let got = if pk_count != expected { pk_count } else { pk_values.len() };
            return Err(RematError::InvalidArguments { expected, got });
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if !state.health.is_connected() {
            tracing::error!(state = %state.health, "fetch called when not connected");
            return Err(RematError::NotConnected {
                table: self.schema.qualified_name(),
                state: state.health,
            });
        }

        let start = Instant::now();
        match self.fetch_locked(state, &pk_values[..pk_count]).await {
            Ok(Some(row)) => {
                self.report(FetchEvent::Success, start, "");
                Ok(FetchOutcome::Found(row))
            }
            Ok(None) => {
                self.report(FetchEvent::Success, start, "");
                Ok(FetchOutcome::NotFound)
            }
            Err(e) if e.kind == BackendErrorKind::Timeout => {
                self.report(FetchEvent::Timeout, start, &e.message);
                let err = RematError::from_backend(&self.backend, e);
                tracing::warn!(error = %err, "Rematerialization absorbed a timeout");
                Ok(FetchOutcome::TimedOut)
            }
            Err(e) => {
                let event = match e.kind {
                    BackendErrorKind::Transport => FetchEvent::Transport,
                    BackendErrorKind::NoHostAvailable => FetchEvent::NoHost,
                    BackendErrorKind::Timeout | BackendErrorKind::Other => FetchEvent::Error,
                };
                self.report(event, start, &e.message);
                tracing::error!(error = %e, kind = %e.kind, "Rematerialization failed, disconnecting");

                state.health = HealthState::Broken;
                self.teardown(state).await;
                Err(RematError::from_backend(&self.backend, e))
            }
        }
    }

    /// Body of a fetch. Errors are classified by the caller.
    async fn fetch_locked(
        &self,
        state: &mut RematState<A>,
        pk_values: &[Value],
    ) -> Result<Option<CacheRow>, BackendError> {
        if !state.adapter.is_connected() {
            return Err(BackendError::transport("session lost before fetch"));
        }

        let dialect = state.adapter.dialect();
        let text = state
            .select_text
            .get_or_insert_with(|| select_by_primary_key(&self.schema, dialect));

        if state.prepared.is_none() {
            tracing::debug!(sql = %text, "Preparing rematerialization query");
            let prepared = state.adapter.prepare(text, &self.schema).await?;
            state.prepared = Some(prepared);
        }
        let prepared = state
            .prepared
            .as_ref()
            .ok_or_else(|| BackendError::other("prepared query missing after prepare"))?;

        let mut statement = state.adapter.statement(prepared);
        for (slot, (value, column)) in pk_values.iter().zip(self.schema.pk_columns()).enumerate() {
            let bound = value.coerce_to(column.data_type)?;
            state
                .adapter
                .bind(&mut statement, slot, &bound, column.data_type)?;
        }

        let Some(row) = state.adapter.execute(prepared, statement).await? else {
            return Ok(None);
        };

        let values = state.adapter.map_row(row, &self.schema)?;
        if values.len() != self.schema.column_count() {
            return Err(BackendError::other(format!(
                "backend returned {} values for {} columns",
                values.len(),
                self.schema.column_count()
            )));
        }
        Ok(Some(values))
    }

    /// Release the session and drop the prepared query. Idempotent.
    ///
    /// A `Broken` instance stays `Broken`.
    pub async fn disconnect(&self) {
        let mut guard = self.state.lock().await;
        self.teardown(&mut guard).await;
    }

    /// Tear down any session, clear `Broken`, and connect again.
    ///
    /// The prepared query is rebuilt by the next fetch.
    pub async fn reconnect(&self) -> HealthState {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        self.teardown(state).await;
        state.health = connect_adapter(&mut state.adapter, &self.schema.qualified_name()).await;
        tracing::info!(table = %self.schema.qualified_name(), state = %state.health, "Reconnected");
        state.health
    }

    async fn teardown(&self, state: &mut RematState<A>) {
        state.prepared = None;
        state.adapter.disconnect().await;

        let next = state.health.after_disconnect();
        if next != state.health {
            tracing::info!(table = %self.schema.qualified_name(), from = %state.health, to = %next, "Disconnected");
        }
        state.health = next;
    }

    fn report(&self, event: FetchEvent, start: Instant, note: &str) {
        self.stats
            .report_latency(&event.metric_name(&self.backend), start, note, FULL_SAMPLE_RATE);
    }
}

async fn connect_adapter<A: BackendAdapter>(adapter: &mut A, table: &str) -> HealthState {
    match adapter.connect().await {
        Ok(connected) => {
            if !connected {
                tracing::warn!(table, backend = adapter.name(), "Backend connection unavailable");
            }
            HealthState::after_connect(connected)
        }
        Err(e) => {
            tracing::warn!(table, backend = adapter.name(), error = %e, "Backend connection failed");
            HealthState::Disconnected
        }
    }
}
