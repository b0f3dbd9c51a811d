//! Backend adapter trait.
//!
//! This module defines the narrow seam between the generic rematerialization
//! flow and one backend's native prepare/bind/execute API. Every backend
//! shares [`crate::Rematerializer`] verbatim; only an implementation of
//! [`BackendAdapter`] varies.

use async_trait::async_trait;
use remat_core::{BackendError, CacheRow, DataType, Dialect, SchemaMetadata, Value};

/// Connection wrangling, typed binding, and row mapping for one backend.
///
/// # Implementation Requirements
///
/// - Every failure is returned as a [`BackendError`] whose kind is already
///   classified (timeout, transport, no host, other). The rematerializer
///   decides the health consequence from the kind alone.
/// - `execute` must be bounded by the adapter's own query timeout and
///   report expiry as [`remat_core::BackendErrorKind::Timeout`].
/// - `disconnect` must be idempotent and safe to call when never connected.
/// - `bind` must handle every [`DataType`].
/// - `map_row` must return exactly one value per schema column, in cache
///   column order.
#[async_trait]
pub trait BackendAdapter: Send + 'static {
    /// Compiled form of the synthesized select.
    type Prepared: Send + Sync;
    /// A prepared query with (some of) its slots bound.
    type Statement: Send;
    /// Backend-native row handle.
    type Row: Send;

    /// Short backend name used in metric names and logs.
    fn name(&self) -> &str;

    /// Quoting and placeholder style for query synthesis.
    fn dialect(&self) -> Dialect;

    /// Whether a live session is currently held.
    fn is_connected(&self) -> bool;

    /// Establish a session. `Ok(false)` means no session could be obtained.
    async fn connect(&mut self) -> Result<bool, BackendError>;

    /// Release the session, if any.
    async fn disconnect(&mut self);

    /// Compile `text` against the current session.
    async fn prepare(
        &mut self,
        text: &str,
        schema: &SchemaMetadata,
    ) -> Result<Self::Prepared, BackendError>;

    /// Start a fresh statement from a prepared query.
    fn statement(&self, prepared: &Self::Prepared) -> Self::Statement;

    /// Bind one value into one placeholder slot (0-based), directed by the
    /// column's declared type. `value` has already been coerced to
    /// `data_type` or is `Null`.
    fn bind(
        &self,
        statement: &mut Self::Statement,
        slot: usize,
        value: &Value,
        data_type: DataType,
    ) -> Result<(), BackendError>;

    /// Execute and fetch at most one row.
    async fn execute(
        &mut self,
        prepared: &Self::Prepared,
        statement: Self::Statement,
    ) -> Result<Option<Self::Row>, BackendError>;

    /// Map a native row into cache column order.
    fn map_row(&self, row: Self::Row, schema: &SchemaMetadata) -> Result<CacheRow, BackendError>;
}
