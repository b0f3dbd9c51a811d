//! Driver error classification
//!
//! Maps `tokio-postgres` and pool failures onto [`BackendErrorKind`] so the
//! rematerializer can decide health from the kind alone.

use deadpool_postgres::PoolError;
use remat_core::{BackendError, BackendErrorKind};
use std::error::Error as _;
use tokio_postgres::error::SqlState;

/// Classify a server-reported SQLSTATE.
pub fn classify_sql_state(code: &SqlState) -> BackendErrorKind {
    if *code == SqlState::QUERY_CANCELED {
        return BackendErrorKind::Timeout;
    }
    if *code == SqlState::ADMIN_SHUTDOWN
        || *code == SqlState::CRASH_SHUTDOWN
        || *code == SqlState::CANNOT_CONNECT_NOW
        || *code == SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
    {
        return BackendErrorKind::NoHostAvailable;
    }
    // Class 08: connection exception
    if code.code().starts_with("08") {
        return BackendErrorKind::Transport;
    }
    BackendErrorKind::Other
}

/// Classify an error returned by a query on an open session.
pub fn classify_query_error(err: &tokio_postgres::Error) -> BackendError {
    let kind = if err.is_closed() {
        BackendErrorKind::Transport
    } else if let Some(code) = err.code() {
        classify_sql_state(code)
    } else if err
        .source()
        .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some())
    {
        BackendErrorKind::Transport
    } else {
        BackendErrorKind::Other
    };
    BackendError::new(kind, err.to_string())
}

/// Classify a failure to obtain a session from the pool.
pub fn classify_pool_error(err: &PoolError) -> BackendError {
    let kind = match err {
        PoolError::Timeout(_) | PoolError::Closed => BackendErrorKind::NoHostAvailable,
        PoolError::Backend(e) => match e.code().map(classify_sql_state) {
            Some(BackendErrorKind::Other) => BackendErrorKind::Other,
            Some(_) | None => BackendErrorKind::NoHostAvailable,
        },
        _ => BackendErrorKind::Other,
    };
    BackendError::new(kind, err.to_string())
}
