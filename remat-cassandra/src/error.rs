//! Driver error classification
//!
//! Maps `scylla` driver failures onto [`BackendErrorKind`]. Driver-side
//! request timeouts and coordinator read/write timeouts are `Timeout`, a
//! broken connection is `Transport`, and an empty query plan, a pool with no
//! live connections, or a coordinator reporting too few replicas is
//! `NoHostAvailable`.

use remat_core::{BackendError, BackendErrorKind};
use scylla::errors::{
    DbError, ExecutionError, NewSessionError, PrepareError, RequestAttemptError,
};

/// Classify an error the coordinator sent back.
pub fn classify_db_error(err: &DbError) -> BackendErrorKind {
    match err {
        DbError::ReadTimeout { .. } | DbError::WriteTimeout { .. } => BackendErrorKind::Timeout,
        DbError::Unavailable { .. } | DbError::Overloaded | DbError::IsBootstrapping => {
            BackendErrorKind::NoHostAvailable
        }
        _ => BackendErrorKind::Other,
    }
}

/// Classify the failure of a single attempt on one connection.
pub fn classify_attempt_error(err: &RequestAttemptError) -> BackendErrorKind {
    match err {
        RequestAttemptError::BrokenConnectionError(_)
        | RequestAttemptError::UnableToAllocStreamId => BackendErrorKind::Transport,
        RequestAttemptError::DbError(db_error, _) => classify_db_error(db_error),
        _ => BackendErrorKind::Other,
    }
}

/// Classify an error returned by executing a prepared statement.
pub fn classify_execution_error(err: &ExecutionError) -> BackendError {
    let kind = match err {
        ExecutionError::RequestTimeout(_) => BackendErrorKind::Timeout,
        ExecutionError::EmptyPlan | ExecutionError::ConnectionPoolError(_) => {
            BackendErrorKind::NoHostAvailable
        }
        ExecutionError::LastAttemptError(attempt) => classify_attempt_error(attempt),
        ExecutionError::PrepareError(prepare) => return classify_prepare_error(prepare),
        _ => BackendErrorKind::Other,
    };
    BackendError::new(kind, err.to_string())
}

/// Classify an error returned by preparing a statement.
pub fn classify_prepare_error(err: &PrepareError) -> BackendError {
    let kind = match err {
        PrepareError::ConnectionPoolError(_) => BackendErrorKind::NoHostAvailable,
        PrepareError::AllAttemptsFailed { first_attempt } => classify_attempt_error(first_attempt),
        _ => BackendErrorKind::Other,
    };
    BackendError::new(kind, err.to_string())
}

/// A session that cannot be built means no node was reachable.
pub fn classify_session_error(err: &NewSessionError) -> BackendError {
    BackendError::no_host_available(err.to_string())
}
