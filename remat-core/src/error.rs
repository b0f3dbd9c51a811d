//! Error types for rematerialization operations

use crate::{DataType, HealthState};
use std::fmt;
use thiserror::Error;

/// Configuration errors, raised at configure time only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid schema metadata for {table}: {reason}")]
    InvalidSchema { table: String, reason: String },

    #[error("Backend not supported: {backend}")]
    BackendNotSupported { backend: String },
}

/// Failures converting a primary-key value into its column's declared type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("Cannot bind {value} into a {data_type} slot")]
    TypeMismatch { data_type: DataType, value: String },

    #[error("Value {value} out of range for {data_type}")]
    OutOfRange { data_type: DataType, value: String },

    #[error("Bind slot {slot} out of range for statement with {slots} slots")]
    SlotOutOfRange { slot: usize, slots: usize },
}

/// Classification a backend adapter attaches to every driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    /// The backend did not answer within the configured query timeout.
    Timeout,
    /// The session dropped underneath an in-flight call.
    Transport,
    /// No backend node could be reached.
    NoHostAvailable,
    /// Anything the adapter could not place in the categories above.
    Other,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            BackendErrorKind::Timeout => "timeout",
            BackendErrorKind::Transport => "transport",
            BackendErrorKind::NoHostAvailable => "no_host_available",
            BackendErrorKind::Other => "other",
        };
        write!(f, "{}", value)
    }
}

/// A classified failure reported by a backend adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Transport, message)
    }

    pub fn no_host_available(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NoHostAvailable, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Other, message)
    }

    /// Whether the session that produced this error must be torn down.
    pub fn is_fatal(&self) -> bool {
        self.kind != BackendErrorKind::Timeout
    }
}

impl From<BindError> for BackendError {
    fn from(err: BindError) -> Self {
        BackendError::other(err.to_string())
    }
}

/// Master error type for rematerialization.
#[derive(Debug, Clone, Error)]
pub enum RematError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("fetch called when not connected: {table} is {state}")]
    NotConnected { table: String, state: HealthState },

    #[error("Invalid fetch arguments: expected {expected} primary key values, got {got}")]
    InvalidArguments { expected: usize, got: usize },

    #[error("Query against {backend} timed out: {reason}")]
    TransientQuery { backend: String, reason: String },

    #[error("Connection to {backend} failed ({kind}): {reason}")]
    FatalConnection {
        backend: String,
        kind: BackendErrorKind,
        reason: String,
    },

    #[error("Fetch from {backend} failed: {reason}")]
    UnclassifiedFetch { backend: String, reason: String },

    #[error("Telemetry error: {reason}")]
    Telemetry { reason: String },
}

impl RematError {
    /// Build the caller-facing error for a backend failure.
    pub fn from_backend(backend: &str, err: BackendError) -> Self {
        match err.kind {
            BackendErrorKind::Timeout => RematError::TransientQuery {
                backend: backend.to_string(),
                reason: err.message,
            },
            BackendErrorKind::Transport | BackendErrorKind::NoHostAvailable => {
                RematError::FatalConnection {
                    backend: backend.to_string(),
                    kind: err.kind,
                    reason: err.message,
                }
            }
            BackendErrorKind::Other => RematError::UnclassifiedFetch {
                backend: backend.to_string(),
                reason: err.message,
            },
        }
    }

    /// Whether the instance disconnects itself before returning this error.
    pub fn is_fail_closed(&self) -> bool {
        matches!(
            self,
            RematError::FatalConnection { .. } | RematError::UnclassifiedFetch { .. }
        )
    }
}

/// Result type alias for rematerialization operations.
pub type RematResult<T> = Result<T, RematError>;
