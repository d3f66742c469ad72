//! Failure taxonomy shared by every policy
//!
//! Operations report failures already classified as [`PolicyError::Transient`]
//! or [`PolicyError::Permanent`]. Policies that refuse to run an operation
//! synthesize their own variants (`CircuitOpen`, `BulkheadRejected`,
//! `Cancelled`) without invoking it.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ErrorClassification, ErrorSeverity};

/// Simple configuration error for validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Terminal failure of a call executed through one or more policies
///
/// Generic over the operation's own error type `E`, which is preserved inside
/// the `Transient` and `Permanent` variants.
#[derive(Debug, Error)]
pub enum PolicyError<E> {
    /// The operation failed in a way that may succeed if retried
    #[error("transient failure: {source}")]
    Transient {
        #[source]
        source: E,
    },

    /// The operation failed and retrying will not help
    #[error("permanent failure: {source}")]
    Permanent {
        #[source]
        source: E,
    },

    /// A circuit breaker refused the call without invoking the operation
    #[error("circuit breaker is open, retry after {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    /// A bulkhead had no free execution or queue slot for the call
    #[error("bulkhead rejected call ({max_parallel} executing, {max_queued} queued)")]
    BulkheadRejected { max_parallel: usize, max_queued: usize },

    /// The call's execution context was cancelled
    #[error("call cancelled")]
    Cancelled,
}

/// Result type for policy execution
pub type PolicyResult<T, E> = Result<T, PolicyError<E>>;

/// Payload-free discriminant of [`PolicyError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    Permanent,
    CircuitOpen,
    BulkheadRejected,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Permanent => write!(f, "PERMANENT"),
            Self::CircuitOpen => write!(f, "CIRCUIT_OPEN"),
            Self::BulkheadRejected => write!(f, "BULKHEAD_REJECTED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl<E> PolicyError<E> {
    pub fn transient(source: E) -> Self {
        Self::Transient { source }
    }

    pub fn permanent(source: E) -> Self {
        Self::Permanent { source }
    }

    /// Lift a raw operation error using a transient-failure predicate
    pub fn classify(source: E, is_transient: impl FnOnce(&E) -> bool) -> Self {
        if is_transient(&source) {
            Self::Transient { source }
        } else {
            Self::Permanent { source }
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transient { .. } => FailureKind::Transient,
            Self::Permanent { .. } => FailureKind::Permanent,
            Self::CircuitOpen { .. } => FailureKind::CircuitOpen,
            Self::BulkheadRejected { .. } => FailureKind::BulkheadRejected,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn is_bulkhead_rejected(&self) -> bool {
        matches!(self, Self::BulkheadRejected { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The operation's own error, if the operation ran and failed
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Transient { source } | Self::Permanent { source } => Some(source),
            _ => None,
        }
    }

    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Transient { source } | Self::Permanent { source } => Some(source),
            _ => None,
        }
    }
}

impl<E> ErrorClassification for PolicyError<E> {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Transient { .. } | Self::CircuitOpen { .. } | Self::BulkheadRejected { .. } => {
                ErrorSeverity::Warning
            }
            Self::Permanent { .. } => ErrorSeverity::Error,
            Self::Cancelled => ErrorSeverity::Info,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
