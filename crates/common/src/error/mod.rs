//! Error classification shared by policy and transport failures
//!
//! Every failure type that crosses a crate boundary implements
//! [`ErrorClassification`], so callers can make retry, logging and alerting
//! decisions without matching on concrete variants.
//!
//! ## ErrorSeverity Levels
//!
//! | Level | Use Case | Examples |
//! |-------|----------|----------|
//! | **Info** | Expected conditions | Caller cancelled the call |
//! | **Warning** | Degraded but operational | Transient HTTP failure, open circuit, bulkhead rejection |
//! | **Error** | Failure requiring attention | Permanent failure, invalid configuration |
//! | **Critical** | System integrity at risk | Broken invariants |
//!
//! ## Example
//!
//! ```rust,ignore
//! use httpguard_common::error::{ErrorClassification, ErrorSeverity};
//!
//! fn log_failure<E: ErrorClassification + std::fmt::Display>(err: &E) {
//!     if err.severity() >= ErrorSeverity::Error {
//!         tracing::error!(error = %err, "call failed");
//!     }
//! }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Standard interface for classifying failures by their characteristics
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again, such as 5xx responses, request timeouts or dropped connections.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `Some(Duration)` when the failure carries its own hint, e.g.
    /// the remaining open time of a circuit breaker.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Flaky;

    impl ErrorClassification for Flaky {
        fn is_retryable(&self) -> bool {
            true
        }

        fn severity(&self) -> ErrorSeverity {
            ErrorSeverity::Warning
        }
    }

    #[derive(Debug)]
    struct Corrupted;

    impl ErrorClassification for Corrupted {
        fn is_retryable(&self) -> bool {
            false
        }

        fn severity(&self) -> ErrorSeverity {
            ErrorSeverity::Critical
        }

        fn retry_after(&self) -> Option<Duration> {
            Some(Duration::from_secs(1))
        }
    }

    /// Validates the default `is_critical` and `retry_after` implementations.
    ///
    /// Assertions:
    /// - `Flaky` is retryable, not critical, and has no retry hint.
    /// - `Corrupted` is critical and exposes its overridden retry hint.
    #[test]
    fn test_default_classification_methods() {
        assert!(Flaky.is_retryable());
        assert!(!Flaky.is_critical());
        assert_eq!(Flaky.retry_after(), None);

        assert!(!Corrupted.is_retryable());
        assert!(Corrupted.is_critical());
        assert_eq!(Corrupted.retry_after(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_severity_ordering_and_display() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Warning < ErrorSeverity::Error);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);

        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
        assert_eq!(ErrorSeverity::Critical.to_string(), "CRITICAL");
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        let json = serde_json::to_string(&ErrorSeverity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
        let parsed: ErrorSeverity = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(parsed, ErrorSeverity::Critical);
    }
}
