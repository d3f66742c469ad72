//! Shared resilience primitives for httpguard crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error classification and severity levels
//! - `runtime`: async policy execution core (retry, circuit breaker, bulkhead,
//!   pipeline, registry)
//! - `observability`: tracing integration (implied by `runtime`)
//! - `test-utils`: scripted and gated operations for policy tests

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{
    classified, execute_fn, BackoffStrategy, Bulkhead, BulkheadConfig, BulkheadMetrics,
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, Clock, ConfigError,
    ExecutionContext, FailureKind, Jitter, MockClock, Operation, Pipeline, Policy, PolicyError,
    PolicyRegistry, PolicyRegistryBuilder, PolicyResult, RegistryError, RetryConfig, RetryPolicy,
    SharedPolicy, SystemClock,
};
