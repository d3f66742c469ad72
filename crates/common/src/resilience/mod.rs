//! Resilience policies for fault-tolerant outbound calls
//!
//! This module provides **generic, composable** resilience policies:
//! - **Retry**: re-invokes an operation after transient failures with a
//!   configurable backoff and jitter
//! - **Circuit Breaker**: fails fast once a dependency keeps failing, then
//!   probes it with a single trial call
//! - **Bulkhead**: caps concurrent executions and queued callers
//! - **Pipeline**: nests policies outermost-first into a single policy
//! - **Registry**: shares stateful policy instances by key
//!
//! ## Architecture
//!
//! Every policy implements [`Policy`] over an [`Operation`] that returns
//! [`PolicyResult`]. Operations classify their own failures as transient or
//! permanent; policies that refuse a call synthesize `CircuitOpen`,
//! `BulkheadRejected` or `Cancelled` without invoking the operation. An
//! [`ExecutionContext`] travels with each logical call and carries its
//! correlation id, key-value data and cancellation token.
//!
//! The implementations are:
//! - Generic over operation value and error types
//! - Testable with a clock abstraction (`MockClock`) and paused tokio time
//! - Object safe, so heterogeneous policies compose behind `Arc<dyn Policy>`
//!
//! ## Example
//!
//! ```rust,ignore
//! use httpguard_common::resilience::{
//!     CircuitBreaker, CircuitBreakerConfig, ExecutionContext, Policy, PolicyRegistry,
//!     RetryConfig, RetryPolicy,
//! };
//!
//! let mut builder = PolicyRegistry::builder();
//! builder.register("Retry", RetryPolicy::new(RetryConfig::default()))?;
//! builder.register("CircuitBreaker", CircuitBreaker::new(CircuitBreakerConfig::default())?)?;
//! let registry = builder.build();
//!
//! let pipeline = registry.pipeline(&["Retry", "CircuitBreaker"])?;
//! let result = pipeline.execute(&ExecutionContext::new("orders.fetch"), &operation).await;
//! ```

pub mod bulkhead;
pub mod circuit_breaker;
pub mod context;
pub mod error;
pub mod operation;
pub mod pipeline;
pub mod policy;
pub mod registry;
pub mod retry;

// Re-export bulkhead types
pub use bulkhead::{
    Bulkhead, BulkheadConfig, BulkheadConfigBuilder, BulkheadMetrics, RejectionCallback,
};
// Re-export circuit breaker types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerBuilderWithClock, CircuitBreakerConfig,
    CircuitBreakerConfigBuilder, CircuitBreakerMetrics, CircuitState, Clock, MockClock,
    SystemClock, TransitionListener,
};
// Re-export execution core types
pub use context::{keys, ExecutionContext};
pub use error::{ConfigError, ConfigResult, FailureKind, PolicyError, PolicyResult};
pub use operation::{classified, Operation};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use policy::{execute_fn, Policy, SharedPolicy};
pub use registry::{PolicyRegistry, PolicyRegistryBuilder, RegistryError};
// Re-export retry types
pub use retry::{
    BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryPolicy, RetryPredicate,
};
