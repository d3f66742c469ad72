//! Per-call execution context
//!
//! An [`ExecutionContext`] travels with one logical call through every policy
//! in a pipeline. It carries the call's correlation id, a small key-value bag
//! that policies and callbacks may write into, and the cancellation token that
//! every suspension point observes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Well-known context keys written by the built-in policies
pub mod keys {
    /// Number of times the retry policy invoked the inner operation
    pub const RETRY_ATTEMPTS: &str = "retry.attempts";
    /// Set to `true` by rejection callbacks when a bulkhead turns a call away
    pub const BULKHEAD_REJECTED: &str = "bulkhead.rejected";
    /// Circuit state observed when the breaker admitted or rejected the call
    pub const CIRCUIT_STATE: &str = "circuit.state";
}

/// Ambient data for one logical call
///
/// Cloning is cheap and yields a handle to the same data and cancellation
/// token, so writes made by an inner policy are visible to the caller.
#[derive(Clone)]
pub struct ExecutionContext {
    operation_key: Arc<str>,
    correlation_id: Uuid,
    data: Arc<Mutex<HashMap<String, Value>>>,
    cancellation: CancellationToken,
}

impl ExecutionContext {
    /// Create a context for the named operation with a fresh correlation id
    pub fn new(operation_key: impl Into<String>) -> Self {
        let operation_key: String = operation_key.into();
        Self {
            operation_key: Arc::from(operation_key),
            correlation_id: Uuid::new_v4(),
            data: Arc::new(Mutex::new(HashMap::new())),
            cancellation: CancellationToken::new(),
        }
    }

    /// Replace the generated correlation id with one supplied by the caller
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Tie this context to an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn operation_key(&self) -> &str {
        &self.operation_key
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Store a value, returning the previous value for the key if any
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.data.lock().insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.lock().remove(key)
    }

    /// Copy of all stored values
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.data.lock().clone()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Cancel the call; every pending suspension point returns promptly
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the context has been cancelled
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new("anonymous")
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("operation_key", &self.operation_key)
            .field("correlation_id", &self.correlation_id)
            .field("entries", &self.data.lock().len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
