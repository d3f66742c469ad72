//! Controllable operations for policy tests
//!
//! - [`ScriptedOperation`] decides each call's outcome from its 1-based call
//!   number and counts invocations.
//! - [`GatedOperation`] parks every call on a gate until the test releases
//!   it, tracking how many calls entered and the peak concurrency observed.

// Allow missing error/panic docs for test helpers - they are designed to be simple
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::resilience::{ExecutionContext, Operation, PolicyError, PolicyResult};

/// Error type produced by the test operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("test failure: {message}")]
pub struct TestFailure {
    message: String,
}

impl TestFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

type Script<T, E> = Arc<dyn Fn(u32) -> PolicyResult<T, E> + Send + Sync>;

/// Operation whose outcome is a function of the call number
///
/// # Examples
///
/// ```rust,ignore
/// use httpguard_common::testing::ScriptedOperation;
///
/// // Two transient failures, then Ok(7)
/// let op = ScriptedOperation::fail_then_succeed(2, 7_u32);
/// let result = retry.execute(&ctx, &op).await;
/// assert_eq!(op.calls(), 3);
/// ```
#[derive(Clone)]
pub struct ScriptedOperation<T, E> {
    calls: Arc<AtomicU32>,
    script: Script<T, E>,
}

impl<T, E> ScriptedOperation<T, E> {
    /// Create an operation that answers call `n` (1-based) with `script(n)`
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(u32) -> PolicyResult<T, E> + Send + Sync + 'static,
    {
        Self { calls: Arc::new(AtomicU32::new(0)), script: Arc::new(script) }
    }

    /// Number of times the operation has been invoked
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T> ScriptedOperation<T, TestFailure>
where
    T: Clone + Send + Sync + 'static,
{
    /// Fail transiently `failures` times with "attempt N", then return `value`
    pub fn fail_then_succeed(failures: u32, value: T) -> Self {
        Self::new(move |call| {
            if call <= failures {
                Err(PolicyError::transient(TestFailure::new(format!("attempt {call}"))))
            } else {
                Ok(value.clone())
            }
        })
    }
}

impl<T: 'static> ScriptedOperation<T, TestFailure> {
    pub fn always_transient() -> Self {
        Self::new(|call| Err(PolicyError::transient(TestFailure::new(format!("attempt {call}")))))
    }

    pub fn always_permanent() -> Self {
        Self::new(|call| Err(PolicyError::permanent(TestFailure::new(format!("attempt {call}")))))
    }
}

impl<T, E> fmt::Debug for ScriptedOperation<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedOperation").field("calls", &self.calls()).finish_non_exhaustive()
    }
}

impl<T, E> Operation<T, E> for ScriptedOperation<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn invoke(&self, _ctx: ExecutionContext) -> BoxFuture<'_, PolicyResult<T, E>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let result = (self.script)(call);
        Box::pin(async move {
            tokio::task::yield_now().await;
            result
        })
    }
}

/// Operation that blocks until the test opens its gate
///
/// Every call increments `entered` and waits for a permit. [`release`]
/// lets `n` parked or future calls through; [`release_all`] opens the gate
/// for good.
///
/// [`release`]: GatedOperation::release
/// [`release_all`]: GatedOperation::release_all
pub struct GatedOperation<E> {
    entered: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    gate: Semaphore,
    fail: bool,
    _error: PhantomData<fn() -> E>,
}

impl<E> GatedOperation<E> {
    pub fn new() -> Self {
        Self {
            entered: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            gate: Semaphore::new(0),
            fail: false,
            _error: PhantomData,
        }
    }

    /// Released calls fail transiently instead of succeeding
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Calls that have started, including finished ones
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Calls currently parked on the gate
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously running calls observed
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Let `n` calls through the gate
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Open the gate for every current and future call
    pub fn release_all(&self) {
        self.gate.close();
    }
}

impl<E> Default for GatedOperation<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for GatedOperation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatedOperation")
            .field("entered", &self.entered())
            .field("running", &self.running())
            .field("peak", &self.peak())
            .field("fail", &self.fail)
            .finish()
    }
}

impl<E> Operation<(), E> for GatedOperation<E>
where
    E: From<TestFailure> + Send + 'static,
{
    fn invoke(&self, _ctx: ExecutionContext) -> BoxFuture<'_, PolicyResult<(), E>> {
        Box::pin(async move {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);

            // A closed gate means release_all; either way the call proceeds.
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }

            self.running.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                Err(PolicyError::transient(E::from(TestFailure::new("gated failure"))))
            } else {
                Ok(())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_scripted_operation_counts_calls() {
        let op = ScriptedOperation::fail_then_succeed(1, "ok");
        let ctx = ExecutionContext::new("scripted");

        let first = op.invoke(ctx.clone()).await.unwrap_err();
        assert_eq!(first.operation_error().map(TestFailure::message), Some("attempt 1"));
        assert_eq!(op.invoke(ctx).await.ok(), Some("ok"));
        assert_eq!(op.calls(), 2);
    }

    /// Validates gating and peak tracking.
    ///
    /// Assertions:
    /// - Calls park until released.
    /// - `release(1)` lets exactly one call finish.
    /// - `peak()` records the highest concurrency.
    #[tokio::test]
    async fn test_gated_operation_parks_until_released() {
        let gate = Arc::new(GatedOperation::<TestFailure>::new());
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.invoke(ExecutionContext::default()).await })
            })
            .collect();

        crate::assert_eventually_async!(Duration::from_secs(1), async { gate.running() == 3 });
        gate.release(1);
        crate::assert_eventually_async!(Duration::from_secs(1), async { gate.running() == 2 });

        gate.release_all();
        for handle in handles {
            assert!(handle.await.expect("task").is_ok());
        }
        assert_eq!(gate.entered(), 3);
        assert_eq!(gate.peak(), 3);
    }

    #[tokio::test]
    async fn test_failing_gate_returns_transient() {
        let gate = GatedOperation::<TestFailure>::new().failing();
        gate.release_all();

        let err = gate.invoke(ExecutionContext::default()).await.unwrap_err();
        assert!(err.is_transient());
    }
}
