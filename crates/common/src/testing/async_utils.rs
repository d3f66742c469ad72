//! Async testing utilities
//!
//! Waiting helpers for tests that observe spawned policy executions. All of
//! them use tokio's clock, so they also work under `start_paused = true`.

// Allow missing error/panic docs for test utilities - they are designed to be self-explanatory
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::future::Future;
use std::time::Duration;

/// Assert that a condition eventually becomes true within a timeout
///
/// The predicate expression is re-evaluated on every poll, so it may be an
/// `async` block that reads shared state.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// let gate = Arc::new(GatedOperation::<TestFailure>::new());
/// // ... spawn calls through a bulkhead ...
/// httpguard_common::assert_eventually_async!(Duration::from_secs(1), async {
///     gate.entered() == 10
/// });
/// ```
#[macro_export]
macro_rules! assert_eventually_async {
    ($timeout:expr, $fut:expr) => {{
        let timeout_duration = $timeout;
        let result = tokio::time::timeout(timeout_duration, async {
            loop {
                if $fut.await {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await;

        assert!(result.is_ok(), "Condition did not become true within {:?}", timeout_duration);
    }};
}

/// Wait for a future to complete with a timeout, returning a Result
pub async fn timeout_ok<F, T>(duration: Duration, fut: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut).await
}

/// Poll an async condition until it returns true or times out
///
/// Returns whether the condition was observed true.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }

    false
}
