//! The policy abstraction
//!
//! A [`Policy`] wraps one invocation of an [`Operation`] with a resilience
//! behavior and returns either the operation's value or a terminal
//! [`PolicyError`]. Retry, circuit breaker, bulkhead and pipeline all
//! implement it, so they compose freely and live behind `Arc<dyn Policy>` in
//! the registry.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::context::ExecutionContext;
use super::error::PolicyResult;
use super::operation::Operation;

/// A single resilience behavior around an asynchronous operation
#[async_trait]
pub trait Policy<T, E>: Send + Sync + fmt::Debug {
    /// Name used in log fields and pipeline descriptions
    fn name(&self) -> &str;

    /// Run `operation` under this policy
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        operation: &dyn Operation<T, E>,
    ) -> PolicyResult<T, E>;
}

/// Shared handle to a type-erased policy
pub type SharedPolicy<T, E> = Arc<dyn Policy<T, E>>;

/// Run a closure under `policy`
///
/// Lets the operation's value and error types drive inference, which plain
/// `policy.execute(ctx, &closure)` cannot do for policies that implement
/// [`Policy`] for every `T` and `E`.
pub async fn execute_fn<T, E, P, F, Fut>(
    policy: &P,
    ctx: &ExecutionContext,
    operation: F,
) -> PolicyResult<T, E>
where
    P: Policy<T, E> + ?Sized,
    F: Fn(ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = PolicyResult<T, E>> + Send + 'static,
{
    policy.execute(ctx, &operation).await
}
