//! The unit of work policies wrap
//!
//! An [`Operation`] is invoked with an owned [`ExecutionContext`] handle and
//! yields a boxed future. Retry policies may invoke it several times, so it is
//! invoked through `&self` and must not keep per-call state.

use std::future::Future;

use futures::future::BoxFuture;

use super::context::ExecutionContext;
use super::error::{PolicyError, PolicyResult};

/// Asynchronous callable guarded by policies
pub trait Operation<T, E>: Send + Sync {
    fn invoke(&self, ctx: ExecutionContext) -> BoxFuture<'_, PolicyResult<T, E>>;
}

impl<T, E, F, Fut> Operation<T, E> for F
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = PolicyResult<T, E>> + Send + 'static,
{
    fn invoke(&self, ctx: ExecutionContext) -> BoxFuture<'_, PolicyResult<T, E>> {
        Box::pin(self(ctx))
    }
}

/// Invoke `operation`, abandoning it as soon as `ctx` is cancelled.
///
/// The in-flight future is dropped on cancellation, so anything it holds is
/// released before the caller sees [`PolicyError::Cancelled`].
pub(crate) async fn invoke_cancellable<T, E>(
    ctx: &ExecutionContext,
    operation: &dyn Operation<T, E>,
) -> PolicyResult<T, E> {
    tokio::select! {
        biased;
        () = ctx.cancelled() => Err(PolicyError::Cancelled),
        result = operation.invoke(ctx.clone()) => result,
    }
}

/// Adapt an operation returning raw `Result<T, E>` into one returning
/// classified [`PolicyError`]s.
///
/// Errors for which `is_transient` returns `true` become
/// [`PolicyError::Transient`]; all others become [`PolicyError::Permanent`].
///
/// # Examples
///
/// ```rust,ignore
/// use httpguard_common::resilience::{classified, ExecutionContext, Operation};
///
/// # async fn example() {
/// let op = classified(
///     |err: &std::io::Error| err.kind() == std::io::ErrorKind::TimedOut,
///     |_ctx: ExecutionContext| async { Ok::<_, std::io::Error>(7) },
/// );
/// let value = op.invoke(ExecutionContext::new("example")).await;
/// assert_eq!(value.ok(), Some(7));
/// # }
/// ```
pub fn classified<T, E, P, F, Fut>(is_transient: P, operation: F) -> impl Operation<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    P: Fn(&E) -> bool + Clone + Send + Sync + 'static,
    F: Fn(ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    move |ctx: ExecutionContext| {
        let pending = operation(ctx);
        let is_transient = is_transient.clone();
        async move { pending.await.map_err(|err| PolicyError::classify(err, is_transient)) }
    }
}
