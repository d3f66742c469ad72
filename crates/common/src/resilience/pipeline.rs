//! Ordered composition of policies
//!
//! A [`Pipeline`] nests its policies outermost-first: the first policy wraps
//! the second, which wraps the third, down to the operation itself. With
//! `[Retry, CircuitBreaker]`, every retry attempt passes through the breaker,
//! and the retry policy sees the breaker's `CircuitOpen` rejections as
//! outcomes of the attempt.
//!
//! A pipeline is itself a [`Policy`], so pipelines nest inside pipelines.

use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, instrument};

use super::context::ExecutionContext;
use super::error::{PolicyError, PolicyResult};
use super::operation::Operation;
use super::policy::{Policy, SharedPolicy};

/// Policies applied outermost-first around an operation
///
/// # Examples
///
/// ```rust,ignore
/// use httpguard_common::resilience::{CircuitBreaker, Pipeline, RetryPolicy};
///
/// let pipeline = Pipeline::builder()
///     .push(RetryPolicy::new(RetryConfig::default()))
///     .push(CircuitBreaker::new(CircuitBreakerConfig::default())?)
///     .build();
/// assert_eq!(pipeline.name(), "Retry+CircuitBreaker");
/// ```
pub struct Pipeline<T, E> {
    name: String,
    policies: Vec<SharedPolicy<T, E>>,
}

impl<T, E> Pipeline<T, E> {
    /// Create a pipeline from shared policies, outermost first
    pub fn new(policies: Vec<SharedPolicy<T, E>>) -> Self {
        let name = if policies.is_empty() {
            "Pipeline".to_string()
        } else {
            policies.iter().map(|policy| policy.name()).collect::<Vec<_>>().join("+")
        };
        Self { name, policies }
    }

    pub fn builder() -> PipelineBuilder<T, E> {
        PipelineBuilder { policies: Vec::new() }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Names of the composed policies, outermost first
    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.iter().map(|policy| policy.name()).collect()
    }
}

impl<T, E> fmt::Debug for Pipeline<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("policies", &self.policy_names())
            .finish()
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder<T, E> {
    policies: Vec<SharedPolicy<T, E>>,
}

impl<T, E> PipelineBuilder<T, E> {
    /// Append a policy inside the ones already pushed
    pub fn push<P>(mut self, policy: P) -> Self
    where
        P: Policy<T, E> + 'static,
    {
        self.policies.push(std::sync::Arc::new(policy));
        self
    }

    /// Append a policy that is shared with other pipelines
    pub fn push_shared(mut self, policy: SharedPolicy<T, E>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn build(self) -> Pipeline<T, E> {
        Pipeline::new(self.policies)
    }
}

impl<T, E> fmt::Debug for PipelineBuilder<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder").field("policies", &self.policies.len()).finish()
    }
}

/// The operation as seen from one layer of the pipeline
struct Nested<'a, T, E> {
    policies: &'a [SharedPolicy<T, E>],
    operation: &'a dyn Operation<T, E>,
}

impl<T, E> Operation<T, E> for Nested<'_, T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn invoke(&self, ctx: ExecutionContext) -> BoxFuture<'_, PolicyResult<T, E>> {
        Box::pin(async move {
            match self.policies.split_first() {
                Some((outer, rest)) => {
                    let inner = Nested { policies: rest, operation: self.operation };
                    outer.execute(&ctx, &inner).await
                }
                None => self.operation.invoke(ctx).await,
            }
        })
    }
}

#[async_trait]
impl<T, E> Policy<T, E> for Pipeline<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, ctx, operation), fields(pipeline = %self.name, operation = ctx.operation_key()))]
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        operation: &dyn Operation<T, E>,
    ) -> PolicyResult<T, E> {
        let nested = Nested { policies: &self.policies, operation };

        tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                debug!("pipeline execution cancelled");
                Err(PolicyError::Cancelled)
            }
            result = nested.invoke(ctx.clone()) => result,
        }
    }
}
