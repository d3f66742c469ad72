//! Retry policy with pluggable backoff and jitter
//!
//! Invokes the wrapped operation up to `max_retries + 1` times. Each failure
//! is checked against the policy's predicate (transient failures by default);
//! handled failures are retried after the delay computed for that attempt,
//! anything else is returned immediately. Once the budget is spent the last
//! failure is returned unchanged.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, instrument, warn};

use super::context::{keys, ExecutionContext};
use super::error::{ConfigError, ConfigResult, PolicyError, PolicyResult};
use super::operation::{invoke_cancellable, Operation};
use super::policy::Policy;

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone)]
#[allow(unpredictable_function_pointer_comparisons)]
#[derive(PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Linear backoff: initial_delay + (attempt * increment)
    Linear { initial_delay: Duration, increment: Duration },
    /// Exponential backoff: initial_delay * base^attempt, capped at max_delay
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
    /// Custom function of the zero-based retry index
    Custom(fn(u32) -> Duration),
}

impl BackoffStrategy {
    /// Delay before retry number `attempt + 1` (`attempt` is zero-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Linear { initial_delay, increment } => {
                initial_delay.saturating_add(increment.saturating_mul(attempt))
            }
            BackoffStrategy::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let delay = initial_delay.as_millis() as f64 * base.powi(exponent);
                let delay_ms = delay.min(max_delay.as_millis() as f64) as u64;
                Duration::from_millis(delay_ms)
            }
            BackoffStrategy::Custom(f) => f(attempt),
        }
    }
}

/// Jitter type for adding randomness to retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Full jitter: 0 to calculated_delay
    Full,
    /// Equal jitter: calculated_delay/2 to calculated_delay
    Equal,
    /// Decorrelated jitter: base to 3x the previous delay
    Decorrelated { base: Duration },
}

impl Jitter {
    /// Apply jitter to the calculated delay
    pub fn apply(&self, delay: Duration, attempt: u32) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(random_up_to(millis(delay))),
            Jitter::Equal => {
                let half = millis(delay) / 2;
                Duration::from_millis(half + random_up_to(half))
            }
            Jitter::Decorrelated { base } => {
                let previous = if attempt == 0 { *base } else { delay };
                let ceiling = millis(previous).saturating_mul(3);
                Duration::from_millis(millis(*base) + random_up_to(ceiling))
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn random_up_to(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max)
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Number of retries after the first attempt
    pub max_retries: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
    /// Jitter type for randomizing delays
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffStrategy::Fixed(Duration::from_millis(600)),
            jitter: Jitter::None,
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Total number of times the operation may be invoked
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        match &self.backoff {
            BackoffStrategy::Exponential { base, .. } if *base <= 0.0 => {
                Err(ConfigError::invalid("exponential base must be greater than 0"))
            }
            BackoffStrategy::Linear { .. }
            | BackoffStrategy::Exponential { .. }
            | BackoffStrategy::Fixed(_)
            | BackoffStrategy::Custom(_) => Ok(()),
        }
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn linear_backoff(mut self, initial_delay: Duration, increment: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Linear { initial_delay, increment };
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    pub fn custom_backoff(mut self, delay_for: fn(u32) -> Duration) -> Self {
        self.config.backoff = BackoffStrategy::Custom(delay_for);
        self
    }

    pub fn no_jitter(mut self) -> Self {
        self.config.jitter = Jitter::None;
        self
    }

    pub fn full_jitter(mut self) -> Self {
        self.config.jitter = Jitter::Full;
        self
    }

    pub fn equal_jitter(mut self) -> Self {
        self.config.jitter = Jitter::Equal;
        self
    }

    pub fn decorrelated_jitter(mut self, base: Duration) -> Self {
        self.config.jitter = Jitter::Decorrelated { base };
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Decides whether a failure should be retried
pub type RetryPredicate<E> = Arc<dyn Fn(&PolicyError<E>) -> bool + Send + Sync>;

/// Retry policy
///
/// Stateless across calls: every `execute` starts with a fresh budget.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// use httpguard_common::resilience::{execute_fn, ExecutionContext, RetryConfig, RetryPolicy};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RetryConfig::builder().max_retries(3).fixed_backoff(Duration::from_millis(600)).build()?;
/// let retry = RetryPolicy::<std::io::Error>::new(config);
///
/// let ctx = ExecutionContext::new("fetch");
/// let value = execute_fn(&retry, &ctx, |_ctx| async { Ok(42) }).await?;
/// # Ok(())
/// # }
/// ```
pub struct RetryPolicy<E> {
    name: String,
    config: RetryConfig,
    should_retry: RetryPredicate<E>,
}

impl<E: 'static> RetryPolicy<E> {
    /// Create a retry policy that handles transient failures
    pub fn new(config: RetryConfig) -> Self {
        Self {
            name: "Retry".to_string(),
            config,
            should_retry: Arc::new(|error: &PolicyError<E>| error.is_transient()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the predicate deciding which failures are retried
    pub fn handle<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&PolicyError<E>) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.config.backoff.calculate_delay(attempt);
        self.config.jitter.apply(delay, attempt)
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T, E> Policy<T, E> for RetryPolicy<E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        skip(self, ctx, operation),
        fields(policy = %self.name, operation = ctx.operation_key(), max_retries = self.config.max_retries)
    )]
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        operation: &dyn Operation<T, E>,
    ) -> PolicyResult<T, E> {
        let mut attempt: u32 = 0;

        loop {
            if ctx.is_cancelled() {
                return Err(PolicyError::Cancelled);
            }

            debug!(attempt = attempt + 1, "executing operation");
            let result = invoke_cancellable(ctx, operation).await;
            ctx.insert(keys::RETRY_ATTEMPTS, attempt + 1);

            let error = match result {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !(self.should_retry)(&error) {
                debug!(kind = %error.kind(), "failure not handled by retry policy");
                return Err(error);
            }

            if attempt >= self.config.max_retries {
                warn!(attempts = attempt + 1, error = %error, "retry attempts exhausted");
                return Err(error);
            }

            let delay = self.delay_for(attempt);
            warn!(
                attempt = attempt + 1,
                delay_ms = millis(delay),
                error = %error,
                "operation failed, retrying"
            );

            tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(PolicyError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
