//! Bulkhead pattern for limiting concurrent operations
//!
//! Named after ship bulkheads that contain flooding to one compartment, the
//! bulkhead caps how many calls execute at once and how many may wait for a
//! free slot. A call arriving when both the execution slots and the queue are
//! full is rejected immediately with [`PolicyError::BulkheadRejected`] and the
//! operation is never invoked.
//!
//! Two semaphores carry the state: `admission` holds one permit per execution
//! slot plus one per queue slot and is only ever acquired without waiting;
//! `slots` holds one permit per execution slot and is awaited by admitted
//! calls. Both permits are released on drop, so a call that panics or is
//! cancelled frees its capacity. Cancellation is observed while queued and
//! while the operation runs. Queued callers are counted separately, so
//! [`Bulkhead::queued`] never includes a call that is finishing.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use super::context::ExecutionContext;
use super::error::{ConfigError, ConfigResult, PolicyError, PolicyResult};
use super::operation::{invoke_cancellable, Operation};
use super::policy::Policy;

/// Configuration for bulkhead behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkheadConfig {
    /// Maximum number of concurrently executing operations
    pub max_parallel: usize,
    /// Maximum number of operations waiting for an execution slot
    pub max_queued: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self { max_parallel: 10, max_queued: 1 }
    }
}

impl BulkheadConfig {
    /// Create a new configuration builder
    pub fn builder() -> BulkheadConfigBuilder {
        BulkheadConfigBuilder::new()
    }

    /// Execution slots plus queue slots
    pub fn capacity(&self) -> usize {
        self.max_parallel.saturating_add(self.max_queued)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_parallel == 0 {
            return Err(ConfigError::invalid("max_parallel must be greater than 0"));
        }
        if self.capacity() > Semaphore::MAX_PERMITS {
            return Err(ConfigError::invalid("max_parallel + max_queued exceeds semaphore limit"));
        }
        Ok(())
    }
}

/// Builder for BulkheadConfig
#[derive(Debug)]
pub struct BulkheadConfigBuilder {
    config: BulkheadConfig,
}

impl Default for BulkheadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkheadConfigBuilder {
    pub fn new() -> Self {
        Self { config: BulkheadConfig::default() }
    }

    pub fn max_parallel(mut self, max: usize) -> Self {
        self.config.max_parallel = max;
        self
    }

    pub fn max_queued(mut self, max: usize) -> Self {
        self.config.max_queued = max;
        self
    }

    pub fn build(self) -> ConfigResult<BulkheadConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Metrics for bulkhead monitoring
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkheadMetrics {
    /// Operations that obtained an execution slot
    pub executed: u64,
    /// Calls turned away because the bulkhead was full
    pub rejected: u64,
    /// Operations executing right now
    pub executing: usize,
    /// Calls waiting for an execution slot right now
    pub queued: usize,
    pub max_parallel: usize,
    pub max_queued: usize,
}

impl BulkheadMetrics {
    /// Calculate the current utilization as a percentage (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_parallel == 0 {
            return 0.0;
        }
        self.executing as f64 / self.max_parallel as f64
    }

    /// Calculate the rejection rate as a percentage (0.0 to 1.0)
    pub fn rejection_rate(&self) -> f64 {
        let total = self.executed + self.rejected;
        if total == 0 {
            return 0.0;
        }
        self.rejected as f64 / total as f64
    }

    /// Check if every execution and queue slot is taken
    pub fn is_at_capacity(&self) -> bool {
        self.executing >= self.max_parallel && self.queued >= self.max_queued
    }

    /// Get a human-readable status message
    pub fn status_message(&self) -> String {
        format!(
            "Bulkhead: {}/{} executing ({:.1}% utilized), {}/{} queued, {} rejected",
            self.executing,
            self.max_parallel,
            self.utilization() * 100.0,
            self.queued,
            self.max_queued,
            self.rejected
        )
    }
}

/// Callback invoked with the call's context whenever the bulkhead rejects it
pub type RejectionCallback = Arc<dyn Fn(&ExecutionContext) + Send + Sync>;

/// Bulkhead policy
///
/// Share one instance (usually through the registry) between every call that
/// should compete for the same slots.
///
/// # Examples
///
/// ```rust,ignore
/// use httpguard_common::resilience::{Bulkhead, BulkheadConfig};
///
/// let config = BulkheadConfig::builder().max_parallel(10).max_queued(1).build()?;
/// let bulkhead = Bulkhead::new(config)?.on_rejected(|ctx| {
///     tracing::warn!(operation = ctx.operation_key(), "rejected");
/// });
/// ```
pub struct Bulkhead {
    name: String,
    config: BulkheadConfig,
    admission: Semaphore,
    slots: Semaphore,
    waiting: AtomicUsize,
    executed: AtomicU64,
    rejected: AtomicU64,
    on_rejected: Option<RejectionCallback>,
}

impl Bulkhead {
    /// Create a new bulkhead with the given configuration
    pub fn new(config: BulkheadConfig) -> ConfigResult<Self> {
        config.validate()?;

        Ok(Self {
            name: "BulkHead".to_string(),
            admission: Semaphore::new(config.capacity()),
            slots: Semaphore::new(config.max_parallel),
            waiting: AtomicUsize::new(0),
            executed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            on_rejected: None,
            config,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a callback invoked for every rejected call
    pub fn on_rejected<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        self.on_rejected = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    /// Get the current number of executing operations
    pub fn executing(&self) -> usize {
        self.config.max_parallel.saturating_sub(self.slots.available_permits())
    }

    /// Get the current number of calls waiting for an execution slot
    pub fn queued(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Get bulkhead metrics
    pub fn metrics(&self) -> BulkheadMetrics {
        BulkheadMetrics {
            executed: self.executed.load(Ordering::Acquire),
            rejected: self.rejected.load(Ordering::Acquire),
            executing: self.executing(),
            queued: self.queued(),
            max_parallel: self.config.max_parallel,
            max_queued: self.config.max_queued,
        }
    }

    /// Reset metrics counters
    pub fn reset_metrics(&self) {
        self.executed.store(0, Ordering::Release);
        self.rejected.store(0, Ordering::Release);
    }

    fn reject<E>(&self, ctx: &ExecutionContext) -> PolicyError<E> {
        self.rejected.fetch_add(1, Ordering::AcqRel);
        warn!(
            bulkhead = %self.name,
            operation = ctx.operation_key(),
            max_parallel = self.config.max_parallel,
            max_queued = self.config.max_queued,
            "bulkhead full, rejecting call"
        );
        if let Some(callback) = &self.on_rejected {
            callback(ctx);
        }
        PolicyError::BulkheadRejected {
            max_parallel: self.config.max_parallel,
            max_queued: self.config.max_queued,
        }
    }
}

impl fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.name)
            .field("max_parallel", &self.config.max_parallel)
            .field("max_queued", &self.config.max_queued)
            .field("executing", &self.executing())
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T, E> Policy<T, E> for Bulkhead
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, ctx, operation), fields(policy = %self.name, operation = ctx.operation_key()))]
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        operation: &dyn Operation<T, E>,
    ) -> PolicyResult<T, E> {
        let Ok(_admitted) = self.admission.try_acquire() else {
            return Err(self.reject(ctx));
        };

        let waiting = Waiting::enter(&self.waiting);
        let _slot = tokio::select! {
            biased;
            () = ctx.cancelled() => {
                debug!("cancelled while queued for a bulkhead slot");
                return Err(PolicyError::Cancelled);
            }
            permit = self.slots.acquire() => match permit {
                Ok(permit) => permit,
                // The semaphore is never closed while the bulkhead is alive.
                Err(_) => return Err(self.reject(ctx)),
            },
        };
        drop(waiting);

        self.executed.fetch_add(1, Ordering::AcqRel);
        debug!(executing = self.executing(), queued = self.queued(), "bulkhead slot acquired");

        invoke_cancellable(ctx, operation).await
    }
}

/// Counts a caller as queued until dropped
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
