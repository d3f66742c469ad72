//! Circuit breaker policy
//!
//! One state machine shared by every call routed through the breaker:
//!
//! - **Closed**: calls pass through; consecutive transient failures are
//!   counted and reaching the threshold opens the circuit.
//! - **Open**: calls fail fast with [`PolicyError::CircuitOpen`] until the
//!   open duration elapses.
//! - **HalfOpen**: exactly one trial call runs; success closes the circuit,
//!   a transient failure reopens it with a fresh timer.
//!
//! All state lives in a single struct behind one mutex, so every admission
//! and every recorded outcome is a linearizable read-modify-write.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::context::{keys, ExecutionContext};
use super::error::{ConfigError, ConfigResult, PolicyError, PolicyResult};
use super::operation::{invoke_cancellable, Operation};
use super::policy::Policy;

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Trait for time operations to enable deterministic testing
///
/// Lets circuit breakers use real time in production and controlled mock
/// time in tests, so open-duration behavior is tested without sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> u64 {
        let elapsed = self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default();
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed time, so a test can keep one handle and
/// hand another to the breaker.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        *self.elapsed.lock() = duration;
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + self.elapsed()
    }
}

//==============================================================================
// Configuration
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, admitting a single trial request
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a trial call
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, open_duration: Duration::from_secs(30) }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }

        if self.open_duration.is_zero() {
            return Err(ConfigError::invalid("open_duration must be greater than 0"));
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.config.open_duration = duration;
        self
    }

    /// Set a custom clock for the circuit breaker (useful for testing)
    pub fn clock<C: Clock>(self, clock: C) -> CircuitBreakerBuilderWithClock<C> {
        CircuitBreakerBuilderWithClock { config: self.config, clock }
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Builder with custom clock that builds a CircuitBreaker directly
pub struct CircuitBreakerBuilderWithClock<C: Clock> {
    config: CircuitBreakerConfig,
    clock: C,
}

impl<C: Clock> CircuitBreakerBuilderWithClock<C> {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.config.open_duration = duration;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreaker<C>> {
        CircuitBreaker::with_clock(self.config, self.clock)
    }
}

//==============================================================================
// Circuit Breaker
//==============================================================================

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Calls admitted to the operation
    pub total_calls: u64,
    /// Calls refused with `CircuitOpen`
    pub rejected_calls: u64,
    pub transitions: u64,
    pub isolated: bool,
    #[serde(skip)]
    pub opened_at: Option<Instant>,
}

/// Callback invoked after every state transition with `(from, to)`
pub type TransitionListener = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

struct BreakerState {
    circuit: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    isolated: bool,
    trial_in_flight: bool,
    // Bumped on every transition; outcomes of calls admitted in an earlier
    // epoch are discarded.
    epoch: u64,
    total_calls: u64,
    rejected_calls: u64,
    transitions: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            circuit: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            isolated: false,
            trial_in_flight: false,
            epoch: 0,
            total_calls: 0,
            rejected_calls: 0,
            transitions: 0,
        }
    }

    fn transition(&mut self, to: CircuitState, now: Instant) -> Option<(CircuitState, CircuitState)> {
        let from = self.circuit;
        self.circuit = to;
        self.epoch += 1;
        self.consecutive_failures = 0;
        self.trial_in_flight = false;
        self.opened_at = (to == CircuitState::Open).then_some(now);
        if from == to {
            return None;
        }
        self.transitions += 1;
        Some((from, to))
    }

    /// Lazily move Open to HalfOpen once the open duration has elapsed
    fn refresh(
        &mut self,
        now: Instant,
        open_duration: Duration,
    ) -> Option<(CircuitState, CircuitState)> {
        match (self.circuit, self.opened_at) {
            (CircuitState::Open, Some(opened_at))
                if !self.isolated && now.saturating_duration_since(opened_at) >= open_duration =>
            {
                self.transition(CircuitState::HalfOpen, now)
            }
            _ => None,
        }
    }

    fn remaining_open(&self, now: Instant, open_duration: Duration) -> Duration {
        match self.opened_at {
            Some(opened_at) if !self.isolated => {
                open_duration.saturating_sub(now.saturating_duration_since(opened_at))
            }
            Some(_) => open_duration,
            None => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal { epoch: u64 },
    Trial { epoch: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Neutral,
}

impl Outcome {
    fn of<T, E>(result: &PolicyResult<T, E>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(error) if error.is_transient() => Outcome::Failure,
            Err(_) => Outcome::Neutral,
        }
    }
}

/// Permission to run one call; settles as neutral if dropped unsettled
struct Ticket<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    admission: Admission,
    settled: bool,
}

impl<C: Clock> Ticket<'_, C> {
    fn settle(mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.record(self.admission, outcome);
    }
}

impl<C: Clock> Drop for Ticket<'_, C> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record(self.admission, Outcome::Neutral);
        }
    }
}

/// Circuit breaker policy
///
/// Only [`PolicyError::Transient`] failures count against the circuit;
/// permanent failures, nested rejections and cancellations are neutral.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// use httpguard_common::resilience::{CircuitBreaker, CircuitBreakerConfig};
///
/// let config = CircuitBreakerConfig::builder()
///     .failure_threshold(5)
///     .open_duration(Duration::from_secs(30))
///     .build()?;
/// let breaker = CircuitBreaker::new(config)?;
/// ```
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    clock: C,
    on_transition: Option<TransitionListener>,
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker using the system clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a circuit breaker using the builder pattern
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        Ok(Self {
            name: "CircuitBreaker".to_string(),
            config,
            state: Mutex::new(BreakerState::new()),
            clock,
            on_transition: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a callback invoked after every state transition
    pub fn on_transition<F>(mut self, listener: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_transition = Some(Arc::new(listener));
        self
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, applying a pending Open to HalfOpen transition
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        let transition = state.refresh(self.clock.now(), self.config.open_duration);
        let circuit = state.circuit;
        drop(state);
        self.notify(transition);
        circuit
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let circuit = self.state();
        let state = self.state.lock();
        CircuitBreakerMetrics {
            state: circuit,
            consecutive_failures: state.consecutive_failures,
            total_calls: state.total_calls,
            rejected_calls: state.rejected_calls,
            transitions: state.transitions,
            isolated: state.isolated,
            opened_at: state.opened_at,
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.isolated = false;
        let transition = state.transition(CircuitState::Closed, self.clock.now());
        drop(state);
        info!(breaker = %self.name, "circuit breaker manually reset to closed state");
        self.notify(transition);
    }

    /// Hold the circuit open until [`reset`](Self::reset) is called
    pub fn isolate(&self) {
        let mut state = self.state.lock();
        state.isolated = true;
        let transition = state.transition(CircuitState::Open, self.clock.now());
        drop(state);
        warn!(breaker = %self.name, "circuit breaker manually isolated");
        self.notify(transition);
    }

    fn admit(&self) -> Result<Ticket<'_, C>, Duration> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let transition = state.refresh(now, self.config.open_duration);

        let admission = match state.circuit {
            CircuitState::Closed => Ok(Admission::Normal { epoch: state.epoch }),
            CircuitState::HalfOpen if !state.trial_in_flight => {
                state.trial_in_flight = true;
                Ok(Admission::Trial { epoch: state.epoch })
            }
            CircuitState::HalfOpen => Err(Duration::ZERO),
            CircuitState::Open => Err(state.remaining_open(now, self.config.open_duration)),
        };

        match admission {
            Ok(_) => state.total_calls += 1,
            Err(_) => state.rejected_calls += 1,
        }
        drop(state);
        self.notify(transition);

        admission.map(|admission| Ticket { breaker: self, admission, settled: false })
    }

    fn record(&self, admission: Admission, outcome: Outcome) {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let transition = match admission {
            Admission::Normal { epoch } if epoch == state.epoch => match outcome {
                Outcome::Success => {
                    state.consecutive_failures = 0;
                    None
                }
                Outcome::Failure => {
                    state.consecutive_failures += 1;
                    if state.consecutive_failures >= self.config.failure_threshold {
                        warn!(
                            breaker = %self.name,
                            failures = state.consecutive_failures,
                            open_for_ms = self.config.open_duration.as_millis() as u64,
                            "circuit breaker opened"
                        );
                        state.transition(CircuitState::Open, now)
                    } else {
                        None
                    }
                }
                Outcome::Neutral => None,
            },
            Admission::Trial { epoch } if epoch == state.epoch => match outcome {
                Outcome::Success => {
                    info!(breaker = %self.name, "trial call succeeded, circuit closed");
                    state.transition(CircuitState::Closed, now)
                }
                Outcome::Failure => {
                    warn!(breaker = %self.name, "trial call failed, circuit reopened");
                    state.transition(CircuitState::Open, now)
                }
                Outcome::Neutral => {
                    state.trial_in_flight = false;
                    None
                }
            },
            Admission::Normal { .. } | Admission::Trial { .. } => {
                debug!(breaker = %self.name, ?outcome, "ignoring outcome from earlier circuit epoch");
                None
            }
        };

        drop(state);
        self.notify(transition);
    }

    fn notify(&self, transition: Option<(CircuitState, CircuitState)>) {
        let Some((from, to)) = transition else {
            return;
        };
        if to == CircuitState::HalfOpen {
            info!(breaker = %self.name, %from, %to, "circuit breaker admitting trial call");
        }
        if let Some(listener) = &self.on_transition {
            listener(from, to);
        }
    }
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &state.circuit)
            .field("consecutive_failures", &state.consecutive_failures)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T, E, C> Policy<T, E> for CircuitBreaker<C>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    C: Clock,
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
        let ticket = match self.admit() {
            Ok(ticket) => ticket,
            Err(retry_after) => {
                ctx.insert(keys::CIRCUIT_STATE, CircuitState::Open.to_string());
                debug!(retry_after_ms = retry_after.as_millis() as u64, "circuit breaker rejecting call");
                return Err(PolicyError::CircuitOpen { retry_after });
            }
        };

        if let Admission::Trial { .. } = ticket.admission {
            ctx.insert(keys::CIRCUIT_STATE, CircuitState::HalfOpen.to_string());
        } else {
            ctx.insert(keys::CIRCUIT_STATE, CircuitState::Closed.to_string());
        }

        let result = invoke_cancellable(ctx, operation).await;
        ticket.settle(Outcome::of(&result));
        result
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the circuit breaker
    //!
    //! Tests cover the clock abstraction, configuration validation, the
    //! Closed/Open/HalfOpen state machine, trial exclusivity and neutral
    //! outcomes.

    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ErrorClassification;
    use crate::testing::{GatedOperation, ScriptedOperation, TestFailure};

    fn breaker(threshold: u32, open_secs: u64) -> (CircuitBreaker<MockClock>, MockClock) {
        let clock = MockClock::new();
        let breaker = CircuitBreakerConfig::builder()
            .clock(clock.clone())
            .failure_threshold(threshold)
            .open_duration(Duration::from_secs(open_secs))
            .build()
            .expect("valid breaker config");
        (breaker, clock)
    }

    async fn run(
        breaker: &CircuitBreaker<MockClock>,
        op: &ScriptedOperation<u32, TestFailure>,
    ) -> PolicyResult<u32, TestFailure> {
        breaker.execute(&ExecutionContext::new("breaker.test"), op).await
    }

    async fn trip(breaker: &CircuitBreaker<MockClock>, failures: u32) {
        let failing = ScriptedOperation::always_transient();
        for _ in 0..failures {
            let _ = run(breaker, &failing).await;
        }
    }

    // =========================================================================
    // Clock Tests
    // =========================================================================

    /// Validates `MockClock::advance` and `set_elapsed`.
    ///
    /// Assertions:
    /// - `now()` moves by exactly the advanced duration.
    /// - Clones observe the same elapsed time.
    #[test]
    fn test_mock_clock_controls_time() {
        let clock = MockClock::new();
        let start = clock.now();
        let shared = clock.clone();

        clock.advance(Duration::from_secs(5));
        assert_eq!(shared.now().duration_since(start), Duration::from_secs(5));

        shared.set_elapsed(Duration::from_secs(20));
        assert_eq!(clock.elapsed(), Duration::from_secs(20));
        assert_eq!(clock.millis_since_epoch(), 20_000);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let first = clock.now();
        assert!(clock.now() >= first);
        assert!(clock.system_time() > UNIX_EPOCH);
    }

    // =========================================================================
    // Configuration Tests
    // =========================================================================

    /// Validates reference defaults and validation of zero values.
    ///
    /// Assertions:
    /// - Defaults are threshold 5 and a 30 s open duration.
    /// - Zero threshold and zero open duration are rejected.
    #[test]
    fn test_config_defaults_and_validation() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.open_duration, Duration::from_secs(30));

        assert!(CircuitBreakerConfig::builder().failure_threshold(0).build().is_err());
        assert!(CircuitBreakerConfig::builder().open_duration(Duration::ZERO).build().is_err());
        assert!(CircuitBreaker::new(config).is_ok());
    }

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }

    // =========================================================================
    // State Machine Tests
    // =========================================================================

    /// Validates the circuit opens after the threshold and fails fast.
    ///
    /// Assertions:
    /// - The circuit stays closed below the threshold.
    /// - After `threshold` failures the next call returns `CircuitOpen`
    ///   without invoking the operation.
    #[tokio::test]
    async fn test_opens_after_threshold_and_fails_fast() {
        let (breaker, _clock) = breaker(5, 30);

        trip(&breaker, 4).await;
        assert_eq!(breaker.state(), CircuitState::Closed);

        trip(&breaker, 1).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let untouched = ScriptedOperation::fail_then_succeed(0, 1_u32);
        let err = run(&breaker, &untouched).await.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(untouched.calls(), 0);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let (breaker, _clock) = breaker(3, 30);
        let ok = ScriptedOperation::fail_then_succeed(0, 1_u32);

        trip(&breaker, 2).await;
        assert!(run(&breaker, &ok).await.is_ok());
        trip(&breaker, 2).await;

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().consecutive_failures, 2);
    }

    /// Validates the Open to HalfOpen transition and successful trial.
    ///
    /// Assertions:
    /// - The circuit reports HalfOpen once the open duration elapsed.
    /// - A successful trial closes the circuit and resets the counter.
    #[tokio::test]
    async fn test_trial_success_closes_circuit() {
        let (breaker, clock) = breaker(2, 30);
        trip(&breaker, 2).await;

        clock.advance(Duration::from_secs(29));
        assert_eq!(breaker.state(), CircuitState::Open);
        clock.advance(Duration::from_secs(1));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let ok = ScriptedOperation::fail_then_succeed(0, 9_u32);
        assert_eq!(run(&breaker, &ok).await.ok(), Some(9));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_trial_failure_reopens_with_fresh_timer() {
        let (breaker, clock) = breaker(2, 30);
        trip(&breaker, 2).await;
        clock.advance(Duration::from_secs(31));

        trip(&breaker, 1).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(29));
        assert_eq!(breaker.state(), CircuitState::Open);
        clock.advance(Duration::from_secs(1));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    /// Validates that only one trial call runs while HalfOpen.
    ///
    /// Assertions:
    /// - A second call during the outstanding trial gets `CircuitOpen`.
    /// - The trial's success closes the circuit.
    #[tokio::test]
    async fn test_half_open_admits_exactly_one_trial() {
        let (breaker, clock) = breaker(1, 10);
        let breaker = Arc::new(breaker);
        trip(&breaker, 1).await;
        clock.advance(Duration::from_secs(10));

        let gate = Arc::new(GatedOperation::<TestFailure>::new());
        let trial = {
            let (breaker, gate) = (Arc::clone(&breaker), Arc::clone(&gate));
            tokio::spawn(async move {
                let result: PolicyResult<(), TestFailure> =
                    breaker.execute(&ExecutionContext::new("trial"), gate.as_ref()).await;
                result
            })
        };
        crate::assert_eventually_async!(Duration::from_secs(1), async { gate.entered() == 1 });

        let untouched = ScriptedOperation::fail_then_succeed(0, 1_u32);
        let err = run(&breaker, &untouched).await.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(untouched.calls(), 0);

        gate.release_all();
        assert!(trial.await.expect("trial task").is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    /// Validates that cancelling a running trial frees the trial slot.
    ///
    /// Assertions:
    /// - The trial returns `Cancelled` promptly while still parked.
    /// - The circuit stays HalfOpen and the next call runs as the trial.
    #[tokio::test]
    async fn test_cancelled_trial_is_neutral() {
        let (breaker, clock) = breaker(1, 10);
        let breaker = Arc::new(breaker);
        trip(&breaker, 1).await;
        clock.advance(Duration::from_secs(10));

        let gate = Arc::new(GatedOperation::<TestFailure>::new());
        let ctx = ExecutionContext::new("trial.cancelled");
        let trial = {
            let (breaker, gate, ctx) = (Arc::clone(&breaker), Arc::clone(&gate), ctx.clone());
            tokio::spawn(async move {
                let result: PolicyResult<(), TestFailure> =
                    breaker.execute(&ctx, gate.as_ref()).await;
                result
            })
        };
        crate::assert_eventually_async!(Duration::from_secs(1), async { gate.entered() == 1 });

        ctx.cancel();
        let result = tokio::time::timeout(Duration::from_millis(500), trial)
            .await
            .expect("cancelled trial should return promptly")
            .expect("trial task");
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let next = ScriptedOperation::fail_then_succeed(0, 1_u32);
        assert_eq!(run(&breaker, &next).await.ok(), Some(1));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_neutral() {
        let (breaker, _clock) = breaker(2, 30);
        let permanent = ScriptedOperation::always_permanent();

        for _ in 0..5 {
            let err = run(&breaker, &permanent).await.unwrap_err();
            assert!(!err.is_circuit_open());
        }

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().consecutive_failures, 0);
    }

    /// Validates that a neutral trial releases the slot without closing.
    ///
    /// Assertions:
    /// - After a permanent failure as the trial, the circuit stays HalfOpen.
    /// - The next call is admitted as a new trial.
    #[tokio::test]
    async fn test_neutral_trial_keeps_half_open() {
        let (breaker, clock) = breaker(1, 5);
        trip(&breaker, 1).await;
        clock.advance(Duration::from_secs(5));

        let permanent = ScriptedOperation::always_permanent();
        let _ = run(&breaker, &permanent).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let ok = ScriptedOperation::fail_then_succeed(0, 1_u32);
        assert!(run(&breaker, &ok).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_isolate_and_reset() {
        let (breaker, clock) = breaker(5, 1);
        let ok = ScriptedOperation::fail_then_succeed(0, 1_u32);

        breaker.isolate();
        clock.advance(Duration::from_secs(60));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(run(&breaker, &ok).await.unwrap_err().is_circuit_open());

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(run(&breaker, &ok).await.is_ok());
    }

    /// Validates transition callbacks and metrics counters.
    ///
    /// Assertions:
    /// - The listener sees Closed to Open, Open to HalfOpen, HalfOpen to
    ///   Closed.
    /// - Metrics count admitted and rejected calls.
    #[tokio::test]
    async fn test_transition_listener_and_metrics() {
        let clock = MockClock::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let breaker = CircuitBreakerConfig::builder()
            .clock(clock.clone())
            .failure_threshold(1)
            .open_duration(Duration::from_secs(1))
            .build()
            .expect("valid config")
            .on_transition(move |from, to| recorder.lock().push((from, to)));

        trip(&breaker, 1).await;
        let ok = ScriptedOperation::fail_then_succeed(0, 1_u32);
        let _ = run(&breaker, &ok).await;
        clock.advance(Duration::from_secs(1));
        let _ = run(&breaker, &ok).await;

        assert_eq!(
            *seen.lock(),
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );

        let metrics = breaker.metrics();
        assert_eq!(metrics.total_calls, 2);
        assert_eq!(metrics.rejected_calls, 1);
        assert_eq!(metrics.transitions, 3);
    }

    #[tokio::test]
    async fn test_stale_outcome_is_ignored_after_reset() {
        let (breaker, _clock) = breaker(1, 30);
        let breaker = Arc::new(breaker);
        let gate = Arc::new(GatedOperation::<TestFailure>::new().failing());
        let calls = Arc::new(AtomicUsize::new(0));

        let pending = {
            let (breaker, gate, calls) = (Arc::clone(&breaker), Arc::clone(&gate), Arc::clone(&calls));
            tokio::spawn(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let result: PolicyResult<(), TestFailure> =
                    breaker.execute(&ExecutionContext::new("stale"), gate.as_ref()).await;
                result
            })
        };
        crate::assert_eventually_async!(Duration::from_secs(1), async { gate.entered() == 1 });

        breaker.isolate();
        breaker.reset();
        gate.release_all();
        assert!(pending.await.expect("task").is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().consecutive_failures, 0);
    }
}
