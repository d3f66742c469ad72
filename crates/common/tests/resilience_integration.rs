//! Integration tests for resilience module
//!
//! Exercises policies composed through the registry and pipelines, the way
//! callers use them: shared instances, nested policies and concurrent calls.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use httpguard_common::resilience::{
    classified, keys, Bulkhead, BulkheadConfig, CircuitBreakerConfig, CircuitState,
    ExecutionContext, MockClock, Operation, Policy, PolicyError, PolicyRegistry, PolicyResult,
    RetryConfig, RetryPolicy,
};
use httpguard_common::testing::{ScriptedOperation, TestFailure};

type Registry = PolicyRegistry<String, TestFailure>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("httpguard_common=debug"))
        .with_test_writer()
        .try_init();
}

fn reference_registry(clock: MockClock) -> Registry {
    let breaker = CircuitBreakerConfig::builder()
        .clock(clock)
        .failure_threshold(5)
        .open_duration(Duration::from_secs(30))
        .build()
        .expect("breaker config");
    let retry = RetryConfig::builder()
        .max_retries(3)
        .fixed_backoff(Duration::from_millis(600))
        .build()
        .expect("retry config");
    let bulkhead = Bulkhead::new(BulkheadConfig::default()).expect("bulkhead config");

    let mut builder = PolicyRegistry::builder();
    builder.register("Retry", RetryPolicy::new(retry)).expect("unique key");
    builder.register("CircuitBreaker", breaker).expect("unique key");
    builder.register("BulkHead", bulkhead).expect("unique key");
    builder.build()
}

async fn run(
    policy: &dyn Policy<String, TestFailure>,
    ctx: &ExecutionContext,
    op: &dyn Operation<String, TestFailure>,
) -> PolicyResult<String, TestFailure> {
    policy.execute(ctx, op).await
}

/// Validates the retry-around-breaker pipeline against a dependency that
/// keeps failing, then recovers.
///
/// # Test Steps
/// 1. Build the reference registry (3 retries at 600 ms, breaker 5 / 30 s)
/// 2. Call an always-failing operation twice through `[Retry, CircuitBreaker]`
/// 3. Verify the second call ends with `CircuitOpen` after 5 invocations total
/// 4. Advance the breaker clock past the open duration
/// 5. Verify a healthy operation closes the circuit again
#[tokio::test(start_paused = true)]
async fn test_retry_breaker_pipeline_opens_and_recovers() {
    init_tracing();
    let clock = MockClock::new();
    let registry = reference_registry(clock.clone());
    let pipeline = registry.pipeline(&["Retry", "CircuitBreaker"]).expect("pipeline");
    let failing = ScriptedOperation::always_transient();

    let first = run(&pipeline, &ExecutionContext::new("first"), &failing).await;
    assert!(first.unwrap_err().is_transient());
    assert_eq!(failing.calls(), 4);

    let second = run(&pipeline, &ExecutionContext::new("second"), &failing).await;
    assert!(second.unwrap_err().is_circuit_open());
    assert_eq!(failing.calls(), 5);

    clock.advance(Duration::from_secs(30));
    let healthy = ScriptedOperation::fail_then_succeed(0, "ok".to_string());
    let ctx = ExecutionContext::new("recovered");
    let result = run(&pipeline, &ctx, &healthy).await;

    assert_eq!(result.ok().as_deref(), Some("ok"));
    assert_eq!(ctx.get(keys::CIRCUIT_STATE), Some(CircuitState::HalfOpen.to_string().into()));
    let breaker = registry.resolve("CircuitBreaker").expect("registered");
    assert!(format!("{breaker:?}").contains("Closed"));
}

/// Validates that 30 concurrent calls through the reference bulkhead never
/// run more than 10 operations at once.
///
/// # Test Steps
/// 1. Spawn 30 calls whose operation sleeps briefly
/// 2. Track concurrent executions inside the operation
/// 3. Verify the peak stays at or below 10
/// 4. Verify every call either succeeded or was rejected, with at least 10
///    successes
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_thirty_concurrent_calls_respect_bulkhead() {
    let registry = Arc::new(reference_registry(MockClock::new()));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..30)
        .map(|i| {
            let (registry, running, peak) =
                (Arc::clone(&registry), Arc::clone(&running), Arc::clone(&peak));
            tokio::spawn(async move {
                let bulkhead = registry.resolve("BulkHead").expect("registered");
                let op = move |_ctx: ExecutionContext| {
                    let (running, peak) = (Arc::clone(&running), Arc::clone(&peak));
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, PolicyError<TestFailure>>(format!("task {i}"))
                    }
                };
                run(bulkhead.as_ref(), &ExecutionContext::new(format!("bulk.{i}")), &op).await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("task should not panic") {
            Ok(_) => succeeded += 1,
            Err(err) if err.is_bulkhead_rejected() => rejected += 1,
            Err(err) => panic!("unexpected failure: {err}"),
        }
    }

    assert!(peak.load(Ordering::SeqCst) <= 10);
    assert_eq!(succeeded + rejected, 30);
    assert!(succeeded >= 10);
}

#[tokio::test]
async fn test_classified_operation_through_pipeline() {
    let registry = reference_registry(MockClock::new());
    let pipeline = registry.pipeline(&["CircuitBreaker"]).expect("pipeline");
    let op = classified(
        |err: &TestFailure| err.message() == "timeout",
        |_ctx| async { Err::<String, _>(TestFailure::new("not found")) },
    );

    let err = run(&pipeline, &ExecutionContext::new("classified"), &op).await.unwrap_err();
    assert!(!err.is_transient());
    assert_eq!(err.operation_error().map(TestFailure::message), Some("not found"));
}

/// Validates that context data written inside the pipeline reaches the
/// caller and that the correlation id is preserved.
#[tokio::test(start_paused = true)]
async fn test_context_flows_through_nested_policies() {
    let registry = reference_registry(MockClock::new());
    let pipeline = registry.pipeline(&["BulkHead", "Retry", "CircuitBreaker"]).expect("pipeline");
    let ctx = ExecutionContext::new("ctx.flow");
    let expected_id = ctx.correlation_id();

    let op = Arc::new(ScriptedOperation::new(|call| {
        if call == 1 {
            Err(PolicyError::transient(TestFailure::new("first")))
        } else {
            Ok(format!("call {call}"))
        }
    }));
    let seen = move |inner: ExecutionContext| {
        let op = Arc::clone(&op);
        async move {
            assert_eq!(inner.correlation_id(), expected_id);
            inner.insert("visited", true);
            op.invoke(inner).await
        }
    };

    let result = run(&pipeline, &ctx, &seen).await;
    assert_eq!(result.ok().as_deref(), Some("call 2"));
    assert_eq!(ctx.get(keys::RETRY_ATTEMPTS), Some(2.into()));
    assert_eq!(ctx.get("visited"), Some(true.into()));
    assert_eq!(pipeline.name(), "BulkHead+Retry+CircuitBreaker");
}
