//! Resilience policies built from configuration
//!
//! Startup composition for HTTP calls: each settings section becomes one
//! policy, and [`build_registry`] registers all three under the reference
//! keys (`Retry`, `CircuitBreaker`, `BulkHead`). Clients then resolve the
//! keys they want into a pipeline, sharing breaker and bulkhead state with
//! every other client that names the same key.

use httpguard_common::resilience::{
    keys, Bulkhead, BulkheadConfig, CircuitBreaker, CircuitBreakerConfig, ConfigResult, Pipeline,
    PolicyRegistry, RetryConfig, RetryPolicy,
};
use httpguard_domain::constants::{
    BULKHEAD_POLICY_KEY, CIRCUIT_BREAKER_POLICY_KEY, RETRY_POLICY_KEY,
};
use httpguard_domain::{
    BulkheadSettings, CircuitBreakerSettings, Config, DomainError, Result, RetrySettings,
};
use tracing::{info, warn};

use crate::http::{HttpFailure, HttpResponse};

pub type HttpPipeline = Pipeline<HttpResponse, HttpFailure>;
pub type HttpPolicyRegistry = PolicyRegistry<HttpResponse, HttpFailure>;

/// Fixed-delay retry of transient HTTP failures
///
/// # Errors
/// Returns a `ConfigError` if the settings are rejected by the policy.
pub fn retry_policy(settings: &RetrySettings) -> ConfigResult<RetryPolicy<HttpFailure>> {
    let config = RetryConfig::builder()
        .max_retries(settings.max_retries)
        .fixed_backoff(settings.delay())
        .no_jitter()
        .build()?;
    Ok(RetryPolicy::new(config).with_name(RETRY_POLICY_KEY))
}

/// Consecutive-failure circuit breaker with transition logging
///
/// # Errors
/// Returns a `ConfigError` for a zero threshold or open duration.
pub fn circuit_breaker_policy(settings: &CircuitBreakerSettings) -> ConfigResult<CircuitBreaker> {
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(settings.failure_threshold)
        .open_duration(settings.open_duration())
        .build()?;
    Ok(CircuitBreaker::new(config)?.with_name(CIRCUIT_BREAKER_POLICY_KEY).on_transition(
        |from, to| {
            info!(breaker = CIRCUIT_BREAKER_POLICY_KEY, %from, %to, "circuit state changed");
        },
    ))
}

/// Bulkhead that marks rejected calls on their context
///
/// # Errors
/// Returns a `ConfigError` for a zero `max_parallel`.
pub fn bulkhead_policy(settings: &BulkheadSettings) -> ConfigResult<Bulkhead> {
    let config = BulkheadConfig::builder()
        .max_parallel(settings.max_parallel)
        .max_queued(settings.max_queued)
        .build()?;
    Ok(Bulkhead::new(config)?.with_name(BULKHEAD_POLICY_KEY).on_rejected(|ctx| {
        ctx.insert(keys::BULKHEAD_REJECTED, true);
        warn!(operation = ctx.operation_key(), "Bulk head rejected executed.");
    }))
}

/// Validate `config` and register the three reference policies
///
/// # Errors
/// Returns `DomainError::Config` if the configuration is invalid or a policy
/// rejects its settings.
pub fn build_registry(config: &Config) -> Result<HttpPolicyRegistry> {
    config.validate()?;

    let retry = retry_policy(&config.retry).map_err(config_error)?;
    let breaker = circuit_breaker_policy(&config.circuit_breaker).map_err(config_error)?;
    let bulkhead = bulkhead_policy(&config.bulkhead).map_err(config_error)?;

    let mut builder = HttpPolicyRegistry::builder();
    builder.register(RETRY_POLICY_KEY, retry).map_err(internal_error)?;
    builder.register(CIRCUIT_BREAKER_POLICY_KEY, breaker).map_err(internal_error)?;
    builder.register(BULKHEAD_POLICY_KEY, bulkhead).map_err(internal_error)?;

    Ok(builder.build())
}

fn config_error(err: impl std::fmt::Display) -> DomainError {
    DomainError::Config(err.to_string())
}

fn internal_error(err: impl std::fmt::Display) -> DomainError {
    DomainError::Internal(err.to_string())
}
