//! httpguard demo
//!
//! Builds the reference policy registry from configuration and drives four
//! clients against a status-code test server (`https://httpstat.us` unless
//! `HTTPGUARD_BASE_URL` or a config file says otherwise):
//!
//! - retry client: `/500` and `/408`, 3 retries each
//! - retry + circuit breaker client: the breaker opens after 5 failures
//!   counted across calls
//! - bulkhead client: 30 concurrent calls against 10 slots and 1 queue place
//! - custom handler client: rejected locally without an API key header
//!
//! Set `RUST_LOG` to change verbosity; the default is `httpguard=debug`.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use httpguard_common::ErrorClassification;
use httpguard_domain::constants::{
    BULKHEAD_POLICY_KEY, CIRCUIT_BREAKER_POLICY_KEY, RETRY_POLICY_KEY,
};
use httpguard_domain::Config;
use httpguard_infra::{
    build_registry, config, ApiResponse, ClientError, CorrelationIdHandler,
    DefaultHeadersHandler, HttpPolicyRegistry, ReqwestTransport, ResilientClient,
    ValidateHeaderHandler,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BULKHEAD_TASKS: usize = 30;

/// The four reference clients
struct Clients {
    retry: ResilientClient,
    retry_circuit_breaker: ResilientClient,
    bulkhead: ResilientClient,
    custom_handler: ResilientClient,
}

impl Clients {
    fn build(config: &Config, registry: &HttpPolicyRegistry) -> Result<Self> {
        let transport =
            ReqwestTransport::from_config(&config.http).context("failed to build HTTP transport")?;
        let base = |name: &str| {
            ResilientClient::builder(transport.clone())
                .name(name)
                .handler(CorrelationIdHandler::new())
                .handler(DefaultHeadersHandler::from_config(&config.http))
        };

        Ok(Self {
            retry: base("retry").policies_from(registry, &[RETRY_POLICY_KEY])?.build(),
            // Retry on the outside; the breaker sees every attempt
            retry_circuit_breaker: base("retry-circuit-breaker")
                .policies_from(registry, &[RETRY_POLICY_KEY, CIRCUIT_BREAKER_POLICY_KEY])?
                .build(),
            bulkhead: base("bulkhead").policies_from(registry, &[BULKHEAD_POLICY_KEY])?.build(),
            custom_handler: base("custom-handler").handler(ValidateHeaderHandler::api_key()).build(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "httpguard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::load().context("failed to load configuration")?;
    info!(
        base_url = %config.http.base_url,
        max_retries = config.retry.max_retries,
        retry_delay_ms = config.retry.delay_ms,
        failure_threshold = config.circuit_breaker.failure_threshold,
        open_duration_secs = config.circuit_breaker.open_duration_secs,
        max_parallel = config.bulkhead.max_parallel,
        max_queued = config.bulkhead.max_queued,
        "Configuration loaded"
    );

    let registry = build_registry(&config).context("failed to build policy registry")?;
    let clients = Clients::build(&config, &registry)?;

    if let Err(err) = run_scenarios(&clients).await {
        error!(error = %err, severity = %err.severity(), "demo stopped early");
    }

    Ok(())
}

async fn run_scenarios(clients: &Clients) -> Result<(), ClientError> {
    warn!("TESTING RETRY CLIENT: SERVER ERROR");
    report("retry", &clients.retry.get_text("/500").await?);
    warn!("TESTING RETRY CLIENT: TIMEOUT ERROR");
    report("retry", &clients.retry.get_text("/408").await?);

    // An open circuit ends this scenario only
    if let Err(err) = retry_circuit_breaker_scenario(&clients.retry_circuit_breaker).await {
        warn!("{err}");
    }

    bulkhead_scenario(&clients.bulkhead).await;

    warn!("TESTING CUSTOM HANDLER CLIENT: BAD REQUEST");
    let bad_request = clients.custom_handler.get_text("/200").await?;
    report("custom-handler", &bad_request);
    if bad_request.status.as_u16() == 400 {
        warn!("TESTING CUSTOM HANDLER CLIENT: SUCCESS");
    }

    Ok(())
}

async fn retry_circuit_breaker_scenario(client: &ResilientClient) -> Result<(), ClientError> {
    warn!(
        "TESTING RETRY CIRCUIT BREAKER CLIENT: SERVER ERROR - 3 retries - 5 globally allowed \
         before breaking"
    );
    report(client.name(), &client.get_text("/500").await?);
    warn!(
        "TESTING RETRY CIRCUIT BREAKER CLIENT: TIMEOUT ERROR - 3 retries - 5 globally allowed \
         before breaking"
    );
    report(client.name(), &client.get_text("/408").await?);
    Ok(())
}

async fn bulkhead_scenario(client: &ResilientClient) {
    warn!("TESTING BULKHEAD CLIENT: STARTING {BULKHEAD_TASKS} TASKS");
    let tasks: Vec<_> = (0..BULKHEAD_TASKS)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(3)).await;
                client.get_text("/200").await
            })
        })
        .collect();

    warn!("TESTING BULKHEAD CLIENT: AWAITING TASKS");
    let mut succeeded = 0;
    let mut rejected = 0;
    let mut failed = 0;
    for outcome in join_all(tasks).await {
        match outcome {
            Ok(Ok(_)) => succeeded += 1,
            Ok(Err(err)) if err.is_bulkhead_rejected() => rejected += 1,
            Ok(Err(err)) => {
                failed += 1;
                warn!(error = %err, "bulkhead call failed");
            }
            Err(join_error) => {
                failed += 1;
                error!(error = %join_error, "bulkhead task panicked");
            }
        }
    }
    info!(succeeded, rejected, failed, "bulkhead scenario finished");
}

fn report(client: &str, response: &ApiResponse<String>) {
    if response.is_success() {
        info!(client, status = %response.status, "call succeeded");
    } else {
        warn!(
            client,
            status = %response.status,
            body = response.error.as_deref().unwrap_or_default(),
            "call answered with failure status"
        );
    }
}
