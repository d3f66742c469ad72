use std::fmt;
use std::sync::Arc;

use httpguard_common::resilience::{
    FailureKind, Policy, PolicyError, PolicyResult, RegistryError, SharedPolicy,
};
use httpguard_common::{ErrorClassification, ErrorSeverity, ExecutionContext};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use super::failure::{is_transient_http_error, is_transient_status, HttpFailure};
use super::handlers::{HandlerAction, RequestHandler};
use super::request::{ApiResponse, HttpRequest, HttpResponse};
use super::transport::Transport;
use crate::policies::{HttpPipeline, HttpPolicyRegistry};

/// Failure of a logical call made through [`ResilientClient`]
#[derive(Debug, Error)]
pub enum ClientError {
    /// The policy pipeline gave up; the kind is preserved
    #[error(transparent)]
    Policy(#[from] PolicyError<HttpFailure>),

    #[error("request handler '{handler}' failed: {source}")]
    Handler {
        handler: String,
        #[source]
        source: HttpFailure,
    },

    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ClientError {
    /// Failure kind reported by the pipeline, if the pipeline failed
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Policy(err) => Some(err.kind()),
            _ => None,
        }
    }

    /// Status of the last response when the call failed on a status
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Policy(err) => err.operation_error().and_then(HttpFailure::status),
            _ => None,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::Policy(err) if err.is_circuit_open())
    }

    pub fn is_bulkhead_rejected(&self) -> bool {
        matches!(self, Self::Policy(err) if err.is_bulkhead_rejected())
    }
}

impl ErrorClassification for ClientError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Policy(err) => err.is_retryable(),
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Policy(err) => err.severity(),
            Self::Handler { .. } | Self::Decode(_) => ErrorSeverity::Error,
            Self::Registry(_) => ErrorSeverity::Critical,
        }
    }
}

/// HTTP client that runs handlers and a resilience pipeline around a
/// [`Transport`].
///
/// Clones share the transport, handlers and pipeline, so breaker and
/// bulkhead state is common to every clone.
///
/// # Example
///
/// ```rust,ignore
/// let registry = build_registry(&config)?;
/// let client = ResilientClient::builder(ReqwestTransport::from_config(&config.http)?)
///     .name("retry-circuit-breaker")
///     .policies_from(&registry, &["Retry", "CircuitBreaker"])?
///     .build();
///
/// let response = client.get_text("/500").await?;
/// assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
/// ```
#[derive(Clone)]
pub struct ResilientClient {
    name: String,
    transport: Arc<dyn Transport>,
    handlers: Arc<[Arc<dyn RequestHandler>]>,
    pipeline: Arc<HttpPipeline>,
}

impl ResilientClient {
    pub fn builder<T>(transport: T) -> ResilientClientBuilder
    where
        T: Transport + 'static,
    {
        ResilientClientBuilder::new(Arc::new(transport))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipeline(&self) -> &HttpPipeline {
        &self.pipeline
    }

    /// Send `request` with a fresh execution context
    ///
    /// Every status outside 5xx/408 is returned as a response. A transient
    /// status that is still failing once the pipeline gives up is reported as
    /// `ClientError::Policy`; use [`ResilientClient::get_text`] for the
    /// non-failing view.
    ///
    /// # Errors
    /// Returns `ClientError` when a handler or the pipeline fails.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let ctx = self.context_for(&request);
        self.send_with(&ctx, request).await
    }

    /// Send `request` under the caller's context
    ///
    /// # Errors
    /// Returns `ClientError` when a handler or the pipeline fails.
    #[instrument(
        skip(self, ctx, request),
        fields(client = %self.name, method = %request.method, path = %request.path)
    )]
    pub async fn send_with(
        &self,
        ctx: &ExecutionContext,
        mut request: HttpRequest,
    ) -> Result<HttpResponse, ClientError> {
        for (index, handler) in self.handlers.iter().enumerate() {
            let action = handler.on_request(ctx, &mut request).await.map_err(|source| {
                ClientError::Handler { handler: handler.name().to_string(), source }
            })?;

            if let HandlerAction::Respond(mut response) = action {
                debug!(handler = handler.name(), status = %response.status, "handler answered request");
                unwind(ctx, &self.handlers[..index], &mut response).await;
                return Ok(response);
            }
        }

        let transport = Arc::clone(&self.transport);
        let request = Arc::new(request);
        let attempt = move |_ctx: ExecutionContext| {
            let transport = Arc::clone(&transport);
            let request = Arc::clone(&request);
            async move { send_attempt(transport.as_ref(), &request).await }
        };

        let mut response = self.pipeline.execute(ctx, &attempt).await?;
        unwind(ctx, &self.handlers, &mut response).await;
        Ok(response)
    }

    /// GET `path` and read the body as text
    ///
    /// Any status the server answered with comes back as an [`ApiResponse`],
    /// including a 500 that outlasted every retry.
    ///
    /// # Errors
    /// Returns `ClientError` for transport failures, an open circuit, a full
    /// bulkhead, cancellation or handler errors.
    pub async fn get_text(&self, path: &str) -> Result<ApiResponse<String>, ClientError> {
        let response = answered(self.send(HttpRequest::get(path)).await)?;
        Ok(ApiResponse::from_text(response))
    }

    /// GET `path` and decode a successful body as JSON
    ///
    /// # Errors
    /// As [`ResilientClient::get_text`], plus `ClientError::Decode` when a
    /// success body does not match `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<ApiResponse<T>, ClientError> {
        let response = answered(self.send(HttpRequest::get(path)).await)?;
        ApiResponse::from_json(response).map_err(ClientError::Decode)
    }

    fn context_for(&self, request: &HttpRequest) -> ExecutionContext {
        ExecutionContext::new(format!("{}:{} {}", self.name, request.method, request.path))
    }
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers: Vec<&str> = self.handlers.iter().map(|handler| handler.name()).collect();
        f.debug_struct("ResilientClient")
            .field("name", &self.name)
            .field("transport", &self.transport)
            .field("handlers", &handlers)
            .field("pipeline", &self.pipeline.name())
            .finish()
    }
}

/// One transport attempt, with transient statuses surfaced as failures
async fn send_attempt(
    transport: &dyn Transport,
    request: &HttpRequest,
) -> PolicyResult<HttpResponse, HttpFailure> {
    let response = transport
        .send(request)
        .await
        .map_err(|failure| PolicyError::classify(failure, is_transient_http_error))?;

    if is_transient_status(response.status) {
        return Err(PolicyError::transient(HttpFailure::Status { response }));
    }
    Ok(response)
}

async fn unwind(
    ctx: &ExecutionContext,
    handlers: &[Arc<dyn RequestHandler>],
    response: &mut HttpResponse,
) {
    for handler in handlers.iter().rev() {
        handler.on_response(ctx, response).await;
    }
}

/// Turn a failure that still carries a server response back into that
/// response.
fn answered(result: Result<HttpResponse, ClientError>) -> Result<HttpResponse, ClientError> {
    match result {
        Err(ClientError::Policy(
            PolicyError::Transient { source: HttpFailure::Status { response } }
            | PolicyError::Permanent { source: HttpFailure::Status { response } },
        )) => Ok(response),
        other => other,
    }
}

/// Builder for [`ResilientClient`].
pub struct ResilientClientBuilder {
    name: String,
    transport: Arc<dyn Transport>,
    handlers: Vec<Arc<dyn RequestHandler>>,
    policies: Vec<SharedPolicy<HttpResponse, HttpFailure>>,
}

impl ResilientClientBuilder {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            name: "http".to_string(),
            transport,
            handlers: Vec::new(),
            policies: Vec::new(),
        }
    }

    /// Name used in the operation key of every call and in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a handler after the ones already added.
    pub fn handler<H>(mut self, handler: H) -> Self
    where
        H: RequestHandler + 'static,
    {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn shared_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Append a policy inside the ones already added.
    pub fn policy<P>(mut self, policy: P) -> Self
    where
        P: Policy<HttpResponse, HttpFailure> + 'static,
    {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Append the policies registered under `keys`, outermost first.
    ///
    /// # Errors
    /// Returns `ClientError::Registry` naming the first unknown key.
    pub fn policies_from(
        mut self,
        registry: &HttpPolicyRegistry,
        keys: &[&str],
    ) -> Result<Self, ClientError> {
        for key in keys {
            self.policies.push(registry.resolve(key)?);
        }
        Ok(self)
    }

    pub fn build(self) -> ResilientClient {
        ResilientClient {
            name: self.name,
            transport: self.transport,
            handlers: self.handlers.into(),
            pipeline: Arc::new(HttpPipeline::new(self.policies)),
        }
    }
}

impl fmt::Debug for ResilientClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClientBuilder")
            .field("name", &self.name)
            .field("handlers", &self.handlers.len())
            .field("policies", &self.policies.len())
            .finish()
    }
}
