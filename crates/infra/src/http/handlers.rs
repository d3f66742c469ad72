//! Request handler chain
//!
//! Handlers run once per logical call, outside the policy pipeline. Each one
//! sees the request in registration order and may rewrite it or answer it
//! directly; responses travel back through the handlers that ran, in reverse
//! order.

use std::fmt;

use async_trait::async_trait;
use httpguard_common::ExecutionContext;
use httpguard_domain::constants::{API_KEY_HEADER, CORRELATION_ID_HEADER};
use httpguard_domain::HttpConfig;
use reqwest::StatusCode;
use tracing::{debug, warn};

use super::failure::HttpFailure;
use super::request::{HttpRequest, HttpResponse};

/// What the chain does after a handler has seen the request
#[derive(Debug)]
pub enum HandlerAction {
    Continue,
    /// Stop here; neither later handlers nor the transport see the request.
    Respond(HttpResponse),
}

#[async_trait]
pub trait RequestHandler: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn on_request(
        &self,
        ctx: &ExecutionContext,
        request: &mut HttpRequest,
    ) -> Result<HandlerAction, HttpFailure>;

    async fn on_response(&self, _ctx: &ExecutionContext, _response: &mut HttpResponse) {}
}

//=============================================================================
// Header validation
//=============================================================================

/// Answers `400 Bad Request` locally when a required header is missing.
#[derive(Debug, Clone)]
pub struct ValidateHeaderHandler {
    header: String,
}

impl ValidateHeaderHandler {
    pub fn new(header: impl Into<String>) -> Self {
        Self { header: header.into() }
    }

    /// Requires the `X-API-KEY` header.
    pub fn api_key() -> Self {
        Self::new(API_KEY_HEADER)
    }

    pub fn header(&self) -> &str {
        &self.header
    }
}

#[async_trait]
impl RequestHandler for ValidateHeaderHandler {
    fn name(&self) -> &str {
        "ValidateHeader"
    }

    async fn on_request(
        &self,
        ctx: &ExecutionContext,
        request: &mut HttpRequest,
    ) -> Result<HandlerAction, HttpFailure> {
        if request.has_header(&self.header) {
            return Ok(HandlerAction::Continue);
        }

        warn!(
            operation = %ctx.operation_key(),
            header = %self.header,
            path = %request.path,
            "required header missing, answering locally"
        );
        Ok(HandlerAction::Respond(HttpResponse::new(
            StatusCode::BAD_REQUEST,
            format!("You must supply an API key header called {}", self.header),
        )))
    }
}

//=============================================================================
// Default headers
//=============================================================================

/// Adds headers the request does not already carry.
#[derive(Clone, Default)]
pub struct DefaultHeadersHandler {
    headers: Vec<(String, String)>,
}

impl DefaultHeadersHandler {
    pub fn new<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { headers: headers.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    /// Configured default headers, plus `X-API-KEY` when an API key is set.
    pub fn from_config(config: &HttpConfig) -> Self {
        let mut handler = Self::new(config.default_headers.clone());
        if let Some(key) = &config.api_key {
            handler.headers.push((API_KEY_HEADER.to_string(), key.clone()));
        }
        handler
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl fmt::Debug for DefaultHeadersHandler {
    // Values may hold credentials
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("DefaultHeadersHandler").field("headers", &names).finish()
    }
}

#[async_trait]
impl RequestHandler for DefaultHeadersHandler {
    fn name(&self) -> &str {
        "DefaultHeaders"
    }

    async fn on_request(
        &self,
        _ctx: &ExecutionContext,
        request: &mut HttpRequest,
    ) -> Result<HandlerAction, HttpFailure> {
        for (name, value) in &self.headers {
            if !request.has_header(name) {
                request.set_header(name, value)?;
            }
        }
        Ok(HandlerAction::Continue)
    }
}

//=============================================================================
// Correlation ids
//=============================================================================

/// Stamps the context's correlation id on every request.
#[derive(Debug, Clone)]
pub struct CorrelationIdHandler {
    header: String,
}

impl Default for CorrelationIdHandler {
    fn default() -> Self {
        Self { header: CORRELATION_ID_HEADER.to_string() }
    }
}

impl CorrelationIdHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(header: impl Into<String>) -> Self {
        Self { header: header.into() }
    }
}

#[async_trait]
impl RequestHandler for CorrelationIdHandler {
    fn name(&self) -> &str {
        "CorrelationId"
    }

    async fn on_request(
        &self,
        ctx: &ExecutionContext,
        request: &mut HttpRequest,
    ) -> Result<HandlerAction, HttpFailure> {
        request.set_header(&self.header, &ctx.correlation_id().to_string())?;
        Ok(HandlerAction::Continue)
    }

    async fn on_response(&self, ctx: &ExecutionContext, response: &mut HttpResponse) {
        debug!(
            correlation_id = %ctx.correlation_id(),
            status = %response.status,
            "response received"
        );
    }
}
