//! # httpguard Infrastructure
//!
//! The impure side of httpguard: outbound HTTP, configuration loading and the
//! wiring of resilience policies from configuration.
//!
//! This crate contains:
//! - The `reqwest` transport and the request/response value types
//! - The request handler chain (header validation, default headers,
//!   correlation ids)
//! - [`ResilientClient`], which runs handlers and a policy pipeline around the
//!   transport
//! - The configuration loader (files and `HTTPGUARD_*` environment variables)
//! - The reference policy registry built from [`httpguard_domain::Config`]
//!
//! ## Architecture
//! - Policies and their composition live in `httpguard-common`
//! - Configuration types live in `httpguard-domain`
//! - Everything that performs I/O lives here

pub mod config;
pub mod http;
pub mod policies;

// Re-export commonly used items
pub use http::{
    is_transient_http_error, is_transient_status, ApiResponse, ClientError,
    CorrelationIdHandler, DefaultHeadersHandler, HandlerAction, HttpFailure, HttpRequest,
    HttpResponse, RequestHandler, ReqwestTransport, ReqwestTransportBuilder, ResilientClient,
    ResilientClientBuilder, Transport, ValidateHeaderHandler,
};
pub use policies::{
    build_registry, bulkhead_policy, circuit_breaker_policy, retry_policy, HttpPipeline,
    HttpPolicyRegistry,
};
