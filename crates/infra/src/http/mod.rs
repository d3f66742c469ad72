//! Outbound HTTP
//!
//! Request flow for one logical call:
//!
//! ```text
//! ResilientClient -> handlers (on_request) -> policy pipeline -> Transport
//!                 <- handlers (on_response, reverse order) <-
//! ```
//!
//! Responses with a transient status (5xx, 408) are turned into
//! [`HttpFailure::Status`] inside the pipeline so the policies can see them.

pub mod client;
pub mod failure;
pub mod handlers;
pub mod request;
pub mod transport;

pub use client::{ClientError, ResilientClient, ResilientClientBuilder};
pub use failure::{is_transient_http_error, is_transient_status, HttpFailure};
pub use handlers::{
    CorrelationIdHandler, DefaultHeadersHandler, HandlerAction, RequestHandler,
    ValidateHeaderHandler,
};
pub use request::{ApiResponse, HttpRequest, HttpResponse};
pub use transport::{ReqwestTransport, ReqwestTransportBuilder, Transport};
