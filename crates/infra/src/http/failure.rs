//! HTTP failures and transient classification

use httpguard_common::{ErrorClassification, ErrorSeverity};
use reqwest::StatusCode;
use thiserror::Error;

use super::request::HttpResponse;

/// Failure of a single HTTP attempt
#[derive(Debug, Error)]
pub enum HttpFailure {
    /// The server answered with a status the pipeline treats as a failure.
    /// The full response is kept so callers can still read it.
    #[error("server responded with {}", .response.status)]
    Status { response: HttpResponse },

    /// The request never produced a response (connect error, timeout, ...)
    #[error("transport error: {message}")]
    Transport { message: String, timeout: bool },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl HttpFailure {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { response } => Some(response.status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Status { response } => response.status == StatusCode::REQUEST_TIMEOUT,
            Self::Transport { timeout, .. } => *timeout,
            Self::InvalidRequest(_) => false,
        }
    }
}

impl From<reqwest::Error> for HttpFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return Self::InvalidRequest(err.to_string());
        }
        Self::Transport { message: err.to_string(), timeout: err.is_timeout() }
    }
}

impl ErrorClassification for HttpFailure {
    fn is_retryable(&self) -> bool {
        is_transient_http_error(self)
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Status { .. } | Self::Transport { .. } => ErrorSeverity::Warning,
            Self::InvalidRequest(_) => ErrorSeverity::Error,
        }
    }
}

/// 5xx and 408 Request Timeout
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT
}

/// Transient when the server returned a transient status or the request
/// failed in transport. Malformed requests never are.
pub fn is_transient_http_error(failure: &HttpFailure) -> bool {
    match failure {
        HttpFailure::Status { response } => is_transient_status(response.status),
        HttpFailure::Transport { .. } => true,
        HttpFailure::InvalidRequest(_) => false,
    }
}
