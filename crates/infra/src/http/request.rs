//! Request and response value types

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use super::failure::HttpFailure;

/// An outbound request, relative to the transport's base URL
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: HeaderMap::new(), body: None }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        let mut request = Self::new(Method::POST, path);
        request.body = Some(body.into());
        request
    }

    /// Builder-style variant of [`HttpRequest::set_header`]
    ///
    /// # Errors
    /// Returns `HttpFailure::InvalidRequest` if the name or value is not a
    /// valid header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, HttpFailure> {
        self.set_header(name, value)?;
        Ok(self)
    }

    /// Insert or replace a header
    ///
    /// # Errors
    /// Returns `HttpFailure::InvalidRequest` if the name or value is not a
    /// valid header.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), HttpFailure> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpFailure::InvalidRequest(format!("invalid header name '{name}': {e}")))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            HttpFailure::InvalidRequest(format!("invalid value for header '{name}': {e}"))
        })?;
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }
}

/// A response with its body read as text
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self { status, headers: HeaderMap::new(), body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Decode the body as JSON
    ///
    /// # Errors
    /// Returns the `serde_json` error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Typed result of a call that completed with a status code
///
/// Non-success statuses do not produce an error: `content` is `None` and
/// `error` carries the response body, so callers inspect the status the same
/// way for every outcome that reached the server.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    fn failed(response: HttpResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            content: None,
            error: Some(response.body),
        }
    }
}

impl ApiResponse<String> {
    pub fn from_text(response: HttpResponse) -> Self {
        if !response.is_success() {
            return Self::failed(response);
        }
        Self {
            status: response.status,
            headers: response.headers,
            content: Some(response.body),
            error: None,
        }
    }
}

impl<T: DeserializeOwned> ApiResponse<T> {
    /// Decode a successful body as JSON
    ///
    /// # Errors
    /// Returns the `serde_json` error when a success body does not decode.
    /// Non-success responses are never decoded.
    pub fn from_json(response: HttpResponse) -> Result<Self, serde_json::Error> {
        if !response.is_success() {
            return Ok(Self::failed(response));
        }
        let content = response.json::<T>()?;
        Ok(Self { status: response.status, headers: response.headers, content: Some(content), error: None })
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Status {
        code: u16,
        description: String,
    }

    #[test]
    fn test_request_headers() {
        let request = HttpRequest::get("/200")
            .with_header("X-API-KEY", "secret")
            .expect("valid header");

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.header("x-api-key"), Some("secret"));
        assert!(request.has_header("X-Api-Key"));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let err = HttpRequest::get("/").with_header("bad header", "x").unwrap_err();
        assert!(matches!(err, HttpFailure::InvalidRequest(_)));

        let err = HttpRequest::get("/").with_header("X-Ok", "line\nbreak").unwrap_err();
        assert!(err.to_string().contains("X-Ok"));
    }

    #[test]
    fn test_text_api_response() {
        let ok = ApiResponse::from_text(HttpResponse::new(StatusCode::OK, "200 OK"));
        assert!(ok.is_success());
        assert_eq!(ok.content.as_deref(), Some("200 OK"));
        assert!(ok.error.is_none());

        let failed = ApiResponse::from_text(HttpResponse::new(StatusCode::NOT_FOUND, "missing"));
        assert!(!failed.is_success());
        assert!(failed.content.is_none());
        assert_eq!(failed.error.as_deref(), Some("missing"));
    }

    #[test]
    fn test_json_api_response() {
        let body = r#"{"code":200,"description":"OK"}"#;
        let ok = ApiResponse::<Status>::from_json(HttpResponse::new(StatusCode::OK, body))
            .expect("valid json");
        assert_eq!(ok.content, Some(Status { code: 200, description: "OK".to_string() }));

        // Error bodies are kept as text and never decoded
        let failed =
            ApiResponse::<Status>::from_json(HttpResponse::new(StatusCode::BAD_REQUEST, "nope"))
                .expect("non-success is not decoded");
        assert_eq!(failed.status, StatusCode::BAD_REQUEST);
        assert_eq!(failed.error.as_deref(), Some("nope"));

        assert!(ApiResponse::<Status>::from_json(HttpResponse::new(StatusCode::OK, "{")).is_err());
    }
}
