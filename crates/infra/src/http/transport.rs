//! Transport abstraction and the `reqwest` implementation

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use httpguard_domain::HttpConfig;
use reqwest::Client as ReqwestClient;
use tracing::debug;

use super::failure::HttpFailure;
use super::request::{HttpRequest, HttpResponse};

/// Sends a single request attempt. Implementations do not retry.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HttpFailure>;
}

/// [`Transport`] backed by a shared `reqwest` client
#[derive(Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
    base_url: String,
}

impl ReqwestTransport {
    /// Start building a transport for `base_url`.
    pub fn builder(base_url: impl Into<String>) -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::new(base_url)
    }

    /// Transport for the configured base URL, timeout and user agent.
    ///
    /// # Errors
    /// Returns `HttpFailure::InvalidRequest` if the client cannot be built.
    pub fn from_config(config: &HttpConfig) -> Result<Self, HttpFailure> {
        Self::builder(config.base_url.clone())
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HttpFailure> {
        let url = self.url_for(&request.path);
        let method = request.method.clone();

        let mut builder = self.client.request(method.clone(), &url).headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        debug!(%method, %url, "sending HTTP request");
        let response = builder.send().await.map_err(|err| {
            debug!(%method, %url, error = %err, "HTTP request failed");
            HttpFailure::from(err)
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        debug!(%method, %url, %status, "received HTTP response");

        Ok(HttpResponse { status, headers, body })
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: Option<String>,
    system_proxy: bool,
}

impl ReqwestTransportBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            user_agent: None,
            system_proxy: true,
        }
    }

    /// Per-attempt timeout; a timed out attempt is a transient failure.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Ignore system proxy settings and connect directly.
    pub fn no_proxy(mut self) -> Self {
        self.system_proxy = false;
        self
    }

    /// # Errors
    /// Returns `HttpFailure::InvalidRequest` if the base URL is empty or the
    /// `reqwest` client cannot be built.
    pub fn build(self) -> Result<ReqwestTransport, HttpFailure> {
        if self.base_url.trim().is_empty() {
            return Err(HttpFailure::InvalidRequest("base URL must not be empty".to_string()));
        }

        let mut builder = ReqwestClient::builder().timeout(self.timeout);
        if !self.system_proxy {
            builder = builder.no_proxy();
        }
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        let client = builder.build().map_err(|err| {
            HttpFailure::InvalidRequest(format!("failed to build HTTP client: {err}"))
        })?;

        Ok(ReqwestTransport { client, base_url: self.base_url })
    }
}
