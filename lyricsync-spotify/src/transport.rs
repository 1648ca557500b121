//! Raw HTTP capability used by every Spotify client.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 5;
/// User agent for requests
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// `Retry-After` header in seconds, when present
    pub retry_after: Option<u64>,
    pub body: String,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Send a request, get a response or a network error.
///
/// Status codes are not interpreted here; see [`crate::api::SpotifyApi`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the request could not be sent or the body read.
    async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse>;

    /// POST a form-encoded body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be sent or the body read.
    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<HttpResponse>;
}

/// [`HttpTransport`] backed by a shared `reqwest` client.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a 10-second request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    async fn read(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        Self::read(request.send().await?).await
    }

    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<HttpResponse> {
        let response = self.client.post(url).form(params).send().await?;
        Self::read(response).await
    }
}
