//! Authenticated requests and status mapping shared by the player and
//! lyrics clients.

use crate::error::{Result, SpotifyError};
use crate::token::TokenManager;
use crate::transport::{HttpResponse, HttpTransport};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// How a request is authenticated.
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    /// Main Web API token, refreshed first when stale
    Api,
    /// A caller-supplied bearer token
    Bearer(&'a str),
    /// A session cookie
    Cookie(&'a str),
}

/// Outcome of a successful GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    Body(T),
    /// 204, an empty body, or 403 (resource has nothing for us)
    Empty,
}

/// Transport adapter: authenticated GETs with typed outcomes.
pub struct SpotifyApi {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<TokenManager>,
}

impl SpotifyApi {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: Arc<TokenManager>) -> Self {
        Self { transport, tokens }
    }

    #[must_use]
    pub const fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// GET `url` and decode the JSON body.
    ///
    /// With [`Auth::Api`], a 401 marks the token stale and the request is
    /// sent once more with a refreshed token.
    ///
    /// # Errors
    ///
    /// - [`SpotifyError::Auth`] if the API token could not be refreshed
    /// - [`SpotifyError::RateLimited`] on HTTP 429
    /// - [`SpotifyError::Transport`] on any other non-2xx status
    /// - [`SpotifyError::Http`] on network failure
    /// - [`SpotifyError::Json`] if a 2xx body does not decode
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, auth: Auth<'_>) -> Result<Fetched<T>> {
        let response = match auth {
            Auth::Api => self.get_with_api_token(url).await?,
            Auth::Bearer(token) => {
                let headers = [
                    ("Authorization", format!("Bearer {token}")),
                    // The web-player token is only honoured with this header
                    ("App-Platform", "WebPlayer".to_string()),
                ];
                self.transport.get(url, &headers).await?
            }
            Auth::Cookie(cookie) => self.transport.get(url, &[("Cookie", cookie.to_string())]).await?,
        };

        match response.status {
            204 => Ok(Fetched::Empty),
            200..=299 if response.body.trim().is_empty() => Ok(Fetched::Empty),
            200..=299 => Ok(Fetched::Body(serde_json::from_str(&response.body)?)),
            403 => {
                debug!("GET {} returned 403, treating as empty", url);
                Ok(Fetched::Empty)
            }
            429 => Err(SpotifyError::RateLimited {
                retry_after_secs: response.retry_after.unwrap_or(0),
            }),
            status => Err(SpotifyError::Transport {
                status: Some(status),
                message: truncate(&response.body, 200),
            }),
        }
    }

    async fn get_with_api_token(&self, url: &str) -> Result<HttpResponse> {
        let token = self.tokens.ensure_fresh().await?;
        let response = self
            .transport
            .get(url, &[("Authorization", format!("Bearer {token}"))])
            .await?;
        if response.status != 401 {
            return Ok(response);
        }

        debug!("GET {} returned 401, retrying with a refreshed token", url);
        self.tokens.invalidate(&token).await;
        let token = self.tokens.ensure_fresh().await?;
        self.transport
            .get(url, &[("Authorization", format!("Bearer {token}"))])
            .await
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
