//! Access token lifecycle for the Web API.

use crate::error::{Result, SpotifyError};
use crate::transport::HttpTransport;
use lyricsync_core::SpotifyConfig;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Accounts service endpoint for the refresh-token grant
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Tokens are treated as stale after an hour
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);

/// Everything needed to authenticate against Spotify.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// Web session cookie for the web-player token
    pub cookie: String,
    pub access_token: Option<String>,
    pub last_refreshed_at: Option<Instant>,
}

impl Credentials {
    /// Build credentials from config. A configured access token is used
    /// until the API rejects it, then replaced by a refresh.
    #[must_use]
    pub fn from_config(config: &SpotifyConfig) -> Self {
        let access_token = config
            .access_token
            .clone()
            .filter(|t| !t.trim().is_empty());
        let last_refreshed_at = access_token.as_ref().map(|_| Instant::now());

        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
            cookie: config.cookie.clone(),
            access_token,
            last_refreshed_at,
        }
    }
}

// Secrets stay out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("has_access_token", &self.access_token.is_some())
            .field("last_refreshed_at", &self.last_refreshed_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Status and message of a rejected refresh.
type RefreshFailure = (Option<u16>, String);

/// Owns the access/refresh token pair and refreshes it before use once stale.
///
/// Refreshes are serialized: concurrent callers that find the token stale
/// wait on the same refresh and share its outcome, success or failure,
/// instead of issuing their own.
pub struct TokenManager {
    transport: Arc<dyn HttpTransport>,
    credentials: RwLock<Credentials>,
    /// Held for the duration of a refresh; guards the last failure
    refresh_lock: Mutex<Option<RefreshFailure>>,
    /// Completed refresh attempts
    attempts: AtomicU64,
    max_age: Duration,
}

impl TokenManager {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, credentials: Credentials, max_age: Duration) -> Self {
        Self {
            transport,
            credentials: RwLock::new(credentials),
            refresh_lock: Mutex::new(None),
            attempts: AtomicU64::new(0),
            max_age,
        }
    }

    /// Session cookie used for the web-player token.
    pub async fn cookie(&self) -> String {
        self.credentials.read().await.cookie.clone()
    }

    /// Mark `rejected` as stale so the next [`ensure_fresh`](Self::ensure_fresh)
    /// refreshes. A no-op if the token has already been replaced.
    pub async fn invalidate(&self, rejected: &str) {
        let mut credentials = self.credentials.write().await;
        if credentials.access_token.as_deref() == Some(rejected) {
            debug!("Access token rejected, marking stale");
            credentials.last_refreshed_at = None;
        }
    }

    /// Return an access token that is not stale, refreshing first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SpotifyError::Auth`] if a needed refresh fails.
    pub async fn ensure_fresh(&self) -> Result<String> {
        let seen = self.attempts.load(Ordering::Acquire);
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let mut last_failure = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(token) = self.fresh_token().await {
            debug!("Token refreshed by a concurrent caller");
            return Ok(token);
        }
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some((status, message)) = last_failure.as_ref() {
                debug!("Concurrent token refresh failed, not retrying");
                return Err(auth_error(*status, message.clone()));
            }
        }

        self.refresh_locked(&mut last_failure).await
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns [`SpotifyError::Auth`] if the exchange is rejected or fails.
    pub async fn refresh(&self) -> Result<()> {
        let mut last_failure = self.refresh_lock.lock().await;
        self.refresh_locked(&mut last_failure).await.map(|_| ())
    }

    async fn fresh_token(&self) -> Option<String> {
        let credentials = self.credentials.read().await;
        let fresh = credentials
            .last_refreshed_at
            .is_some_and(|at| at.elapsed() < self.max_age);
        if fresh {
            credentials.access_token.clone()
        } else {
            None
        }
    }

    async fn refresh_locked(&self, last_failure: &mut Option<RefreshFailure>) -> Result<String> {
        let result = self.request_token().await;
        *last_failure = match &result {
            Err(SpotifyError::Auth { status, message }) => Some((*status, message.clone())),
            _ => None,
        };
        self.attempts.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn request_token(&self) -> Result<String> {
        info!("Refreshing Spotify access token");

        let (client_id, client_secret, refresh_token) = {
            let c = self.credentials.read().await;
            (c.client_id.clone(), c.client_secret.clone(), c.refresh_token.clone())
        };
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ];

        let response = self
            .transport
            .post_form(TOKEN_URL, &params)
            .await
            .map_err(|e| auth_error(e.status(), e.to_string()))?;

        if !response.is_success() {
            warn!("Token refresh failed: HTTP {} - {}", response.status, response.body);
            return Err(auth_error(Some(response.status), response.body));
        }

        let parsed: RefreshResponse = serde_json::from_str(&response.body)
            .map_err(|e| auth_error(Some(response.status), format!("invalid token response: {e}")))?;

        let mut credentials = self.credentials.write().await;
        credentials.access_token = Some(parsed.access_token.clone());
        credentials.last_refreshed_at = Some(Instant::now());
        if let Some(rotated) = parsed.refresh_token.filter(|t| !t.is_empty()) {
            debug!("Refresh token rotated");
            credentials.refresh_token = rotated;
        }

        info!("Spotify access token refreshed");
        Ok(parsed.access_token)
    }
}

fn auth_error(status: Option<u16>, message: impl Into<String>) -> SpotifyError {
    SpotifyError::Auth {
        status,
        message: message.into(),
    }
}
