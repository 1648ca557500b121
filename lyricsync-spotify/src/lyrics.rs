//! Lyrics from the web player's lyrics service.
//!
//! The lyrics service does not accept the Web API token. It needs a
//! short-lived web-player token, which is obtained with the `sp_dc` session
//! cookie of a logged-in browser session and cached until shortly before it
//! expires.

use crate::api::{Auth, Fetched, SpotifyApi};
use crate::error::{Result, SpotifyError};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use const_format::concatcp;
use lyricsync_core::lyrics::join_words;
use lyricsync_core::{CoreError, LyricLine, LyricsPayload, LyricsRequest, LyricsSource};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const OPEN_SPOTIFY: &str = "https://open.spotify.com";
const SPCLIENT: &str = "https://spclient.wg.spotify.com";

/// Web-player token endpoint (cookie auth)
pub const WEB_TOKEN_URL: &str =
    concatcp!(OPEN_SPOTIFY, "/get_access_token?reason=transport&productType=web_player");
/// Lyrics endpoint, followed by the track id
pub const LYRICS_URL: &str = concatcp!(SPCLIENT, "/lyrics/v1/track/");

/// Refresh the web-player token this long before it expires
const TOKEN_REFRESH_BUFFER_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebTokenResponse {
    access_token: String,
    #[serde(default)]
    access_token_expiration_timestamp_ms: i64,
    #[serde(default)]
    is_anonymous: bool,
}

#[derive(Debug, Clone)]
struct WebToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl WebToken {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(TOKEN_REFRESH_BUFFER_SECS) >= self.expires_at
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawLyrics {
    #[serde(default)]
    lines: Vec<RawLine>,
}

#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(default)]
    time: Option<u64>,
    #[serde(default)]
    words: Vec<RawWord>,
}

#[derive(Debug, Deserialize)]
struct RawWord {
    #[serde(default)]
    string: String,
}

impl RawLine {
    fn text(&self) -> String {
        join_words(self.words.iter().map(|w| w.string.as_str()))
    }
}

impl From<RawLyrics> for LyricsPayload {
    /// The first line decides the shape for the whole response.
    fn from(raw: RawLyrics) -> Self {
        let Some(first) = raw.lines.first() else {
            return Self::Empty;
        };

        if first.time.is_some() {
            Self::Timed(
                raw.lines
                    .iter()
                    .map(|line| LyricLine::new(line.time.unwrap_or(0), line.text()))
                    .collect(),
            )
        } else {
            Self::Untimed(raw.lines.iter().map(RawLine::text).collect())
        }
    }
}

/// Send a bare cookie value as `sp_dc`.
fn normalize_cookie(cookie: &str) -> String {
    let cookie = cookie.trim();
    if cookie.contains('=') {
        cookie.to_string()
    } else {
        format!("sp_dc={cookie}")
    }
}

/// Lyric fetcher implementing [`LyricsSource`].
pub struct SpotifyLyricsFetcher {
    api: Arc<SpotifyApi>,
    cached_token: RwLock<Option<WebToken>>,
}

impl SpotifyLyricsFetcher {
    #[must_use]
    pub fn new(api: Arc<SpotifyApi>) -> Self {
        Self {
            api,
            cached_token: RwLock::new(None),
        }
    }

    /// Get a web-player token, fetching a new one if the cached one expires soon.
    ///
    /// # Errors
    ///
    /// Returns [`SpotifyError::Auth`] if the cookie is rejected, or a transport
    /// error if the token endpoint fails.
    pub async fn web_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token.read().await.as_ref() {
            if !token.is_expired(Utc::now()) {
                debug!("Using cached web-player token");
                return Ok(token.access_token.clone());
            }
            debug!("Cached web-player token is expired or expiring soon");
        }

        let cookie = normalize_cookie(&self.api.tokens().cookie().await);
        let response = match self
            .api
            .get_json::<WebTokenResponse>(WEB_TOKEN_URL, Auth::Cookie(&cookie))
            .await?
        {
            Fetched::Body(response) => response,
            Fetched::Empty => {
                return Err(SpotifyError::Auth {
                    status: None,
                    message: "web-player token endpoint returned no token".into(),
                })
            }
        };

        if response.is_anonymous {
            warn!("Received anonymous token - sp_dc cookie is invalid or expired");
            return Err(SpotifyError::Auth {
                status: None,
                message: "sp_dc cookie is invalid or expired".into(),
            });
        }

        let expires_at = DateTime::from_timestamp_millis(response.access_token_expiration_timestamp_ms)
            .unwrap_or_else(Utc::now);
        let token = WebToken {
            access_token: response.access_token,
            expires_at,
        };
        let access_token = token.access_token.clone();
        *self.cached_token.write().await = Some(token);

        info!("Obtained web-player token, expires at {}", expires_at);
        Ok(access_token)
    }

    /// Invalidate the cached token, forcing a refresh on next request.
    pub async fn invalidate_token(&self) {
        *self.cached_token.write().await = None;
        debug!("Invalidated cached web-player token");
    }

    /// Fetch and classify the lyrics of `track_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token or the lyrics could not be retrieved.
    pub async fn fetch_payload(&self, track_id: &str) -> Result<LyricsPayload> {
        let token = self.web_token().await?;
        let url = format!("{LYRICS_URL}{track_id}");

        let result = self.api.get_json::<RawLyrics>(&url, Auth::Bearer(&token)).await;
        if matches!(result, Err(ref e) if e.status() == Some(401)) {
            warn!("Received 401 Unauthorized - invalidating cached web-player token");
            self.invalidate_token().await;
        }

        Ok(match result? {
            Fetched::Body(raw) => LyricsPayload::from(raw),
            // 403 is how the service says a track has no lyrics
            Fetched::Empty => LyricsPayload::Empty,
        })
    }
}

#[async_trait]
impl LyricsSource for SpotifyLyricsFetcher {
    fn name(&self) -> &'static str {
        "spotify_lyrics"
    }

    async fn fetch(&self, request: &LyricsRequest) -> std::result::Result<Vec<LyricLine>, CoreError> {
        let payload = self.fetch_payload(&request.track_id).await?;
        let timed = payload.is_timed();
        let lines = payload.into_lines(request.progress_ms, request.duration_ms);

        debug!(
            "Lyrics for {}: {} upcoming lines (timed={})",
            request.track_id,
            lines.len(),
            timed
        );
        Ok(lines)
    }
}
