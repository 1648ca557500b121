//! Spotify playback state polling.

use crate::api::{Auth, Fetched, SpotifyApi};
use crate::error::{Result, SpotifyError};
use async_trait::async_trait;
use lyricsync_core::{CoreError, DurationExt, LinearBackoff, PlaybackSnapshot, PlaybackSource, TrackInfo};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Player endpoint for the current user's playback
pub const PLAYER_URL: &str = "https://api.spotify.com/v1/me/player";

#[derive(Debug, Deserialize)]
struct PlayerResponse {
    #[serde(default)]
    is_playing: bool,
    #[serde(default)]
    progress_ms: Option<u64>,
    #[serde(default)]
    item: Option<PlayerItem>,
}

#[derive(Debug, Deserialize)]
struct PlayerItem {
    /// Absent for local files
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    duration_ms: u64,
}

impl From<PlayerResponse> for PlaybackSnapshot {
    fn from(response: PlayerResponse) -> Self {
        let track = response.item.and_then(|item| {
            let id = item.id.filter(|id| !id.is_empty())?;
            Some(TrackInfo::new(id, item.name, item.duration_ms))
        });
        Self::new(response.is_playing, response.progress_ms.unwrap_or(0), track)
    }
}

/// Spotify playback poller implementing [`PlaybackSource`].
///
/// Each [`PlaybackSource::poll`] retries failed requests with a linear
/// backoff before giving up for the cycle. A rate-limited attempt waits at
/// least as long as the server's `Retry-After`.
pub struct SpotifyPoller {
    api: Arc<SpotifyApi>,
    max_attempts: u32,
    backoff_step: Duration,
}

impl SpotifyPoller {
    /// Create a new Spotify poller
    ///
    /// # Arguments
    /// * `api` - Authenticated Spotify client
    /// * `max_attempts` - Attempts per poll before giving up
    /// * `backoff_step` - Delay added per failed attempt
    #[must_use]
    pub const fn new(api: Arc<SpotifyApi>, max_attempts: u32, backoff_step: Duration) -> Self {
        Self {
            api,
            max_attempts,
            backoff_step,
        }
    }

    async fn poll_once(&self) -> Result<PlaybackSnapshot> {
        let snapshot = match self.api.get_json::<PlayerResponse>(PLAYER_URL, Auth::Api).await? {
            Fetched::Body(response) => PlaybackSnapshot::from(response),
            // No active device
            Fetched::Empty => PlaybackSnapshot::stopped(),
        };

        debug!(
            "Polled Spotify: playing={}, track={:?}, progress={}ms",
            snapshot.is_playing,
            snapshot.track.as_ref().map(|t| &t.name),
            snapshot.progress_ms
        );

        Ok(snapshot)
    }
}

#[async_trait]
impl PlaybackSource for SpotifyPoller {
    fn name(&self) -> &'static str {
        "spotify"
    }

    async fn poll(&self) -> std::result::Result<PlaybackSnapshot, CoreError> {
        let mut backoff = LinearBackoff::new(self.max_attempts, self.backoff_step);

        loop {
            match self.poll_once().await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => {
                    let Some(mut delay) = backoff.next_delay() else {
                        error!("Poll failed after {} attempts: {}", backoff.failures(), e);
                        return Err(e.into());
                    };
                    if let SpotifyError::RateLimited { retry_after_secs } = &e {
                        delay = delay.max(Duration::from_secs(*retry_after_secs));
                    }
                    warn!(
                        "Poll error (attempt {}), retrying in {}ms: {}",
                        backoff.failures(),
                        delay.as_millis_u64(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
