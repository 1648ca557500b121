//! Traits for the collaborators the scheduler drives.

use crate::error::CoreError;
use crate::lyrics::LyricLine;
use crate::playback::PlaybackSnapshot;
use async_trait::async_trait;

/// Parameters for fetching lyrics of one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsRequest {
    /// Service track id
    pub track_id: String,
    /// Playback progress when the request was made, in milliseconds
    pub progress_ms: u64,
    /// Track duration in milliseconds (used to place untimed lines)
    pub duration_ms: u64,
}

impl LyricsRequest {
    /// Create a new lyrics request
    pub fn new(track_id: impl Into<String>, progress_ms: u64, duration_ms: u64) -> Self {
        Self {
            track_id: track_id.into(),
            progress_ms,
            duration_ms,
        }
    }
}

/// Supplies playback snapshots of the remote player.
///
/// Implementations own their retry policy: an error returned from
/// [`PlaybackSource::poll`] means retries for this cycle are exhausted.
#[async_trait]
pub trait PlaybackSource: Send + Sync {
    /// Returns a human-readable name for this source.
    fn name(&self) -> &'static str;

    /// Fetch the current playback snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error once the source gave up on this poll.
    async fn poll(&self) -> Result<PlaybackSnapshot, CoreError>;
}

/// Fetches and normalizes lyrics for a track.
#[async_trait]
pub trait LyricsSource: Send + Sync {
    /// Returns a human-readable name for this source.
    fn name(&self) -> &'static str;

    /// Fetch the lines still to be emitted for `request`, ascending by offset.
    ///
    /// An empty vector means the track has no lyrics and is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the lyrics could not be retrieved.
    async fn fetch(&self, request: &LyricsRequest) -> Result<Vec<LyricLine>, CoreError>;
}
