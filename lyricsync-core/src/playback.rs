
/// Snapshot of the remote player taken by a single poll.
///
/// Snapshots are immutable values; the scheduler only keeps the track id
/// around for comparison with the next poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    /// Whether music is currently playing
    pub is_playing: bool,
    /// Playback progress into the current track, in milliseconds
    pub progress_ms: u64,
    /// Current track information (None if nothing is loaded)
    pub track: Option<TrackInfo>,
}

impl PlaybackSnapshot {
    /// Create a new playback snapshot
    #[must_use]
    pub const fn new(is_playing: bool, progress_ms: u64, track: Option<TrackInfo>) -> Self {
        Self {
            is_playing,
            progress_ms,
            track,
        }
    }

    /// Snapshot for a player with nothing playing
    #[must_use]
    pub const fn stopped() -> Self {
        Self::new(false, 0, None)
    }

    /// Id of the current track, if any
    #[must_use]
    pub fn track_id(&self) -> Option<&str> {
        self.track.as_ref().map(|t| t.id.as_str())
    }

    /// Check if this snapshot shows a different track than `current_track_id`
    #[must_use]
    pub fn track_changed(&self, current_track_id: Option<&str>) -> bool {
        self.track_id() != current_track_id
    }
}

/// Information about the currently playing track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Service track id
    pub id: String,
    /// Track name
    pub name: String,
    /// Track duration in milliseconds
    pub duration_ms: u64,
}

impl TrackInfo {
    /// Create a new track info
    pub fn new(id: impl Into<String>, name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            duration_ms,
        }
    }
}
