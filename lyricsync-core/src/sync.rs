//! Session state and the per-cycle transition function.
//!
//! [`SyncState::on_snapshot`] and [`SyncState::on_lyrics`] are pure with
//! respect to time and I/O: they take the data a cycle produced and return
//! what the runtime should do next. Timers, polling and fetching live in
//! [`crate::scheduler`].

use crate::lyrics::LyricLine;
use crate::playback::{PlaybackSnapshot, TrackInfo};
use crate::source::LyricsRequest;
use crate::time::delay_until;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Notification delivered when a lyric line becomes current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricUpdate {
    /// The line that just became current
    pub line: LyricLine,
    /// Lines still pending for this track, ascending by offset
    pub remaining: Vec<LyricLine>,
}

/// Events broadcast by the scheduler
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A different track started playing
    TrackChanged { track: TrackInfo, progress_ms: u64 },
    /// Lyrics were loaded for the current track
    LyricsLoaded { track_id: String, line_count: usize },
    /// No lyrics found for the current track
    LyricsNotFound { track_id: String },
    /// A lyric line became current
    LyricUpdate(LyricUpdate),
    /// A cycle failed; the session keeps running
    Error { message: String },
}

/// Coarse phase of the session, derived from [`SyncState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No track observed yet
    Idle,
    /// Lyrics for the current track are not resolved yet
    TrackLoading,
    /// Lines are pending emission
    Emitting,
    /// Nothing to emit for the current track
    WaitingForPlayback,
}

/// What the runtime should do after a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Schedule the next cycle after the delay
    Wait(Duration),
    /// A new track started: fetch its lyrics
    TrackChanged {
        track: TrackInfo,
        request: LyricsRequest,
    },
    /// Same track, lyrics still unresolved: fetch again
    RetryLyrics(LyricsRequest),
    /// Deliver the update, then schedule the next cycle after `next_delay`
    Emit {
        update: LyricUpdate,
        next_delay: Duration,
    },
}

/// The mutable core of a session.
///
/// Invariants:
/// - `pending_lines` is ascending by offset
/// - `pending_lines` is empty whenever `has_lyrics` is false
/// - the current track only changes through [`SyncState::begin_track`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    current_track_id: Option<String>,
    previous_track_id: Option<String>,
    track_duration_ms: u64,
    progress_ms: u64,
    pending_lines: VecDeque<LyricLine>,
    has_lyrics: bool,
    lyrics_resolved: bool,
    idle_delay: Duration,
}

impl SyncState {
    /// Create an empty session state; `idle_delay` is the fallback poll cadence.
    #[must_use]
    pub const fn new(idle_delay: Duration) -> Self {
        Self {
            current_track_id: None,
            previous_track_id: None,
            track_duration_ms: 0,
            progress_ms: 0,
            pending_lines: VecDeque::new(),
            has_lyrics: false,
            lyrics_resolved: false,
            idle_delay,
        }
    }

    #[must_use]
    pub fn current_track_id(&self) -> Option<&str> {
        self.current_track_id.as_deref()
    }

    #[must_use]
    pub fn previous_track_id(&self) -> Option<&str> {
        self.previous_track_id.as_deref()
    }

    #[must_use]
    pub const fn track_duration_ms(&self) -> u64 {
        self.track_duration_ms
    }

    #[must_use]
    pub const fn progress_ms(&self) -> u64 {
        self.progress_ms
    }

    #[must_use]
    pub const fn pending_lines(&self) -> &VecDeque<LyricLine> {
        &self.pending_lines
    }

    #[must_use]
    pub const fn has_lyrics(&self) -> bool {
        self.has_lyrics
    }

    #[must_use]
    pub const fn idle_delay(&self) -> Duration {
        self.idle_delay
    }

    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        if self.current_track_id.is_none() {
            SyncPhase::Idle
        } else if !self.lyrics_resolved {
            SyncPhase::TrackLoading
        } else if !self.pending_lines.is_empty() {
            SyncPhase::Emitting
        } else {
            SyncPhase::WaitingForPlayback
        }
    }

    /// Evaluate one poll result.
    pub fn on_snapshot(&mut self, snapshot: &PlaybackSnapshot) -> Decision {
        if !snapshot.is_playing {
            debug!("Not playing, waiting {:?}", self.idle_delay);
            return Decision::Wait(self.idle_delay);
        }

        let Some(track) = &snapshot.track else {
            if self.current_track_id.is_some() {
                debug!("Playing without a track, clearing current track");
                self.begin_track(None, snapshot.progress_ms);
            }
            return Decision::Wait(self.idle_delay);
        };

        if snapshot.track_changed(self.current_track_id()) {
            self.begin_track(Some(track), snapshot.progress_ms);
            return Decision::TrackChanged {
                track: track.clone(),
                request: self.lyrics_request(&track.id),
            };
        }

        self.progress_ms = snapshot.progress_ms;

        if !self.lyrics_resolved {
            return Decision::RetryLyrics(self.lyrics_request(&track.id));
        }

        match self.pending_lines.pop_front() {
            Some(line) => {
                let next_delay = self.pending_lines.front().map_or(self.idle_delay, |next| {
                    delay_until(next.offset_ms, line.offset_ms)
                });
                let remaining = self.pending_lines.iter().cloned().collect();
                Decision::Emit {
                    update: LyricUpdate { line, remaining },
                    next_delay,
                }
            }
            None => Decision::Wait(self.idle_delay),
        }
    }

    /// Apply the result of a lyrics fetch for `track_id`.
    ///
    /// Returns the delay until the next cycle: the gap to the first line, or
    /// the idle delay when there is nothing to emit.
    pub fn on_lyrics(&mut self, track_id: &str, mut lines: Vec<LyricLine>) -> Duration {
        if self.current_track_id() != Some(track_id) {
            debug!("Discarding lyrics for {track_id}, track is no longer current");
            return self.idle_delay;
        }

        if lines.is_empty() {
            self.pending_lines.clear();
            self.has_lyrics = false;
            self.lyrics_resolved = false;
            return self.idle_delay;
        }

        lines.sort_by_key(|line| line.offset_ms);
        let first_offset = lines[0].offset_ms;
        self.pending_lines = lines.into();
        self.has_lyrics = true;
        self.lyrics_resolved = true;

        delay_until(first_offset, self.progress_ms)
    }

    /// Record a failed lyrics fetch; the same track is retried next cycle.
    pub fn on_lyrics_failed(&mut self) -> Duration {
        self.lyrics_resolved = false;
        self.idle_delay
    }

    /// Reset every per-track field in one step.
    fn begin_track(&mut self, track: Option<&TrackInfo>, progress_ms: u64) {
        self.previous_track_id = self.current_track_id.take();
        self.current_track_id = track.map(|t| t.id.clone());
        self.track_duration_ms = track.map_or(0, |t| t.duration_ms);
        self.progress_ms = progress_ms;
        self.pending_lines.clear();
        self.has_lyrics = false;
        self.lyrics_resolved = false;
    }

    fn lyrics_request(&self, track_id: &str) -> LyricsRequest {
        LyricsRequest::new(track_id, self.progress_ms, self.track_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_millis(5000);

    fn playing(track_id: &str, progress_ms: u64) -> PlaybackSnapshot {
        PlaybackSnapshot::new(
            true,
            progress_ms,
            Some(TrackInfo::new(track_id, "Song", 180_000)),
        )
    }

    fn paused(track_id: &str, progress_ms: u64) -> PlaybackSnapshot {
        PlaybackSnapshot {
            is_playing: false,
            ..playing(track_id, progress_ms)
        }
    }

    /// State with `lines` loaded for track "A" at `progress_ms`
    fn loaded(progress_ms: u64, lines: Vec<LyricLine>) -> SyncState {
        let mut state = SyncState::new(IDLE);
        state.on_snapshot(&playing("A", progress_ms));
        state.on_lyrics("A", lines);
        state
    }

    #[test]
    fn test_new_state_is_idle() {
        let state = SyncState::new(IDLE);
        assert_eq!(state.phase(), SyncPhase::Idle);
        assert!(state.current_track_id().is_none());
        assert!(!state.has_lyrics());
        assert!(state.pending_lines().is_empty());
    }

    #[test]
    fn test_not_playing_waits_without_mutation() {
        let mut state = loaded(2000, vec![LyricLine::new(3000, "hello")]);
        let before = state.clone();

        for _ in 0..3 {
            assert_eq!(state.on_snapshot(&paused("A", 2500)), Decision::Wait(IDLE));
            assert_eq!(state.on_snapshot(&paused("B", 0)), Decision::Wait(IDLE));
        }

        assert_eq!(state, before);
    }

    #[test]
    fn test_track_change_requests_lyrics() {
        let mut state = SyncState::new(IDLE);

        let decision = state.on_snapshot(&playing("A", 2000));

        assert!(matches!(
            decision,
            Decision::TrackChanged { ref track, ref request }
                if track.id == "A" && *request == LyricsRequest::new("A", 2000, 180_000)
        ));
        assert_eq!(state.current_track_id(), Some("A"));
        assert_eq!(state.phase(), SyncPhase::TrackLoading);
    }

    #[test]
    fn test_track_change_resets_previous_track() {
        let mut state = loaded(
            2000,
            vec![LyricLine::new(3000, "hello"), LyricLine::new(6000, "world")],
        );
        assert!(state.has_lyrics());

        let decision = state.on_snapshot(&playing("B", 500));

        assert!(matches!(decision, Decision::TrackChanged { .. }));
        assert_eq!(state.current_track_id(), Some("B"));
        assert_eq!(state.previous_track_id(), Some("A"));
        assert_eq!(state.progress_ms(), 500);
        assert_eq!(state.track_duration_ms(), 180_000);
        assert!(state.pending_lines().is_empty());
        assert!(!state.has_lyrics());
    }

    #[test]
    fn test_timed_scenario_first_delay_and_emission() {
        let mut state = SyncState::new(IDLE);
        state.on_snapshot(&playing("A", 2000));

        let delay = state.on_lyrics(
            "A",
            vec![LyricLine::new(3000, "hello"), LyricLine::new(6000, "world")],
        );
        assert_eq!(delay, Duration::from_millis(1000));
        assert_eq!(state.phase(), SyncPhase::Emitting);

        let decision = state.on_snapshot(&playing("A", 3000));
        assert_eq!(
            decision,
            Decision::Emit {
                update: LyricUpdate {
                    line: LyricLine::new(3000, "hello"),
                    remaining: vec![LyricLine::new(6000, "world")],
                },
                next_delay: Duration::from_millis(3000),
            }
        );
    }

    #[test]
    fn test_last_line_falls_back_to_idle_delay() {
        let mut state = loaded(0, vec![LyricLine::new(1000, "only")]);

        let decision = state.on_snapshot(&playing("A", 1000));

        assert!(matches!(
            decision,
            Decision::Emit { ref update, next_delay }
                if update.line.text == "only" && update.remaining.is_empty() && next_delay == IDLE
        ));
        assert_eq!(state.phase(), SyncPhase::WaitingForPlayback);
        assert_eq!(state.on_snapshot(&playing("A", 2000)), Decision::Wait(IDLE));
    }

    #[test]
    fn test_empty_lyrics_wait_and_keep_has_lyrics_false() {
        let mut state = SyncState::new(IDLE);
        state.on_snapshot(&playing("A", 0));

        let delay = state.on_lyrics("A", Vec::new());

        assert_eq!(delay, IDLE);
        assert!(!state.has_lyrics());
        assert!(state.pending_lines().is_empty());
    }

    #[test]
    fn test_unresolved_lyrics_are_refetched_at_live_progress() {
        let mut state = SyncState::new(IDLE);
        state.on_snapshot(&playing("A", 0));
        state.on_lyrics("A", Vec::new());

        let decision = state.on_snapshot(&playing("A", 5000));

        assert_eq!(
            decision,
            Decision::RetryLyrics(LyricsRequest::new("A", 5000, 180_000))
        );
        assert_eq!(state.previous_track_id(), None);
    }

    #[test]
    fn test_failed_fetch_keeps_track_unresolved() {
        let mut state = SyncState::new(IDLE);
        state.on_snapshot(&playing("A", 0));

        assert_eq!(state.on_lyrics_failed(), IDLE);
        assert_eq!(state.phase(), SyncPhase::TrackLoading);
        assert!(matches!(
            state.on_snapshot(&playing("A", 100)),
            Decision::RetryLyrics(_)
        ));
    }

    #[test]
    fn test_first_delay_in_the_past_is_clamped() {
        let mut state = SyncState::new(IDLE);
        state.on_snapshot(&playing("A", 60_000));

        // Untimed lines start at zero regardless of progress
        let delay = state.on_lyrics("A", vec![LyricLine::new(0, "a"), LyricLine::new(30_000, "b")]);

        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn test_out_of_order_lines_are_sorted() {
        let state = loaded(
            0,
            vec![
                LyricLine::new(9000, "c"),
                LyricLine::new(3000, "a"),
                LyricLine::new(6000, "b"),
            ],
        );

        let offsets: Vec<_> = state.pending_lines().iter().map(|l| l.offset_ms).collect();
        assert_eq!(offsets, vec![3000, 6000, 9000]);
    }

    #[test]
    fn test_stale_lyrics_are_discarded() {
        let mut state = SyncState::new(IDLE);
        state.on_snapshot(&playing("A", 0));
        state.on_snapshot(&playing("B", 0));

        let delay = state.on_lyrics("A", vec![LyricLine::new(1000, "old")]);

        assert_eq!(delay, IDLE);
        assert!(!state.has_lyrics());
        assert!(state.pending_lines().is_empty());
    }

    #[test]
    fn test_playing_without_track_clears_current_track() {
        let mut state = loaded(0, vec![LyricLine::new(1000, "hello")]);

        let decision = state.on_snapshot(&PlaybackSnapshot::new(true, 0, None));

        assert_eq!(decision, Decision::Wait(IDLE));
        assert_eq!(state.current_track_id(), None);
        assert_eq!(state.previous_track_id(), Some("A"));
        assert!(!state.has_lyrics());
        assert!(state.pending_lines().is_empty());
    }

    #[test]
    fn test_same_track_updates_progress() {
        let mut state = loaded(0, vec![LyricLine::new(1000, "a"), LyricLine::new(2000, "b")]);

        state.on_snapshot(&playing("A", 1200));

        assert_eq!(state.progress_ms(), 1200);
    }
}
