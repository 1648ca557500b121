//! Cycle runtime: poll, decide, emit, schedule the next cycle.

use crate::source::{LyricsRequest, LyricsSource, PlaybackSource};
use crate::sync::{Decision, LyricUpdate, SyncEvent, SyncState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "lyricsync::scheduler";

/// Capacity of the event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Drives one session: a single chain of timers where the next cycle is
/// only armed once the current one has finished.
pub struct SyncScheduler {
    playback: Arc<dyn PlaybackSource>,
    lyrics: Arc<dyn LyricsSource>,
    idle_delay: Duration,
    event_tx: broadcast::Sender<SyncEvent>,
    cancel_token: CancellationToken,
}

impl SyncScheduler {
    /// Create a new scheduler
    ///
    /// # Arguments
    /// * `playback` - Source of playback snapshots
    /// * `lyrics` - Source of lyric lines
    /// * `idle_delay` - Poll cadence when there is nothing to emit
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    #[must_use]
    pub fn new(
        playback: Arc<dyn PlaybackSource>,
        lyrics: Arc<dyn LyricsSource>,
        idle_delay: Duration,
        cancel_token: Option<CancellationToken>,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Arc::new(Self {
            playback,
            lyrics,
            idle_delay,
            event_tx,
            cancel_token: cancel_token.unwrap_or_default(),
        })
    }

    /// Subscribe to sync events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Get a clone of the cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stop the session: cancels the pending timer or in-flight cycle and
    /// suppresses any further events.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// Start the session in a background task
    #[must_use]
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run cycles until stopped
    pub async fn run(&self) {
        info!(
            target: LOG_TARGET,
            "Starting sync session (playback: {}, lyrics: {})",
            self.playback.name(),
            self.lyrics.name()
        );

        let mut state = SyncState::new(self.idle_delay);
        let mut delay = Duration::ZERO;

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }

            delay = tokio::select! {
                () = self.cancel_token.cancelled() => break,
                next = self.run_cycle(&mut state) => next,
            };
            debug!(target: LOG_TARGET, "Next cycle in {:?} ({:?})", delay, state.phase());
        }

        info!(target: LOG_TARGET, "Sync session stopped");
    }

    /// Run one cycle and return the delay until the next one.
    async fn run_cycle(&self, state: &mut SyncState) -> Duration {
        let snapshot = match self.playback.poll().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(target: LOG_TARGET, "Poll failed, retrying next cycle: {}", e);
                self.emit(SyncEvent::Error {
                    message: e.to_string(),
                });
                return self.idle_delay;
            }
        };

        match state.on_snapshot(&snapshot) {
            Decision::Wait(delay) => delay,
            Decision::TrackChanged { track, request } => {
                info!(
                    target: LOG_TARGET,
                    "Track changed: {} ({}) at {}ms", track.name, track.id, request.progress_ms
                );
                self.emit(SyncEvent::TrackChanged {
                    track,
                    progress_ms: request.progress_ms,
                });
                self.load_lyrics(state, &request, false).await
            }
            Decision::RetryLyrics(request) => {
                debug!(target: LOG_TARGET, "Retrying lyrics for {}", request.track_id);
                self.load_lyrics(state, &request, true).await
            }
            Decision::Emit { update, next_delay } => {
                self.emit_line(update);
                next_delay
            }
        }
    }

    async fn load_lyrics(&self, state: &mut SyncState, request: &LyricsRequest, retry: bool) -> Duration {
        match self.lyrics.fetch(request).await {
            Ok(lines) => {
                let line_count = lines.len();
                let delay = state.on_lyrics(&request.track_id, lines);
                if state.has_lyrics() {
                    info!(
                        target: LOG_TARGET,
                        "Loaded {} lyric lines for {}, first line in {:?}",
                        line_count,
                        request.track_id,
                        delay
                    );
                    self.emit(SyncEvent::LyricsLoaded {
                        track_id: request.track_id.clone(),
                        line_count,
                    });
                } else if retry {
                    debug!(
                        target: LOG_TARGET,
                        "Still no upcoming lyrics for {}, retrying in {:?}", request.track_id, delay
                    );
                    self.emit(SyncEvent::LyricsNotFound {
                        track_id: request.track_id.clone(),
                    });
                } else {
                    // Lines at or before the current progress are dropped by the source
                    info!(
                        target: LOG_TARGET,
                        "No upcoming lyrics for {} (none found or all already past), retrying in {:?}",
                        request.track_id,
                        delay
                    );
                    self.emit(SyncEvent::LyricsNotFound {
                        track_id: request.track_id.clone(),
                    });
                }
                delay
            }
            Err(e) => {
                warn!(
                    target: LOG_TARGET,
                    "Lyrics fetch for {} failed, retrying next cycle: {}", request.track_id, e
                );
                self.emit(SyncEvent::Error {
                    message: e.to_string(),
                });
                state.on_lyrics_failed()
            }
        }
    }

    fn emit_line(&self, update: LyricUpdate) {
        debug!(
            target: LOG_TARGET,
            "Emitting line at {}ms ({} remaining)",
            update.line.offset_ms,
            update.remaining.len()
        );
        self.emit(SyncEvent::LyricUpdate(update));
    }

    fn emit(&self, event: SyncEvent) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::lyrics::LyricLine;
    use crate::playback::{PlaybackSnapshot, TrackInfo};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    const IDLE: Duration = Duration::from_millis(5000);

    /// Replays scripted poll results; the last one repeats forever.
    struct ScriptedPlayback {
        script: Mutex<VecDeque<Result<PlaybackSnapshot, String>>>,
        polls: AtomicUsize,
    }

    impl ScriptedPlayback {
        fn new(script: Vec<Result<PlaybackSnapshot, String>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                polls: AtomicUsize::new(0),
            })
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PlaybackSource for ScriptedPlayback {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn poll(&self) -> Result<PlaybackSnapshot, CoreError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().expect("script lock");
            let next = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            next.expect("script is never empty")
                .map_err(|message| CoreError::Transport {
                    status: None,
                    message,
                })
        }
    }

    struct FixedLyrics {
        lines: Vec<LyricLine>,
        fetches: AtomicUsize,
    }

    impl FixedLyrics {
        fn new(lines: Vec<LyricLine>) -> Arc<Self> {
            Arc::new(Self {
                lines,
                fetches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LyricsSource for FixedLyrics {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch(&self, request: &LyricsRequest) -> Result<Vec<LyricLine>, CoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .lines
                .iter()
                .filter(|l| l.offset_ms > request.progress_ms)
                .cloned()
                .collect())
        }
    }

    fn playing(track_id: &str, progress_ms: u64) -> PlaybackSnapshot {
        PlaybackSnapshot::new(
            true,
            progress_ms,
            Some(TrackInfo::new(track_id, "Song", 180_000)),
        )
    }

    async fn next_update(rx: &mut broadcast::Receiver<SyncEvent>) -> LyricUpdate {
        loop {
            match rx.recv().await.expect("event channel open") {
                SyncEvent::LyricUpdate(update) => return update,
                _ => continue,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_line_is_emitted_at_its_offset() {
        let playback = ScriptedPlayback::new(vec![Ok(playing("A", 2000))]);
        let lyrics = FixedLyrics::new(vec![
            LyricLine::new(1000, "intro"),
            LyricLine::new(3000, "hello"),
            LyricLine::new(6000, "world"),
        ]);
        let scheduler = SyncScheduler::new(playback, lyrics, IDLE, None);
        let mut rx = scheduler.subscribe();

        let started = Instant::now();
        let handle = scheduler.clone().start();

        let first = next_update(&mut rx).await;
        assert_eq!(first.line, LyricLine::new(3000, "hello"));
        assert_eq!(first.remaining, vec![LyricLine::new(6000, "world")]);
        assert_eq!(started.elapsed(), Duration::from_millis(1000));

        let second = next_update(&mut rx).await;
        assert_eq!(second.line, LyricLine::new(6000, "world"));
        assert!(second.remaining.is_empty());
        assert_eq!(started.elapsed(), Duration::from_millis(4000));

        scheduler.stop();
        handle.await.expect("scheduler task");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_events_after_stop() {
        let playback = ScriptedPlayback::new(vec![Ok(playing("A", 0))]);
        let lyrics = FixedLyrics::new(vec![
            LyricLine::new(1000, "one"),
            LyricLine::new(2000, "two"),
        ]);
        let scheduler = SyncScheduler::new(playback.clone(), lyrics, IDLE, None);
        let mut rx = scheduler.subscribe();
        let handle = scheduler.clone().start();

        let first = next_update(&mut rx).await;
        assert_eq!(first.line.text, "one");

        scheduler.stop();
        handle.await.expect("scheduler task");
        let polls_at_stop = playback.polls();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        assert_eq!(playback.polls(), polls_at_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_keep_session_alive() {
        let playback = ScriptedPlayback::new(vec![
            Err("boom".into()),
            Err("boom".into()),
            Ok(playing("A", 0)),
        ]);
        let lyrics = FixedLyrics::new(vec![LyricLine::new(500, "after errors")]);
        let scheduler = SyncScheduler::new(playback.clone(), lyrics, IDLE, None);
        let mut rx = scheduler.subscribe();

        let started = Instant::now();
        let handle = scheduler.clone().start();

        let update = next_update(&mut rx).await;
        assert_eq!(update.line.text, "after errors");
        // Two failed cycles at the idle cadence, then 500ms to the line
        assert_eq!(started.elapsed(), IDLE * 2 + Duration::from_millis(500));
        assert_eq!(playback.polls(), 4);

        scheduler.stop();
        handle.await.expect("scheduler task");
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_playback_polls_at_idle_cadence() {
        let playback = ScriptedPlayback::new(vec![Ok(PlaybackSnapshot::new(
            false,
            0,
            Some(TrackInfo::new("A", "Song", 180_000)),
        ))]);
        let lyrics = FixedLyrics::new(vec![LyricLine::new(1000, "never")]);
        let scheduler = SyncScheduler::new(playback.clone(), lyrics.clone(), IDLE, None);
        let handle = scheduler.clone().start();

        // Polls at t = 0, 5s, 10s
        tokio::time::sleep(Duration::from_millis(12_000)).await;
        assert_eq!(playback.polls(), 3);
        assert_eq!(lyrics.fetches.load(Ordering::SeqCst), 0);

        scheduler.stop();
        handle.await.expect("scheduler task");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_lyrics_are_refetched() {
        let playback = ScriptedPlayback::new(vec![Ok(playing("A", 0))]);
        let lyrics = FixedLyrics::new(Vec::new());
        let scheduler = SyncScheduler::new(playback, lyrics.clone(), IDLE, None);
        let mut rx = scheduler.subscribe();
        let handle = scheduler.clone().start();

        let mut first_not_found = None;
        while first_not_found.is_none() {
            if let SyncEvent::LyricsNotFound { track_id } = rx.recv().await.expect("event") {
                assert_eq!(track_id, "A");
                first_not_found = Some(Instant::now());
            }
        }
        loop {
            if let SyncEvent::LyricsNotFound { track_id } = rx.recv().await.expect("event") {
                assert_eq!(track_id, "A");
                break;
            }
        }
        let started = first_not_found.expect("first miss");
        assert_eq!(started.elapsed(), IDLE);
        assert_eq!(lyrics.fetches.load(Ordering::SeqCst), 2);

        scheduler.stop();
        handle.await.expect("scheduler task");
    }

    #[tokio::test(start_paused = true)]
    async fn test_lyrics_all_past_wait_at_idle_cadence() {
        let playback = ScriptedPlayback::new(vec![Ok(playing("A", 10_000))]);
        let lyrics = FixedLyrics::new(vec![
            LyricLine::new(1000, "gone"),
            LyricLine::new(4000, "also gone"),
        ]);
        let scheduler = SyncScheduler::new(playback.clone(), lyrics.clone(), IDLE, None);
        let mut rx = scheduler.subscribe();
        let started = Instant::now();
        let handle = scheduler.clone().start();

        let mut misses = 0;
        while misses < 3 {
            match rx.recv().await.expect("event") {
                SyncEvent::LyricsNotFound { .. } => misses += 1,
                event => assert!(!matches!(event, SyncEvent::LyricUpdate(_))),
            }
        }
        assert_eq!(started.elapsed(), IDLE * 2);
        assert_eq!(lyrics.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(playback.polls(), 3);

        scheduler.stop();
        handle.await.expect("scheduler task");
    }
}
