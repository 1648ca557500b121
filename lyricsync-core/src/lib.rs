pub mod backoff;
pub mod config;
pub mod error;
pub mod lyrics;
pub mod paths;
pub mod playback;
pub mod scheduler;
pub mod source;
pub mod sync;
pub mod time;

pub use backoff::LinearBackoff;
pub use config::{Config, LoggingConfig, SpotifyConfig, SyncConfig};

pub use error::CoreError;
pub use lyrics::{LyricLine, LyricsPayload};
pub use paths::{config_dir, config_path, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME};
pub use playback::{PlaybackSnapshot, TrackInfo};
pub use scheduler::SyncScheduler;
pub use source::{LyricsRequest, LyricsSource, PlaybackSource};
pub use sync::{Decision, LyricUpdate, SyncEvent, SyncPhase, SyncState};
pub use time::DurationExt;
