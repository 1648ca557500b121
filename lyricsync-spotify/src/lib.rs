pub mod api;
pub mod error;
pub mod lyrics;
pub mod oauth;
pub mod player;
pub mod token;
pub mod transport;

use std::sync::Arc;

use lyricsync_core::{Config, CoreError, SyncScheduler};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use api::{Auth, Fetched, SpotifyApi};
pub use error::SpotifyError;
pub use lyrics::SpotifyLyricsFetcher;
pub use oauth::{extract_code, SpotifyAuthorizer, TokenPair};
pub use player::SpotifyPoller;
pub use token::{Credentials, TokenManager};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};

/// Wire the Spotify clients into a [`SyncScheduler`] using the real HTTP
/// transport.
///
/// # Errors
///
/// Returns a config error if a required credential is missing, or an error if
/// the HTTP client cannot be created.
pub fn build_scheduler(
    config: &Config,
    cancel_token: Option<CancellationToken>,
) -> Result<Arc<SyncScheduler>, CoreError> {
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);
    build_scheduler_with(config, transport, cancel_token)
}

/// Like [`build_scheduler`], over any [`HttpTransport`].
///
/// # Errors
///
/// Returns a config error if a required credential is missing.
pub fn build_scheduler_with(
    config: &Config,
    transport: Arc<dyn HttpTransport>,
    cancel_token: Option<CancellationToken>,
) -> Result<Arc<SyncScheduler>, CoreError> {
    config.validate()?;

    let tokens = Arc::new(TokenManager::new(
        transport.clone(),
        Credentials::from_config(&config.spotify),
        config.sync.token_max_age(),
    ));
    let api = Arc::new(SpotifyApi::new(transport, tokens));

    let poller = Arc::new(SpotifyPoller::new(
        api.clone(),
        config.sync.poll_max_attempts,
        config.sync.poll_backoff_step(),
    ));
    let lyrics = Arc::new(SpotifyLyricsFetcher::new(api));

    info!(
        "Spotify session configured (poll attempts: {}, idle poll: {}ms)",
        config.sync.poll_max_attempts, config.sync.idle_poll_ms
    );

    Ok(SyncScheduler::new(
        poller,
        lyrics,
        config.sync.idle_delay(),
        cancel_token,
    ))
}
