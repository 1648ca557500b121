mod auth;

use clap::{Parser, Subcommand};
use lyricsync_core::{Config, CoreError, SyncEvent};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "lyricsync", version, about = "Print synced lyrics for the track playing on Spotify")]
struct Cli {
    /// Override config file path.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Follow playback and print each lyric line as it comes up (default).
    Run,
    /// Obtain a refresh token. Without a code, prints the authorization URL.
    Auth {
        /// Authorization code, or the full URL Spotify redirected to.
        #[arg(long)]
        code: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);

    // Load before tracing so the file layer can honour [logging]
    let (mut config, load_error) = match Config::load_or_create_at(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    init_tracing(config.logging.enabled);

    match load_error {
        None => {}
        Some(CoreError::ConfigNotFound { path }) => {
            info!(
                "Created config template at {}; using defaults and environment",
                path.display()
            );
        }
        Some(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    }
    config.apply_env_overrides(|key| std::env::var(key).ok());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&runtime, &config),
        Command::Auth { code } => runtime.block_on(auth::run(&config.spotify, code.as_deref())),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            if matches!(e, CoreError::ConfigMissingField { .. }) {
                error!(
                    "Set it in {} or through the LYRICSYNC_* environment variables",
                    config_path.display()
                );
            }
            ExitCode::FAILURE
        }
    }
}

fn run(runtime: &tokio::runtime::Runtime, config: &Config) -> Result<(), CoreError> {
    // Create shared cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Set up Ctrl+C handler to trigger graceful shutdown
    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    let scheduler = lyricsync_spotify::build_scheduler(config, Some(cancel_token.clone()))?;

    runtime.block_on(async {
        let events = scheduler.subscribe();
        let handle = scheduler.clone().start();

        print_events(events, &cancel_token).await;

        if let Err(e) = handle.await {
            error!("Sync task ended abnormally: {e}");
        }
    });

    Ok(())
}

/// Event sink: lyric lines go to stdout, everything else to the log.
async fn print_events(
    mut events: tokio::sync::broadcast::Receiver<SyncEvent>,
    cancel_token: &CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel_token.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(SyncEvent::LyricUpdate(update)) => {
                println!("{}", update.line.text);
                debug!("{} lines remaining", update.remaining.len());
            }
            Ok(SyncEvent::TrackChanged { track, .. }) => {
                info!("Now playing: {}", track.name);
            }
            Ok(SyncEvent::LyricsNotFound { track_id }) => {
                debug!("No lyrics yet for {track_id}");
            }
            Ok(SyncEvent::LyricsLoaded { .. } | SyncEvent::Error { .. }) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event consumer lagged, skipped {skipped} events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Initialize tracing with console output and optional file logging
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rspotify_http=warn"));

    // Lyrics own stdout
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if file_logging_enabled {
        let log_path = lyricsync_core::log_file_path();

        match create_log_file(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn create_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::try_parse_from(["lyricsync"]).expect("parse");
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_auth_with_code() {
        let cli = Cli::try_parse_from(["lyricsync", "--config", "/tmp/c.toml", "auth", "--code", "abc"])
            .expect("parse");

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(
            cli.command,
            Some(Command::Auth { code: Some(ref code) }) if code == "abc"
        ));
    }
}
