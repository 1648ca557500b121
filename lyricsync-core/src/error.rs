use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - please fill in your Spotify credentials and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Missing required config field: {field}")]
    ConfigMissingField { field: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Session errors
    #[error("Authentication failed{}: {message}", format_status(.status.as_ref()))]
    Auth { status: Option<u16>, message: String },

    #[error("Request failed{}: {message}", format_status(.status.as_ref()))]
    Transport { status: Option<u16>, message: String },

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// HTTP status attached to an auth or transport failure, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

fn format_status(status: Option<&u16>) -> String {
    status.map_or_else(String::new, |s| format!(" (HTTP {s})"))
}

pub type Result<T> = std::result::Result<T, CoreError>;
