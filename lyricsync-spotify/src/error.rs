use lyricsync_core::CoreError;
use thiserror::Error;

/// Unified error type for all Spotify-related operations.
///
/// This consolidates errors from token refresh, polling, lyrics fetching
/// and the authorization exchange into a single error type owned by the
/// spotify crate.
#[derive(Debug, Error)]
pub enum SpotifyError {
    /// Token refresh or exchange was rejected.
    #[error("Spotify authentication failed{}: {message}", format_status(.status.as_ref()))]
    Auth { status: Option<u16>, message: String },

    /// Non-2xx response (other than the benign ones) or a network failure.
    #[error("Spotify request failed{}: {message}", format_status(.status.as_ref()))]
    Transport { status: Option<u16>, message: String },

    /// Spotify API returned a rate limit response.
    #[error("Spotify API rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Error from the HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to parse a response body.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the Spotify OAuth client.
    #[error("Spotify OAuth error: {0}")]
    OAuth(#[from] rspotify::ClientError),
}

impl SpotifyError {
    /// HTTP status attached to the failure, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Transport { status, .. } => *status,
            Self::RateLimited { .. } => Some(429),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Json(_) | Self::OAuth(_) => None,
        }
    }
}

fn format_status(status: Option<&u16>) -> String {
    status.map_or_else(String::new, |s| format!(" (HTTP {s})"))
}

impl From<SpotifyError> for CoreError {
    fn from(err: SpotifyError) -> Self {
        match err {
            SpotifyError::Auth { status, message } => Self::Auth { status, message },
            other => Self::Transport {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }
}

/// Convenience type alias for Results with `SpotifyError`.
pub type Result<T> = std::result::Result<T, SpotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_stays_auth() {
        let core: CoreError = SpotifyError::Auth {
            status: Some(400),
            message: "invalid_grant".into(),
        }
        .into();

        assert!(matches!(core, CoreError::Auth { status: Some(400), .. }));
    }

    #[test]
    fn test_rate_limit_becomes_transport() {
        let core: CoreError = SpotifyError::RateLimited {
            retry_after_secs: 3,
        }
        .into();

        assert_eq!(core.status(), Some(429));
        assert!(matches!(
            core,
            CoreError::Transport { ref message, .. } if message.contains("retry after 3s")
        ));
    }
}
