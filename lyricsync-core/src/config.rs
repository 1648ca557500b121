use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables that override credentials from the config file
pub const ENV_CLIENT_ID: &str = "LYRICSYNC_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "LYRICSYNC_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "LYRICSYNC_REFRESH_TOKEN";
pub const ENV_COOKIE: &str = "LYRICSYNC_COOKIE";
pub const ENV_ACCESS_TOKEN: &str = "LYRICSYNC_ACCESS_TOKEN";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Long-lived token from the one-time authorization exchange
    #[serde(default)]
    pub refresh_token: String,
    /// Web session cookie used to obtain the web-player token for lyrics
    #[serde(default)]
    pub cookie: String,
    /// Optional: a still-valid access token to skip the initial refresh
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

fn default_redirect_uri() -> String {
    "http://127.0.0.1:8888/callback".into()
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            cookie: String::new(),
            access_token: None,
            redirect_uri: default_redirect_uri(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Poll cadence while paused or when nothing is left to emit
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    /// Attempts per poll before the cycle gives up
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
    /// Linear backoff step between poll attempts
    #[serde(default = "default_poll_backoff_step_ms")]
    pub poll_backoff_step_ms: u64,
    /// Age after which the access token is refreshed before use
    #[serde(default = "default_token_max_age_secs")]
    pub token_max_age_secs: u64,
}

const fn default_idle_poll_ms() -> u64 {
    5000
}

const fn default_poll_max_attempts() -> u32 {
    10
}

const fn default_poll_backoff_step_ms() -> u64 {
    5000
}

const fn default_token_max_age_secs() -> u64 {
    3600
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: default_idle_poll_ms(),
            poll_max_attempts: default_poll_max_attempts(),
            poll_backoff_step_ms: default_poll_backoff_step_ms(),
            token_max_age_secs: default_token_max_age_secs(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub const fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    #[must_use]
    pub const fn poll_backoff_step(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_step_ms)
    }

    #[must_use]
    pub const fn token_max_age(&self) -> Duration {
        Duration::from_secs(self.token_max_age_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to ~/.config/lyricsync/lyricsync.log
    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    /// Get the config file path (~/.config/lyricsync/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default path or create a template on first run
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing the template, or an
    /// error if the file cannot be read or parsed.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Load config from `path` or create a template there
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing the template, or an
    /// error if the file cannot be read or parsed.
    pub fn load_or_create_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, CONFIG_TEMPLATE)?;

            return Err(CoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse config from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid config TOML.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override credentials with non-empty values from `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_CLIENT_ID) {
            self.spotify.client_id = v;
        }
        if let Some(v) = get(ENV_CLIENT_SECRET) {
            self.spotify.client_secret = v;
        }
        if let Some(v) = get(ENV_REFRESH_TOKEN) {
            self.spotify.refresh_token = v;
        }
        if let Some(v) = get(ENV_COOKIE) {
            self.spotify.cookie = v;
        }
        if let Some(v) = get(ENV_ACCESS_TOKEN) {
            self.spotify.access_token = Some(v);
        }
    }

    /// Validate that everything a session needs is present.
    ///
    /// # Errors
    ///
    /// Returns an error if a required credential is empty or a sync value is unusable.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("spotify.client_id", &self.spotify.client_id),
            ("spotify.client_secret", &self.spotify.client_secret),
            ("spotify.refresh_token", &self.spotify.refresh_token),
            ("spotify.cookie", &self.spotify.cookie),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::ConfigMissingField {
                    field: field.to_string(),
                });
            }
        }

        if self.sync.poll_max_attempts == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "sync.poll_max_attempts must be at least 1".into(),
            });
        }

        Ok(())
    }
}

const CONFIG_TEMPLATE: &str = r#"# lyricsync configuration
# ~/.config/lyricsync/config.toml
#
# Credentials can also be supplied through LYRICSYNC_CLIENT_ID,
# LYRICSYNC_CLIENT_SECRET, LYRICSYNC_REFRESH_TOKEN and LYRICSYNC_COOKIE.

[spotify]
# Required: Get these from https://developer.spotify.com/dashboard
client_id = ""
client_secret = ""
# Required: run `lyricsync auth` to obtain one
refresh_token = ""
# Required: sp_dc cookie from a logged-in open.spotify.com session
cookie = ""
redirect_uri = "http://127.0.0.1:8888/callback"

[sync]
idle_poll_ms = 5000
poll_max_attempts = 10
poll_backoff_step_ms = 5000
token_max_age_secs = 3600

[logging]
# Also write logs to ~/.config/lyricsync/lyricsync.log
enabled = false
"#;
