use crate::error::{Result, SpotifyError};
use rspotify::{prelude::*, scopes, AuthCodeSpotify, Credentials, OAuth};
use tracing::{debug, info};

/// Tokens returned by the authorization-code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// One-time authorization-code flow used to obtain a refresh token.
pub struct SpotifyAuthorizer {
    client: AuthCodeSpotify,
}

impl SpotifyAuthorizer {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        let creds = Credentials::new(&client_id.into(), &client_secret.into());

        let oauth = OAuth {
            redirect_uri: redirect_uri.into(),
            scopes: scopes!("user-read-currently-playing", "user-read-playback-state"),
            ..Default::default()
        };

        Self {
            client: AuthCodeSpotify::new(creds, oauth),
        }
    }

    /// URL the user opens to grant access.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built.
    pub fn authorize_url(&self) -> Result<String> {
        Ok(self.client.get_authorize_url(false)?)
    }

    /// Exchange an authorization code for tokens.
    ///
    /// `input` may be the bare code, the full redirect URL or a `code=...`
    /// fragment.
    ///
    /// # Errors
    ///
    /// Returns an error if no code is found or the exchange is rejected.
    pub async fn exchange_code(&self, input: &str) -> Result<TokenPair> {
        let code = extract_code(input).ok_or_else(|| SpotifyError::Auth {
            status: None,
            message: "no authorization code found in input".into(),
        })?;
        debug!("Exchanging authorization code");

        self.client.request_token(&code).await?;

        let guard = self
            .client
            .token
            .lock()
            .await
            .map_err(|_| SpotifyError::Auth {
                status: None,
                message: "Failed to acquire token lock".into(),
            })?;
        let token = guard.as_ref().ok_or_else(|| SpotifyError::Auth {
            status: None,
            message: "exchange returned no token".into(),
        })?;

        info!("Authorization code exchanged");
        Ok(TokenPair {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
        })
    }
}

/// Pull the authorization code out of user input.
#[must_use]
pub fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(url) = url::Url::parse(input) {
        return url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .filter(|code| !code.is_empty());
    }

    if let Some((_, rest)) = input.split_once("code=") {
        let code = rest.split('&').next().unwrap_or_default();
        return (!code.is_empty()).then(|| code.to_string());
    }

    Some(input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_raw_code() {
        assert_eq!(extract_code("  AQBx123 \n"), Some("AQBx123".into()));
    }

    #[test]
    fn test_extract_from_redirect_url() {
        let input = "http://127.0.0.1:8888/callback?code=AQBx123&state=xyz";
        assert_eq!(extract_code(input), Some("AQBx123".into()));
    }

    #[test]
    fn test_extract_from_query_fragment() {
        assert_eq!(extract_code("code=AQBx123&state=xyz"), Some("AQBx123".into()));
    }

    #[test]
    fn test_extract_missing_code() {
        assert_eq!(extract_code(""), None);
        assert_eq!(extract_code("http://127.0.0.1:8888/callback?error=access_denied"), None);
    }

    #[test]
    fn test_authorize_url_carries_scopes() {
        let authorizer = SpotifyAuthorizer::new("my-client", "secret", "http://127.0.0.1:8888/callback");

        let url = authorizer.authorize_url().expect("url");

        assert!(url.starts_with("https://accounts.spotify.com/authorize"));
        assert!(url.contains("client_id=my-client"));
        assert!(url.contains("user-read-currently-playing"));
        assert!(url.contains("user-read-playback-state"));
    }
}
