//! `lyricsync auth`: one-time authorization-code exchange.

use lyricsync_core::{CoreError, SpotifyConfig};
use lyricsync_spotify::SpotifyAuthorizer;
use tracing::{debug, info};

pub async fn run(config: &SpotifyConfig, code: Option<&str>) -> Result<(), CoreError> {
    for (field, value) in [
        ("spotify.client_id", &config.client_id),
        ("spotify.client_secret", &config.client_secret),
    ] {
        if value.trim().is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: field.to_string(),
            });
        }
    }

    let authorizer = SpotifyAuthorizer::new(
        config.client_id.as_str(),
        config.client_secret.as_str(),
        config.redirect_uri.as_str(),
    );

    let Some(code) = code else {
        let url = authorizer.authorize_url()?;
        println!("Open this URL and approve access:\n\n  {url}\n");
        println!("Then run: lyricsync auth --code <code or the URL you were redirected to>");
        if let Err(e) = open::that(&url) {
            debug!("Could not open browser: {e}");
        }
        return Ok(());
    };

    let tokens = authorizer.exchange_code(code).await?;
    info!("Authorization complete");

    println!("access_token = \"{}\"", tokens.access_token);
    match tokens.refresh_token {
        Some(refresh_token) => {
            println!("refresh_token = \"{refresh_token}\"");
            println!("\nAdd refresh_token to the [spotify] section of your config.");
        }
        None => println!("No refresh token was returned; authorize again."),
    }

    Ok(())
}
