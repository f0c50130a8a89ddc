use super::models::{RecentlyPlayedPage, TokenResponse};
use super::{PlaybackHistorySource, SpotifyError, TokenEndpoint};
use anyhow::Result;
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";

const SCOPES: &str =
    "user-read-recently-played user-read-currently-playing user-read-playback-state user-library-read";

#[derive(Clone)]
pub struct SpotifyClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub api_base_url: String,
    pub accounts_base_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for SpotifyClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("api_base_url", &self.api_base_url)
            .field("accounts_base_url", &self.accounts_base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Blocking client. Must be created and dropped outside of an async runtime.
pub struct SpotifyClient {
    client: Client,
    config: SpotifyClientConfig,
}

impl SpotifyClient {
    pub fn new(config: SpotifyClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("listen-tracker/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, SpotifyError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(SpotifyError::Status {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .map_err(|e| SpotifyError::InvalidResponse(e.to_string()))
    }

    fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, SpotifyError> {
        let url = format!("{}/api/token", self.config.accounts_base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(form)
            .send()
            .map_err(|e| SpotifyError::Unreachable(e.to_string()))?;
        Self::read_json(response)
    }
}

impl PlaybackHistorySource for SpotifyClient {
    fn recently_played(&self, access_token: &str, limit: u32) -> Result<RecentlyPlayedPage, SpotifyError> {
        let url = format!(
            "{}/me/player/recently-played?limit={}",
            self.config.api_base_url, limit
        );
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .map_err(|e| SpotifyError::Unreachable(e.to_string()))?;
        Self::read_json(response)
    }
}

impl TokenEndpoint for SpotifyClient {
    fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, SpotifyError> {
        debug!("Refreshing Spotify access token");
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
    }

    fn exchange_code(&self, code: &str) -> Result<TokenResponse, SpotifyError> {
        debug!("Exchanging Spotify authorization code");
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
    }

    fn authorize_url(&self) -> String {
        format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}",
            self.config.accounts_base_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(SCOPES)
        )
    }
}
