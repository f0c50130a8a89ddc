//! Spotify Web API and accounts service client.

mod client;
mod models;

pub use client::{SpotifyClient, SpotifyClientConfig, DEFAULT_ACCOUNTS_BASE_URL, DEFAULT_API_BASE_URL};
pub use models::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpotifyError {
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("Spotify unreachable: {0}")]
    Unreachable(String),

    #[error("Spotify returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response from Spotify: {0}")]
    InvalidResponse(String),
}

/// Source of the user's recently played items.
pub trait PlaybackHistorySource: Send + Sync {
    /// Fetches up to `limit` items, newest first.
    fn recently_played(&self, access_token: &str, limit: u32) -> Result<RecentlyPlayedPage, SpotifyError>;
}

/// The accounts service token endpoint.
pub trait TokenEndpoint: Send + Sync {
    fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, SpotifyError>;

    fn exchange_code(&self, code: &str) -> Result<TokenResponse, SpotifyError>;

    /// Consent page the user opens to grant access.
    fn authorize_url(&self) -> String;
}
