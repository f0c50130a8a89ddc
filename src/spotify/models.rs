//! Wire types of the Spotify Web API and accounts service.
//!
//! Every field the ingestion pipeline can live without is optional or
//! defaulted, so one odd item never fails deserialization of a whole page.

use serde::{Deserialize, Serialize};

/// One page of `/me/player/recently-played`.
///
/// Items are kept as raw JSON and decoded one at a time by the normalizer.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecentlyPlayedPage {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlayHistoryItem {
    pub track: Option<TrackObject>,
    pub played_at: Option<String>,
    pub context: Option<ContextObject>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContextObject {
    #[serde(rename = "type")]
    pub context_type: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TrackObject {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub duration_ms: Option<i64>,
    pub album: Option<AlbumObject>,
    #[serde(default)]
    pub artists: Vec<ArtistObject>,
    #[serde(default)]
    pub images: Vec<ImageObject>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlbumObject {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub album_type: Option<String>,
    pub total_tracks: Option<i64>,
    pub release_date: Option<String>,
    pub release_date_precision: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageObject>,
    #[serde(default)]
    pub artists: Vec<ArtistObject>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArtistObject {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImageObject {
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

/// Response of the accounts service token endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    /// Only present when the accounts service rotated the refresh token.
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}
