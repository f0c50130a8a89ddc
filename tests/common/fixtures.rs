//! Test fixtures: upstream play events and a scripted playback source.

use super::constants::*;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use listen_tracker::spotify::{
    PlaybackHistorySource, RecentlyPlayedPage, SpotifyError, TokenEndpoint, TokenResponse,
};

fn artist(id: &str) -> Value {
    let name = match id {
        ARTIST_1_ID => "The Test Band",
        ARTIST_2_ID => "Jazz Ensemble",
        _ => "Unknown Artist",
    };
    json!({ "id": id, "name": name })
}

fn album() -> Value {
    json!({
        "id": ALBUM_1_ID,
        "name": "First Album",
        "album_type": "album",
        "total_tracks": 3,
        "release_date": "2019-05-17",
        "release_date_precision": "day",
        "artists": [artist(ARTIST_1_ID)],
        "images": [
            { "url": "https://img.test/album-640", "height": 640, "width": 640 },
            { "url": "https://img.test/album-300", "height": 300, "width": 300 },
            { "url": "https://img.test/album-64", "height": 64, "width": 64 }
        ]
    })
}

/// A play event as served by the recently played endpoint.
pub fn play_event(track_id: &str, played_at: &str) -> Value {
    let (name, duration_ms, artists) = match track_id {
        TRACK_1_ID => ("Opening Track", 215_000, vec![artist(ARTIST_1_ID)]),
        TRACK_2_ID => (
            "Second Song",
            187_500,
            vec![artist(ARTIST_1_ID), artist(ARTIST_2_ID)],
        ),
        _ => ("Closing Time", 301_999, vec![artist(ARTIST_1_ID)]),
    };
    json!({
        "played_at": played_at,
        "context": { "type": "album", "uri": format!("spotify:album:{}", ALBUM_1_ID) },
        "track": {
            "id": track_id,
            "name": name,
            "duration_ms": duration_ms,
            "artists": artists,
            "album": album()
        }
    })
}

/// The three plays of First Album, in playback order.
pub fn album_session() -> Vec<Value> {
    vec![
        play_event(TRACK_1_ID, PLAYED_AT_1),
        play_event(TRACK_2_ID, PLAYED_AT_2),
        play_event(TRACK_3_ID, PLAYED_AT_3),
    ]
}

/// Serves queued responses in order, then empty pages.
pub struct ScriptedSource {
    responses: Mutex<VecDeque<Result<RecentlyPlayedPage, SpotifyError>>>,
    calls: AtomicUsize,
    tokens_seen: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            tokens_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn push_page(&self, items: Vec<Value>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(RecentlyPlayedPage { items }));
    }

    pub fn push_error(&self, error: SpotifyError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }
}

impl PlaybackHistorySource for ScriptedSource {
    fn recently_played(
        &self,
        access_token: &str,
        _limit: u32,
    ) -> Result<RecentlyPlayedPage, SpotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen
            .lock()
            .unwrap()
            .push(access_token.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RecentlyPlayedPage::default()))
    }
}

/// Token endpoint that hands out numbered access tokens.
pub struct CountingTokenEndpoint {
    refreshes: AtomicUsize,
}

impl CountingTokenEndpoint {
    pub fn new() -> Self {
        Self {
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl TokenEndpoint for CountingTokenEndpoint {
    fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, SpotifyError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenResponse {
            access_token: format!("access-{}", n),
            token_type: Some("Bearer".to_string()),
            refresh_token: None,
            expires_in: Some(3600),
            scope: None,
        })
    }

    fn exchange_code(&self, code: &str) -> Result<TokenResponse, SpotifyError> {
        Ok(TokenResponse {
            access_token: format!("access-for-{}", code),
            token_type: Some("Bearer".to_string()),
            refresh_token: Some("refresh-from-code".to_string()),
            expires_in: Some(3600),
            scope: None,
        })
    }

    fn authorize_url(&self) -> String {
        "https://accounts.test/authorize".to_string()
    }
}
