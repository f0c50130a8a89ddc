//! Turns one raw recently-played item into catalog rows and a listen.

use super::dates::normalize_release_date;
use super::error::IngestionError;
use super::images::select_images;
use super::resolver::{resolve_album, resolve_artist, resolve_track, EntityCache};
use crate::listen_store::{
    insert_listen, is_unique_violation, link_album_artist, link_track_album, link_track_artist,
    AlbumDefaults, Artist, NewListen, TrackDefaults,
};
use crate::spotify::{ArtistObject, PlayHistoryItem};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// Upstream track id of a raw item, for log lines about it.
pub fn event_label(item: &serde_json::Value) -> String {
    item.pointer("/track/id")
        .and_then(|v| v.as_str())
        .map(|id| format!("track {}", id))
        .unwrap_or_else(|| "item without track id".to_string())
}

pub fn parse_played_at(raw: &str) -> Result<DateTime<Utc>, IngestionError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| IngestionError::MalformedEvent(format!("bad played_at {:?}: {}", raw, e)))
}

fn resolve_artists(
    conn: &Connection,
    cache: &mut EntityCache,
    artists: &[ArtistObject],
) -> Result<Vec<Artist>, IngestionError> {
    artists
        .iter()
        .map(|a| {
            let id = a.id.as_deref().unwrap_or_default();
            if a.name.is_empty() {
                return Err(IngestionError::MalformedEvent(format!(
                    "artist {:?} has no name",
                    id
                )));
            }
            resolve_artist(conn, cache, id, &a.name).map(|(artist, _)| artist)
        })
        .collect()
}

/// Resolves the item's artists, album and track, links them, and returns the listen to stage.
///
/// Everything is written through `conn`, which the caller scopes to this
/// event's transaction. Nothing is committed here.
pub fn normalize_event(
    conn: &Connection,
    cache: &mut EntityCache,
    item: &serde_json::Value,
) -> Result<NewListen, IngestionError> {
    let item: PlayHistoryItem = serde_json::from_value(item.clone())
        .map_err(|e| IngestionError::MalformedEvent(format!("undecodable item: {}", e)))?;

    let played_at = match item.played_at.as_deref() {
        Some(raw) => parse_played_at(raw)?,
        None => return Err(IngestionError::MalformedEvent("missing played_at".to_string())),
    };
    let raw_track = item
        .track
        .ok_or_else(|| IngestionError::MalformedEvent("missing track".to_string()))?;
    let track_id = raw_track
        .id
        .clone()
        .ok_or_else(|| IngestionError::MalformedEvent("track without an id".to_string()))?;
    let raw_album = raw_track.album.clone().ok_or_else(|| {
        IngestionError::MalformedEvent(format!("track {} has no album", track_id))
    })?;
    let album_id = raw_album.id.clone().ok_or_else(|| {
        IngestionError::MalformedEvent(format!("album of track {} has no id", track_id))
    })?;
    if raw_track.name.is_empty() {
        return Err(IngestionError::MalformedEvent(format!(
            "track {} has no name",
            track_id
        )));
    }
    if raw_album.name.is_empty() {
        return Err(IngestionError::MalformedEvent(format!(
            "album {} has no name",
            album_id
        )));
    }

    let track_artists = resolve_artists(conn, cache, &raw_track.artists)?;
    let album_artists = resolve_artists(conn, cache, &raw_album.artists)?;

    let album_images = select_images(&raw_album.images);
    let (release_date, release_date_precision) = normalize_release_date(
        raw_album.release_date.as_deref(),
        raw_album.release_date_precision.as_deref(),
    );
    let (album, _) = resolve_album(
        conn,
        cache,
        &album_id,
        AlbumDefaults {
            name: raw_album.name,
            release_date,
            release_date_precision,
            album_type: raw_album.album_type,
            total_tracks: raw_album.total_tracks,
            images: album_images.clone(),
        },
    )?;

    let mut track_images = select_images(&raw_track.images);
    if track_images.is_empty() {
        track_images = album_images;
    }
    let (track, _) = resolve_track(
        conn,
        cache,
        &track_id,
        TrackDefaults {
            name: raw_track.name,
            duration: raw_track.duration_ms.unwrap_or(0) / 1000,
            images: track_images,
        },
    )?;

    for artist in &track_artists {
        link_track_artist(conn, track.id, artist.id)?;
    }
    for artist in &album_artists {
        link_album_artist(conn, album.id, artist.id)?;
    }
    link_track_album(conn, track.id, album.id)?;

    Ok(NewListen {
        track_id: track.id,
        played_at,
        context_type: item.context.and_then(|c| c.context_type),
    })
}

/// Writes the listen into the event's transaction.
pub fn stage_listen(conn: &Connection, listen: &NewListen) -> Result<i64, IngestionError> {
    insert_listen(conn, listen).map_err(|e| {
        if is_unique_violation(&e) {
            IngestionError::DuplicateListen
        } else {
            IngestionError::Store(e)
        }
    })
}
