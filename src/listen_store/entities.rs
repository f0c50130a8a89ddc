//! Row-level access to catalog entities and listens.
//!
//! Every function takes an explicit `&Connection`, which is normally a
//! transaction scoped to one ingestion event. Errors are returned as raw
//! `rusqlite::Error` so callers can tell a uniqueness violation apart from
//! infrastructure failures.

use super::models::{
    Album, AlbumDefaults, Artist, ArtistDefaults, DatePrecision, EntityKind, EntityRecord,
    ImageUrls, NewListen, Track, TrackDefaults,
};
use chrono::{NaiveDate, SecondsFormat};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

/// An entity that can be looked up by upstream id and created from defaults.
pub trait CatalogEntity: Clone + Sized {
    const KIND: EntityKind;
    type Defaults;

    fn find_by_external_id(conn: &Connection, external_id: &str) -> rusqlite::Result<Option<Self>>;

    fn insert(conn: &Connection, external_id: &str, defaults: Self::Defaults) -> rusqlite::Result<Self>;

    fn into_record(self) -> EntityRecord;

    fn from_record(record: &EntityRecord) -> Option<Self>;
}

fn images_from_row(row: &Row) -> rusqlite::Result<ImageUrls> {
    Ok(ImageUrls {
        small: row.get("image_url_small")?,
        medium: row.get("image_url_medium")?,
        large: row.get("image_url_large")?,
    })
}

impl CatalogEntity for Artist {
    const KIND: EntityKind = EntityKind::Artist;
    type Defaults = ArtistDefaults;

    fn find_by_external_id(conn: &Connection, external_id: &str) -> rusqlite::Result<Option<Self>> {
        conn.query_row(
            "SELECT id, external_id, name, image_url_small, image_url_medium, image_url_large
             FROM artists WHERE external_id = ?1",
            params![external_id],
            row_to_artist,
        )
        .optional()
    }

    fn insert(conn: &Connection, external_id: &str, defaults: ArtistDefaults) -> rusqlite::Result<Self> {
        conn.execute(
            "INSERT INTO artists (external_id, name) VALUES (?1, ?2)",
            params![external_id, defaults.name],
        )?;
        Ok(Artist {
            id: conn.last_insert_rowid(),
            external_id: external_id.to_string(),
            name: defaults.name,
            images: ImageUrls::default(),
        })
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Artist(self)
    }

    fn from_record(record: &EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Artist(artist) => Some(artist.clone()),
            _ => None,
        }
    }
}

impl CatalogEntity for Album {
    const KIND: EntityKind = EntityKind::Album;
    type Defaults = AlbumDefaults;

    fn find_by_external_id(conn: &Connection, external_id: &str) -> rusqlite::Result<Option<Self>> {
        conn.query_row(
            "SELECT id, external_id, name, release_date, release_date_precision, album_type,
                    total_tracks, image_url_small, image_url_medium, image_url_large
             FROM albums WHERE external_id = ?1",
            params![external_id],
            row_to_album,
        )
        .optional()
    }

    fn insert(conn: &Connection, external_id: &str, defaults: AlbumDefaults) -> rusqlite::Result<Self> {
        conn.execute(
            "INSERT INTO albums (external_id, name, release_date, release_date_precision,
                                 album_type, total_tracks,
                                 image_url_small, image_url_medium, image_url_large)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                external_id,
                defaults.name,
                defaults.release_date.map(|d| d.format("%Y-%m-%d").to_string()),
                defaults.release_date_precision.as_str(),
                defaults.album_type,
                defaults.total_tracks,
                defaults.images.small,
                defaults.images.medium,
                defaults.images.large,
            ],
        )?;
        Ok(Album {
            id: conn.last_insert_rowid(),
            external_id: external_id.to_string(),
            name: defaults.name,
            release_date: defaults.release_date,
            release_date_precision: defaults.release_date_precision,
            album_type: defaults.album_type,
            total_tracks: defaults.total_tracks,
            images: defaults.images,
        })
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Album(self)
    }

    fn from_record(record: &EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Album(album) => Some(album.clone()),
            _ => None,
        }
    }
}

impl CatalogEntity for Track {
    const KIND: EntityKind = EntityKind::Track;
    type Defaults = TrackDefaults;

    fn find_by_external_id(conn: &Connection, external_id: &str) -> rusqlite::Result<Option<Self>> {
        conn.query_row(
            "SELECT id, external_id, name, duration, image_url_small, image_url_medium, image_url_large
             FROM tracks WHERE external_id = ?1",
            params![external_id],
            row_to_track,
        )
        .optional()
    }

    fn insert(conn: &Connection, external_id: &str, defaults: TrackDefaults) -> rusqlite::Result<Self> {
        conn.execute(
            "INSERT INTO tracks (external_id, name, duration,
                                 image_url_small, image_url_medium, image_url_large)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                external_id,
                defaults.name,
                defaults.duration,
                defaults.images.small,
                defaults.images.medium,
                defaults.images.large,
            ],
        )?;
        Ok(Track {
            id: conn.last_insert_rowid(),
            external_id: external_id.to_string(),
            name: defaults.name,
            duration: defaults.duration,
            images: defaults.images,
        })
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Track(self)
    }

    fn from_record(record: &EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Track(track) => Some(track.clone()),
            _ => None,
        }
    }
}

pub(crate) fn row_to_artist(row: &Row) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: row.get("id")?,
        external_id: row.get("external_id")?,
        name: row.get("name")?,
        images: images_from_row(row)?,
    })
}

pub(crate) fn row_to_album(row: &Row) -> rusqlite::Result<Album> {
    let release_date: Option<String> = row.get("release_date")?;
    let precision: String = row.get("release_date_precision")?;
    Ok(Album {
        id: row.get("id")?,
        external_id: row.get("external_id")?,
        name: row.get("name")?,
        release_date: release_date.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        release_date_precision: DatePrecision::parse(&precision),
        album_type: row.get("album_type")?,
        total_tracks: row.get("total_tracks")?,
        images: images_from_row(row)?,
    })
}

pub(crate) fn row_to_track(row: &Row) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get("id")?,
        external_id: row.get("external_id")?,
        name: row.get("name")?,
        duration: row.get("duration")?,
        images: images_from_row(row)?,
    })
}

/// Returns true when a new association row was written, false if the pair was already linked.
pub fn link_track_artist(conn: &Connection, track_id: i64, artist_id: i64) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO track_artists (track_id, artist_id) VALUES (?1, ?2)",
        params![track_id, artist_id],
    )?;
    Ok(changed > 0)
}

pub fn link_album_artist(conn: &Connection, album_id: i64, artist_id: i64) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO album_artists (album_id, artist_id) VALUES (?1, ?2)",
        params![album_id, artist_id],
    )?;
    Ok(changed > 0)
}

pub fn link_track_album(conn: &Connection, track_id: i64, album_id: i64) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO track_albums (track_id, album_id) VALUES (?1, ?2)",
        params![track_id, album_id],
    )?;
    Ok(changed > 0)
}

pub(crate) fn format_played_at(played_at: &chrono::DateTime<chrono::Utc>) -> String {
    played_at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn insert_listen(conn: &Connection, listen: &NewListen) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO listens (track_id, played_at, context_type) VALUES (?1, ?2, ?3)",
        params![
            listen.track_id,
            format_played_at(&listen.played_at),
            listen.context_type
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Errors after which the connection itself can't be trusted for further work.
pub fn is_infrastructure_failure(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::DiskFull
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::NotADatabase
                | ErrorCode::ReadOnly
                | ErrorCode::OutOfMemory
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listen_store::LISTEN_VERSIONED_SCHEMAS;
    use chrono::{TimeZone, Utc};

    fn open_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        LISTEN_VERSIONED_SCHEMAS.last().unwrap().create(&conn).unwrap();
        conn
    }

    fn track_defaults(name: &str) -> TrackDefaults {
        TrackDefaults {
            name: name.to_string(),
            duration: 215,
            images: ImageUrls::default(),
        }
    }

    #[test]
    fn test_insert_and_find_album_roundtrips_release_date() {
        let conn = open_db();
        let created = Album::insert(
            &conn,
            "alb1",
            AlbumDefaults {
                name: "Blue".to_string(),
                release_date: NaiveDate::from_ymd_opt(1971, 6, 22),
                release_date_precision: DatePrecision::Day,
                album_type: Some("album".to_string()),
                total_tracks: Some(10),
                images: ImageUrls {
                    small: Some("s".to_string()),
                    medium: Some("m".to_string()),
                    large: Some("l".to_string()),
                },
            },
        )
        .unwrap();

        let found = Album::find_by_external_id(&conn, "alb1").unwrap().unwrap();
        assert_eq!(found, created);
        assert!(Album::find_by_external_id(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn test_linking_twice_keeps_one_row() {
        let conn = open_db();
        let track = Track::insert(&conn, "t1", track_defaults("Song")).unwrap();
        let artist = Artist::insert(
            &conn,
            "a1",
            ArtistDefaults {
                name: "Singer".to_string(),
            },
        )
        .unwrap();

        assert!(link_track_artist(&conn, track.id, artist.id).unwrap());
        assert!(!link_track_artist(&conn, track.id, artist.id).unwrap());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM track_artists", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_duplicate_listen_is_a_unique_violation() {
        let conn = open_db();
        let track = Track::insert(&conn, "t1", track_defaults("Song")).unwrap();
        let listen = NewListen {
            track_id: track.id,
            played_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            context_type: Some("playlist".to_string()),
        };
        insert_listen(&conn, &listen).unwrap();

        let err = insert_listen(&conn, &listen).unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(!is_infrastructure_failure(&err));
    }

    #[test]
    fn test_duplicate_external_id_is_rejected() {
        let conn = open_db();
        Track::insert(&conn, "t1", track_defaults("Song")).unwrap();
        let err = Track::insert(&conn, "t1", track_defaults("Other")).unwrap_err();
        assert!(is_unique_violation(&err));
    }
}
