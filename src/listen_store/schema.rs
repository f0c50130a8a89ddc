//! SQLite schema definitions for the listen database.
//!
//! Catalog entities (artists, albums, tracks) are keyed by a surrogate
//! integer id and carry the upstream identifier in `external_id`. Listens
//! are unique per `(track_id, played_at)`.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

// =============================================================================
// Version 1 - Catalog, listens and credential
// =============================================================================

const ARTISTS_TABLE_V1: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("external_id", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("image_url_small", &SqlType::Text),
        sqlite_column!("image_url_medium", &SqlType::Text),
        sqlite_column!("image_url_large", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[],
};

const ALBUMS_TABLE_V1: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("external_id", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("release_date", &SqlType::Text),
        sqlite_column!(
            "release_date_precision",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'unknown'")
        ),
        sqlite_column!("album_type", &SqlType::Text),
        sqlite_column!("total_tracks", &SqlType::Integer),
        sqlite_column!("image_url_small", &SqlType::Text),
        sqlite_column!("image_url_medium", &SqlType::Text),
        sqlite_column!("image_url_large", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[],
};

const TRACKS_TABLE_V1: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("external_id", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("duration", &SqlType::Integer, non_null = true),
        sqlite_column!("image_url_small", &SqlType::Text),
        sqlite_column!("image_url_medium", &SqlType::Text),
        sqlite_column!("image_url_large", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[],
};

const ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ALBUM_FK: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const TRACK_FK: ForeignKey = ForeignKey {
    foreign_table: "tracks",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const TRACK_ARTISTS_TABLE_V1: Table = Table {
    name: "track_artists",
    columns: &[
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
    ],
    indices: &[("idx_track_artists_artist", "artist_id")],
    unique_constraints: &[&["track_id", "artist_id"]],
};

const ALBUM_ARTISTS_TABLE_V1: Table = Table {
    name: "album_artists",
    columns: &[
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_FK)
        ),
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
    ],
    indices: &[("idx_album_artists_artist", "artist_id")],
    unique_constraints: &[&["album_id", "artist_id"]],
};

const TRACK_ALBUMS_TABLE_V1: Table = Table {
    name: "track_albums",
    columns: &[
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_FK)
        ),
    ],
    indices: &[("idx_track_albums_album", "album_id")],
    unique_constraints: &[&["track_id", "album_id"]],
};

/// `played_at` holds UTC RFC 3339 with millisecond precision so equal instants compare equal as text.
const LISTENS_TABLE_V1: Table = Table {
    name: "listens",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!("played_at", &SqlType::Text, non_null = true),
        sqlite_column!("context_type", &SqlType::Text),
    ],
    indices: &[("idx_listens_played_at", "played_at")],
    unique_constraints: &[&["track_id", "played_at"]],
};

/// Singleton credential row, always stored with `id = 1`.
const CREDENTIALS_TABLE_V1: Table = Table {
    name: "credentials",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("access_token", &SqlType::Text, non_null = true),
        sqlite_column!("refresh_token", &SqlType::Text, non_null = true),
        sqlite_column!(
            "token_type",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'Bearer'")
        ),
        sqlite_column!("expires_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

// =============================================================================
// Version 2 - Ingestion run history
// =============================================================================

const INGESTION_RUNS_TABLE_V2: Table = Table {
    name: "ingestion_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("started_at", &SqlType::Text, non_null = true),
        sqlite_column!("finished_at", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("triggered_by", &SqlType::Text, non_null = true),
        sqlite_column!("fetched", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("inserted", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("duplicates", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("failed", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("error", &SqlType::Text),
    ],
    indices: &[
        ("idx_ingestion_runs_started", "started_at DESC"),
        ("idx_ingestion_runs_status", "status"),
    ],
    unique_constraints: &[],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    INGESTION_RUNS_TABLE_V2.create(conn)
}

pub const LISTEN_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[
            ARTISTS_TABLE_V1,
            ALBUMS_TABLE_V1,
            TRACKS_TABLE_V1,
            TRACK_ARTISTS_TABLE_V1,
            ALBUM_ARTISTS_TABLE_V1,
            TRACK_ALBUMS_TABLE_V1,
            LISTENS_TABLE_V1,
            CREDENTIALS_TABLE_V1,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            ARTISTS_TABLE_V1,
            ALBUMS_TABLE_V1,
            TRACKS_TABLE_V1,
            TRACK_ARTISTS_TABLE_V1,
            ALBUM_ARTISTS_TABLE_V1,
            TRACK_ALBUMS_TABLE_V1,
            LISTENS_TABLE_V1,
            CREDENTIALS_TABLE_V1,
            INGESTION_RUNS_TABLE_V2,
        ],
        migration: Some(migrate_v1_to_v2),
    },
];
