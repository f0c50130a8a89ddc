use super::entities::{format_played_at, row_to_album, row_to_artist, row_to_track};
use super::models::{
    Credential, DatabaseStats, IngestionRun, IngestionRunStatus, Listen, ListenWithTrack,
    RunCounts,
};
use super::schema::LISTEN_VERSIONED_SCHEMAS;
use super::{CredentialStore, ListenStore};
use crate::sqlite_persistence::open_versioned;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

const CREDENTIAL_ROW_ID: i64 = 1;

pub struct SqliteListenStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteListenStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        info!("Opening listen database at {:?}", path);

        let mut conn = Connection::open(path).context("Failed to open listen database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        open_versioned(&mut conn, LISTEN_VERSIONED_SCHEMAS, "Listen")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Exclusive access to the underlying connection.
    ///
    /// The ingestion runner holds this for the duration of a single event so
    /// it can open, commit or roll back that event's transaction.
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Listen database lock is poisoned"))
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<IngestionRun> {
        let status_str: String = row.get("status")?;
        let started_at: String = row.get("started_at")?;
        let finished_at: Option<String> = row.get("finished_at")?;
        Ok(IngestionRun {
            id: row.get("id")?,
            started_at: Self::parse_datetime(&started_at).unwrap_or_else(Utc::now),
            finished_at: finished_at.as_deref().and_then(Self::parse_datetime),
            status: IngestionRunStatus::parse(&status_str).unwrap_or(IngestionRunStatus::Failed),
            triggered_by: row.get("triggered_by")?,
            counts: RunCounts {
                fetched: row.get::<_, i64>("fetched")? as usize,
                inserted: row.get::<_, i64>("inserted")? as usize,
                duplicates: row.get::<_, i64>("duplicates")? as usize,
                failed: row.get::<_, i64>("failed")? as usize,
            },
            error: row.get("error")?,
        })
    }

    fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
            r.get(0)
        })?;
        Ok(count as usize)
    }
}

impl ListenStore for SqliteListenStore {
    fn listens_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ListenWithTrack>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT l.id AS listen_id, l.played_at, l.context_type,
                    t.id, t.external_id, t.name, t.duration,
                    t.image_url_small, t.image_url_medium, t.image_url_large
             FROM listens l JOIN tracks t ON t.id = l.track_id
             WHERE l.played_at >= ?1 AND l.played_at < ?2
             ORDER BY l.played_at DESC",
        )?;
        let rows = stmt
            .query_map(params![format_played_at(&from), format_played_at(&to)], |row| {
                let track = row_to_track(row)?;
                let played_at: String = row.get("played_at")?;
                Ok((
                    Listen {
                        id: row.get("listen_id")?,
                        track_id: track.id,
                        played_at: Self::parse_datetime(&played_at).unwrap_or_default(),
                        context_type: row.get("context_type")?,
                    },
                    track,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut albums_stmt = conn.prepare(
            "SELECT a.* FROM albums a JOIN track_albums ta ON ta.album_id = a.id
             WHERE ta.track_id = ?1 ORDER BY a.id",
        )?;
        let mut artists_stmt = conn.prepare(
            "SELECT a.* FROM artists a JOIN track_artists ta ON ta.artist_id = a.id
             WHERE ta.track_id = ?1 ORDER BY a.id",
        )?;

        let mut listens = Vec::with_capacity(rows.len());
        for (listen, track) in rows {
            let albums = albums_stmt
                .query_map(params![track.id], row_to_album)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let artists = artists_stmt
                .query_map(params![track.id], row_to_artist)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            listens.push(ListenWithTrack {
                listen,
                track,
                albums,
                artists,
            });
        }
        Ok(listens)
    }

    fn database_stats(&self) -> Result<DatabaseStats> {
        let conn = self.connection()?;
        Ok(DatabaseStats {
            artists: Self::count_rows(&conn, "artists")?,
            albums: Self::count_rows(&conn, "albums")?,
            tracks: Self::count_rows(&conn, "tracks")?,
            listens: Self::count_rows(&conn, "listens")?,
        })
    }

    fn record_run_start(&self, triggered_by: &str) -> Result<i64> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO ingestion_runs (started_at, status, triggered_by) VALUES (?1, ?2, ?3)",
            params![
                Self::format_datetime(&Utc::now()),
                IngestionRunStatus::Running.as_str(),
                triggered_by
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn record_run_finish(
        &self,
        run_id: i64,
        status: IngestionRunStatus,
        counts: RunCounts,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE ingestion_runs
             SET finished_at = ?1, status = ?2, fetched = ?3, inserted = ?4,
                 duplicates = ?5, failed = ?6, error = ?7
             WHERE id = ?8",
            params![
                Self::format_datetime(&Utc::now()),
                status.as_str(),
                counts.fetched as i64,
                counts.inserted as i64,
                counts.duplicates as i64,
                counts.failed as i64,
                error,
                run_id
            ],
        )?;
        Ok(())
    }

    fn get_recent_runs(&self, limit: usize) -> Result<Vec<IngestionRun>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM ingestion_runs ORDER BY started_at DESC, id DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map(params![limit as i64], Self::row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn mark_stale_runs_failed(&self) -> Result<usize> {
        let conn = self.connection()?;
        let count = conn.execute(
            "UPDATE ingestion_runs SET status = ?1, finished_at = ?2, error = ?3
             WHERE status = ?4",
            params![
                IngestionRunStatus::Failed.as_str(),
                Self::format_datetime(&Utc::now()),
                "Run was interrupted (process restart)",
                IngestionRunStatus::Running.as_str()
            ],
        )?;
        Ok(count)
    }
}

impl CredentialStore for SqliteListenStore {
    fn get_credential(&self) -> Result<Option<Credential>> {
        let conn = self.connection()?;
        let credential = conn
            .query_row(
                "SELECT access_token, refresh_token, token_type, expires_at
                 FROM credentials WHERE id = ?1",
                params![CREDENTIAL_ROW_ID],
                |row| {
                    let expires_at: String = row.get("expires_at")?;
                    Ok(Credential {
                        access_token: row.get("access_token")?,
                        refresh_token: row.get("refresh_token")?,
                        token_type: row.get("token_type")?,
                        // An unreadable expiry is treated as already expired
                        expires_at: Self::parse_datetime(&expires_at).unwrap_or_default(),
                    })
                },
            )
            .optional()
            .context("Failed to read credential")?;
        Ok(credential)
    }

    fn save_credential(&self, credential: &Credential) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO credentials (id, access_token, refresh_token, token_type, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                expires_at = excluded.expires_at",
            params![
                CREDENTIAL_ROW_ID,
                credential.access_token,
                credential.refresh_token,
                credential.token_type,
                Self::format_datetime(&credential.expires_at)
            ],
        )
        .context("Failed to save credential")?;
        Ok(())
    }

    fn clear_credential(&self) -> Result<bool> {
        let conn = self.connection()?;
        let deleted = conn.execute("DELETE FROM credentials", [])?;
        Ok(deleted > 0)
    }
}
