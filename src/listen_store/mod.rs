mod entities;
mod models;
mod schema;
mod sqlite_listen_store;

pub use entities::{
    insert_listen, is_infrastructure_failure, is_unique_violation, link_album_artist,
    link_track_album, link_track_artist, CatalogEntity,
};
pub use models::*;
pub use schema::LISTEN_VERSIONED_SCHEMAS;
pub use sqlite_listen_store::SqliteListenStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

/// Read side and run bookkeeping of the listen database.
pub trait ListenStore: Send + Sync {
    /// Committed listens with `from <= played_at < to`, newest first.
    fn listens_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ListenWithTrack>>;
    fn database_stats(&self) -> Result<DatabaseStats>;

    // Run history
    fn record_run_start(&self, triggered_by: &str) -> Result<i64>;
    fn record_run_finish(
        &self,
        run_id: i64,
        status: IngestionRunStatus,
        counts: RunCounts,
        error: Option<&str>,
    ) -> Result<()>;
    fn get_recent_runs(&self, limit: usize) -> Result<Vec<IngestionRun>>;
    /// Marks runs left in `running` by an interrupted process as failed.
    fn mark_stale_runs_failed(&self) -> Result<usize>;
}

/// Storage for the singleton upstream credential.
pub trait CredentialStore: Send + Sync {
    fn get_credential(&self) -> Result<Option<Credential>>;
    /// Overwrites the existing credential, if any.
    fn save_credential(&self, credential: &Credential) -> Result<()>;
    /// Returns whether a credential was present.
    fn clear_credential(&self) -> Result<bool>;
}
