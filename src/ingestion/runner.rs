//! One ingestion pass: token, page fetch, per-event normalize and commit.

use super::credentials::CredentialProvider;
use super::error::IngestionError;
use super::normalizer::{event_label, normalize_event, stage_listen};
use super::resolver::{CacheStats, EntityCache};
use crate::listen_store::{IngestionRunStatus, ListenStore, RunCounts, SqliteListenStore};
use crate::spotify::PlaybackHistorySource;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Largest page the recently-played endpoint serves.
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub counts: RunCounts,
    pub cache: CacheStats,
    /// Set when the run stopped before processing the whole page.
    pub aborted: Option<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.aborted.is_none()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fetched={} inserted={} duplicates={} failed={} cache_hits={} created={}",
            self.counts.fetched,
            self.counts.inserted,
            self.counts.duplicates,
            self.counts.failed,
            self.cache.hits,
            self.cache.created
        )?;
        if let Some(reason) = &self.aborted {
            write!(f, " aborted=\"{}\"", reason)?;
        }
        Ok(())
    }
}

pub struct IngestionRunner {
    store: Arc<SqliteListenStore>,
    credentials: Arc<CredentialProvider>,
    source: Arc<dyn PlaybackHistorySource>,
    page_size: u32,
}

impl IngestionRunner {
    pub fn new(
        store: Arc<SqliteListenStore>,
        credentials: Arc<CredentialProvider>,
        source: Arc<dyn PlaybackHistorySource>,
        page_size: u32,
    ) -> Self {
        Self {
            store,
            credentials,
            source,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Runs one pass and records it in the run history.
    ///
    /// Never fails: run-level errors end up in `RunSummary::aborted`.
    /// Callers must not run two passes at the same time.
    pub fn run(&self, triggered_by: &str, cancellation: &CancellationToken) -> RunSummary {
        let run_id = match self.store.record_run_start(triggered_by) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to record ingestion run start: {:#}", e);
                None
            }
        };

        let mut summary = RunSummary::default();
        if let Err(e) = self.ingest_page(cancellation, &mut summary) {
            error!("Ingestion run aborted: {}", e);
            summary.aborted = Some(e.to_string());
        }
        info!("Ingestion run finished: {}", summary);

        if let Some(run_id) = run_id {
            let status = if summary.is_success() {
                IngestionRunStatus::Completed
            } else {
                IngestionRunStatus::Failed
            };
            if let Err(e) = self.store.record_run_finish(
                run_id,
                status,
                summary.counts,
                summary.aborted.as_deref(),
            ) {
                warn!("Failed to record ingestion run finish: {:#}", e);
            }
        }
        summary
    }

    fn ingest_page(
        &self,
        cancellation: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<(), IngestionError> {
        let token = self.credentials.get_valid_token()?;
        let page = self.source.recently_played(&token, self.page_size)?;
        summary.counts.fetched = page.items.len();
        if page.items.is_empty() {
            info!("No recently played items returned");
            return Ok(());
        }

        let mut cache = EntityCache::new();
        let outcome = self.ingest_items(&page.items, &mut cache, cancellation, &mut summary.counts);
        summary.cache = cache.stats();
        outcome?;

        let processed = summary.counts.inserted + summary.counts.duplicates + summary.counts.failed;
        if processed < summary.counts.fetched {
            info!(
                "Ingestion cancelled after {} of {} items",
                processed, summary.counts.fetched
            );
            summary.aborted = Some("cancelled".to_string());
        }
        Ok(())
    }

    fn ingest_items(
        &self,
        items: &[serde_json::Value],
        cache: &mut EntityCache,
        cancellation: &CancellationToken,
        counts: &mut RunCounts,
    ) -> Result<(), IngestionError> {
        for item in items {
            if cancellation.is_cancelled() {
                break;
            }
            match self.ingest_item(cache, item) {
                Ok(()) => {
                    counts.inserted += 1;
                    debug!("Inserted listen for {}", event_label(item));
                }
                Err(IngestionError::DuplicateListen) => {
                    counts.duplicates += 1;
                    debug!("Already recorded: {}", event_label(item));
                }
                Err(e) if e.is_run_aborting() => {
                    counts.failed += 1;
                    return Err(e);
                }
                Err(e) => {
                    counts.failed += 1;
                    warn!("Skipping {}: {}", event_label(item), e);
                }
            }
        }
        Ok(())
    }

    /// Normalizes and stages one item in its own transaction, then commits it.
    fn ingest_item(
        &self,
        cache: &mut EntityCache,
        item: &serde_json::Value,
    ) -> Result<(), IngestionError> {
        let mut conn = self
            .store
            .connection()
            .map_err(|e| IngestionError::StoreUnavailable(e.to_string()))?;
        let tx = conn.transaction()?;

        let staged = normalize_event(&tx, cache, item).and_then(|listen| stage_listen(&tx, &listen));
        if let Err(e) = staged {
            if let Err(rollback_err) = tx.rollback() {
                warn!("Rollback failed: {}", rollback_err);
            }
            cache.discard_pending();
            return Err(e);
        }

        match tx.commit() {
            Ok(()) => {
                cache.commit_pending();
                Ok(())
            }
            Err(e) => {
                cache.discard_pending();
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listen_store::{Credential, CredentialStore};
    use crate::spotify::{RecentlyPlayedPage, SpotifyError, TokenEndpoint, TokenResponse};
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct MockSource {
        result: Mutex<Option<Result<RecentlyPlayedPage, SpotifyError>>>,
        calls: AtomicUsize,
    }

    impl MockSource {
        fn returning(result: Result<RecentlyPlayedPage, SpotifyError>) -> Self {
            Self {
                result: Mutex::new(Some(result)),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl PlaybackHistorySource for MockSource {
        fn recently_played(
            &self,
            _access_token: &str,
            _limit: u32,
        ) -> Result<RecentlyPlayedPage, SpotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(RecentlyPlayedPage::default()))
        }
    }

    struct NoRefresh;

    impl TokenEndpoint for NoRefresh {
        fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, SpotifyError> {
            Err(SpotifyError::Unreachable("offline".to_string()))
        }

        fn exchange_code(&self, _code: &str) -> Result<TokenResponse, SpotifyError> {
            Err(SpotifyError::Unreachable("offline".to_string()))
        }

        fn authorize_url(&self) -> String {
            String::new()
        }
    }

    struct Fixture {
        store: Arc<SqliteListenStore>,
        source: Arc<MockSource>,
        runner: IngestionRunner,
        _temp_dir: TempDir,
    }

    fn fixture(source: MockSource, with_credential: bool) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteListenStore::new(temp_dir.path().join("listens.db")).unwrap());
        if with_credential {
            store
                .save_credential(&Credential {
                    access_token: "token".to_string(),
                    refresh_token: "refresh".to_string(),
                    token_type: "Bearer".to_string(),
                    expires_at: Utc::now() + Duration::hours(1),
                })
                .unwrap();
        }
        let credentials = Arc::new(CredentialProvider::new(store.clone(), Arc::new(NoRefresh)));
        let source = Arc::new(source);
        let runner = IngestionRunner::new(store.clone(), credentials, source.clone(), 50);
        Fixture {
            store,
            source,
            runner,
            _temp_dir: temp_dir,
        }
    }

    fn page(items: Vec<serde_json::Value>) -> RecentlyPlayedPage {
        RecentlyPlayedPage { items }
    }

    fn item(track_id: &str, played_at: &str) -> serde_json::Value {
        json!({
            "played_at": played_at,
            "track": {
                "id": track_id,
                "name": format!("Track {}", track_id),
                "duration_ms": 1000,
                "artists": [{"id": "a1", "name": "Artist"}],
                "album": {"id": "alb1", "name": "Album", "artists": [{"id": "a1", "name": "Artist"}]}
            }
        })
    }

    #[test]
    fn test_missing_credential_aborts_before_fetching() {
        let f = fixture(MockSource::returning(Ok(page(vec![]))), false);

        let summary = f.runner.run("test", &CancellationToken::new());

        assert!(!summary.is_success());
        assert_eq!(summary.counts, RunCounts::default());
        assert_eq!(f.source.calls.load(Ordering::SeqCst), 0);
        let runs = f.store.get_recent_runs(1).unwrap();
        assert_eq!(runs[0].status, IngestionRunStatus::Failed);
        assert!(runs[0].error.as_deref().unwrap().contains("No credential"));
    }

    #[test]
    fn test_upstream_error_aborts_run() {
        let f = fixture(
            MockSource::returning(Err(SpotifyError::Status {
                status: 429,
                message: "rate limited".to_string(),
            })),
            true,
        );

        let summary = f.runner.run("test", &CancellationToken::new());
        assert!(summary.aborted.unwrap().contains("429"));
        assert_eq!(f.store.database_stats().unwrap().listens, 0);
    }

    #[test]
    fn test_empty_page_is_a_successful_noop() {
        let f = fixture(MockSource::returning(Ok(page(vec![]))), true);

        let summary = f.runner.run("test", &CancellationToken::new());
        assert!(summary.is_success());
        assert_eq!(summary.counts, RunCounts::default());
        assert_eq!(
            f.store.get_recent_runs(1).unwrap()[0].status,
            IngestionRunStatus::Completed
        );
    }

    #[test]
    fn test_counts_and_run_history() {
        let f = fixture(
            MockSource::returning(Ok(page(vec![
                item("t1", "2024-03-01T10:00:00Z"),
                item("t2", "2024-03-01T10:05:00Z"),
                item("t1", "2024-03-01T10:00:00.000Z"),
            ]))),
            true,
        );

        let summary = f.runner.run("manual", &CancellationToken::new());

        assert!(summary.is_success());
        assert_eq!(
            summary.counts,
            RunCounts {
                fetched: 3,
                inserted: 2,
                duplicates: 1,
                failed: 0
            }
        );
        let run = &f.store.get_recent_runs(1).unwrap()[0];
        assert_eq!(run.triggered_by, "manual");
        assert_eq!(run.counts, summary.counts);
        let stats = f.store.database_stats().unwrap();
        assert_eq!((stats.artists, stats.albums, stats.tracks, stats.listens), (1, 1, 2, 2));
    }

    #[test]
    fn test_cancelled_run_stops_before_items() {
        let f = fixture(
            MockSource::returning(Ok(page(vec![item("t1", "2024-03-01T10:00:00Z")]))),
            true,
        );
        let token = CancellationToken::new();
        token.cancel();

        let summary = f.runner.run("test", &token);
        assert_eq!(summary.aborted.as_deref(), Some("cancelled"));
        assert_eq!(f.store.database_stats().unwrap().listens, 0);
    }

    #[test]
    fn test_page_size_is_clamped() {
        let f = fixture(MockSource::returning(Ok(page(vec![]))), true);
        let runner = IngestionRunner::new(
            f.store.clone(),
            Arc::new(CredentialProvider::new(f.store.clone(), Arc::new(NoRefresh))),
            f.source.clone(),
            500,
        );
        assert_eq!(runner.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_rejected_insert_fails_only_its_event() {
        let f = fixture(
            MockSource::returning(Ok(page(vec![
                item("t1", "2024-03-01T10:00:00Z"),
                item("t2", "2024-03-01T10:05:00Z"),
                item("t3", "2024-03-01T10:10:00Z"),
            ]))),
            true,
        );
        f.store
            .connection()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_t2 BEFORE INSERT ON listens
                 WHEN (SELECT external_id FROM tracks WHERE id = NEW.track_id) = 't2'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let summary = f.runner.run("test", &CancellationToken::new());

        assert!(summary.is_success());
        assert_eq!(
            summary.counts,
            RunCounts {
                fetched: 3,
                inserted: 2,
                duplicates: 0,
                failed: 1
            }
        );
        let stats = f.store.database_stats().unwrap();
        assert_eq!((stats.tracks, stats.listens), (2, 2));
        assert_eq!(
            f.store.get_recent_runs(1).unwrap()[0].status,
            IngestionRunStatus::Completed
        );
    }

    #[test]
    fn test_full_database_aborts_remaining_events() {
        let mut oversized = item("t1", "2024-03-01T10:00:00Z");
        oversized["track"]["name"] = json!("x".repeat(64 * 1024));
        let f = fixture(
            MockSource::returning(Ok(page(vec![
                oversized,
                item("t2", "2024-03-01T10:05:00Z"),
            ]))),
            true,
        );
        {
            let conn = f.store.connection().unwrap();
            let pages: i64 = conn
                .query_row("PRAGMA page_count", [], |r| r.get(0))
                .unwrap();
            conn.execute_batch(&format!("PRAGMA max_page_count = {}", pages))
                .unwrap();
        }

        let summary = f.runner.run("test", &CancellationToken::new());

        assert!(!summary.is_success());
        assert_eq!(
            summary.counts,
            RunCounts {
                fetched: 2,
                inserted: 0,
                duplicates: 0,
                failed: 1
            }
        );
        let stats = f.store.database_stats().unwrap();
        assert_eq!((stats.tracks, stats.listens), (0, 0));
        let run = &f.store.get_recent_runs(1).unwrap()[0];
        assert_eq!(run.status, IngestionRunStatus::Failed);
        assert_eq!(run.counts, summary.counts);
    }
}
