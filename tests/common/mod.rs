//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{album_session, TestHarness};
//!
//! #[test]
//! fn test_ingest() {
//!     let harness = TestHarness::authorized();
//!     harness.source.push_page(album_session());
//!
//!     let summary = harness.run();
//!     assert_eq!(summary.counts.inserted, 3);
//! }
//! ```

mod constants;
mod fixtures;

pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{album_session, play_event, CountingTokenEndpoint, ScriptedSource};

use chrono::{Duration, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use listen_tracker::ingestion::{CredentialProvider, IngestionRunner, RunSummary};
use listen_tracker::listen_store::{Credential, CredentialStore, SqliteListenStore};

/// A listen database in a temp dir wired to a scripted upstream.
pub struct TestHarness {
    pub store: Arc<SqliteListenStore>,
    pub source: Arc<ScriptedSource>,
    pub endpoint: Arc<CountingTokenEndpoint>,
    pub credentials: Arc<CredentialProvider>,
    pub runner: IngestionRunner,
    _temp_dir: TempDir,
}

impl TestHarness {
    /// Harness without any stored credential.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteListenStore::new(temp_dir.path().join("listens.db"))
                .expect("Failed to open listen store"),
        );
        let source = Arc::new(ScriptedSource::new());
        let endpoint = Arc::new(CountingTokenEndpoint::new());
        let credentials = Arc::new(CredentialProvider::new(store.clone(), endpoint.clone()));
        let runner = IngestionRunner::new(store.clone(), credentials.clone(), source.clone(), 50);
        Self {
            store,
            source,
            endpoint,
            credentials,
            runner,
            _temp_dir: temp_dir,
        }
    }

    /// Harness with a credential valid for another hour.
    pub fn authorized() -> Self {
        let harness = Self::new();
        harness.store_credential(Duration::hours(1));
        harness
    }

    pub fn store_credential(&self, valid_for: Duration) {
        self.store
            .save_credential(&Credential {
                access_token: "stored-access".to_string(),
                refresh_token: "stored-refresh".to_string(),
                token_type: "Bearer".to_string(),
                expires_at: Utc::now() + valid_for,
            })
            .expect("Failed to store credential");
    }

    pub fn run(&self) -> RunSummary {
        self.runner.run("test", &CancellationToken::new())
    }

    /// Number of rows in a table, read straight from the database.
    pub fn count_rows(&self, table: &str) -> i64 {
        let conn = self.store.connection().expect("Failed to lock connection");
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .expect("Failed to count rows")
    }
}
