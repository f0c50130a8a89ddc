//! Listen Tracker Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod background_jobs;
pub mod config;
pub mod ingestion;
pub mod listen_store;
pub mod spotify;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use ingestion::{CredentialProvider, IngestionRunner, RunSummary};
pub use listen_store::{CredentialStore, ListenStore, SqliteListenStore};
pub use spotify::{SpotifyClient, SpotifyClientConfig};
