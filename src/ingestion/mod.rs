//! Recently-played ingestion pipeline.
//!
//! A run obtains a valid token, fetches one page of recently played items and
//! normalizes each item into artists, albums, tracks and a listen. Every item
//! is committed in its own transaction; a duplicate `(track, played_at)` is
//! rolled back and counted, a malformed item is rolled back and skipped.

mod credentials;
mod dates;
mod error;
mod images;
mod normalizer;
mod resolver;
mod runner;

pub use credentials::{CredentialProvider, CredentialStatus, DEFAULT_REFRESH_MARGIN_SECS};
pub use dates::{normalize_release_date, parse_release_date};
pub use error::IngestionError;
pub use images::select_images;
pub use normalizer::{normalize_event, parse_played_at, stage_listen};
pub use resolver::{resolve_album, resolve_artist, resolve_track, CacheStats, EntityCache};
pub use runner::{IngestionRunner, RunSummary, MAX_PAGE_SIZE};
