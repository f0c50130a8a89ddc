use chrono::{DateTime, NaiveDate, Utc};

// =============================================================================
// Catalog entities
// =============================================================================

/// Small/medium/large cover art URLs. Any of them may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageUrls {
    pub small: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
}

impl ImageUrls {
    pub fn is_empty(&self) -> bool {
        self.small.is_none() && self.medium.is_none() && self.large.is_none()
    }
}

/// How much of an album's release date is actually known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePrecision {
    Year,
    Day,
    Unknown,
}

impl DatePrecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePrecision::Year => "year",
            DatePrecision::Day => "day",
            DatePrecision::Unknown => "unknown",
        }
    }

    /// Anything other than the two supported tags maps to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "year" => DatePrecision::Year,
            "day" => DatePrecision::Day,
            _ => DatePrecision::Unknown,
        }
    }
}

/// Closed set of entity kinds the resolver knows how to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Artist,
    Album,
    Track,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Album => "album",
            EntityKind::Track => "track",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artist {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub images: ImageUrls,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub release_date: Option<NaiveDate>,
    pub release_date_precision: DatePrecision,
    pub album_type: Option<String>,
    pub total_tracks: Option<i64>,
    pub images: ImageUrls,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    /// Whole seconds.
    pub duration: i64,
    pub images: ImageUrls,
}

/// Attribute values applied only when an artist row is created.
#[derive(Debug, Clone, Default)]
pub struct ArtistDefaults {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AlbumDefaults {
    pub name: String,
    pub release_date: Option<NaiveDate>,
    pub release_date_precision: DatePrecision,
    pub album_type: Option<String>,
    pub total_tracks: Option<i64>,
    pub images: ImageUrls,
}

#[derive(Debug, Clone, Default)]
pub struct TrackDefaults {
    pub name: String,
    pub duration: i64,
    pub images: ImageUrls,
}

/// Any resolved entity, used as the value type of the per-run cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRecord {
    Artist(Artist),
    Album(Album),
    Track(Track),
}

// =============================================================================
// Listens
// =============================================================================

/// A listen ready to be inserted. Built by the normalizer, written by the runner's transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewListen {
    pub track_id: i64,
    pub played_at: DateTime<Utc>,
    pub context_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listen {
    pub id: i64,
    pub track_id: i64,
    pub played_at: DateTime<Utc>,
    pub context_type: Option<String>,
}

/// A committed listen joined to its track, album and artists.
#[derive(Debug, Clone)]
pub struct ListenWithTrack {
    pub listen: Listen,
    pub track: Track,
    pub albums: Vec<Album>,
    pub artists: Vec<Artist>,
}

// =============================================================================
// Credential
// =============================================================================

/// The singleton upstream credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Ingestion runs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionRunStatus {
    Running,
    Completed,
    Failed,
}

impl IngestionRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionRunStatus::Running => "running",
            IngestionRunStatus::Completed => "completed",
            IngestionRunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(IngestionRunStatus::Running),
            "completed" => Some(IngestionRunStatus::Completed),
            "failed" => Some(IngestionRunStatus::Failed),
            _ => None,
        }
    }
}

/// Per-run outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct IngestionRun {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: IngestionRunStatus,
    pub triggered_by: String,
    pub counts: RunCounts,
    pub error: Option<String>,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
    pub listens: usize,
}
