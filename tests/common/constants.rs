//! Shared constants for end-to-end tests
//!
//! When upstream test data changes (ids, timestamps), update only this file.

// ============================================================================
// Upstream catalog IDs
// ============================================================================

/// Artist "The Test Band"
pub const ARTIST_1_ID: &str = "artist-1";

/// Artist "Jazz Ensemble", featured on track 2
pub const ARTIST_2_ID: &str = "artist-2";

/// Album "First Album" by The Test Band
pub const ALBUM_1_ID: &str = "album-1";

/// "Opening Track" on First Album
pub const TRACK_1_ID: &str = "track-1";

/// "Second Song" on First Album, featuring Jazz Ensemble
pub const TRACK_2_ID: &str = "track-2";

/// "Closing Time" on First Album
pub const TRACK_3_ID: &str = "track-3";

// ============================================================================
// Play timestamps
// ============================================================================

pub const PLAYED_AT_1: &str = "2024-03-01T10:00:00.000Z";
pub const PLAYED_AT_2: &str = "2024-03-01T10:04:00.000Z";
pub const PLAYED_AT_3: &str = "2024-03-01T10:09:30.000Z";
