//! Shared constants for integration tests
//!
//! When test data changes (artist IDs, rule selections, etc.),
//! update only this file.

// ============================================================================
// Test Library
// ============================================================================

/// Artist ID for "The Test Band"
pub const ARTIST_1_ID: &str = "artist-1";

/// Artist name for ARTIST_1_ID
pub const ARTIST_1_NAME: &str = "The Test Band";

/// Artist ID for "Jazz Ensemble"
pub const ARTIST_2_ID: &str = "artist-2";

/// Artist name for ARTIST_2_ID
pub const ARTIST_2_NAME: &str = "Jazz Ensemble";

/// MusicBrainz ID handed to artists that need image lookups
pub const TEST_MBID: &str = "5b11f4ce-a62d-471e-81fc-a69a8278c7da";

// ============================================================================
// Rule Selections
// ============================================================================

/// One presence-style check per artifact an artist folder can carry
pub const PRESENCE_RULES: &[&str] = &[
    "nfo_exists",
    "nfo_has_mbid",
    "thumb_exists",
    "fanart_exists",
    "logo_exists",
    "bio_exists",
];
