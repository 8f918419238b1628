//! SQLite schema definitions for the library database.
//!
//! Holds artists, rule configuration, the violation inbox, and bulk job
//! history.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, ForeignKey, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1
// =============================================================================

const ARTISTS_TABLE_V1: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("sort_name", &SqlType::Text, non_null = true),
        sqlite_column!("musicbrainz_id", &SqlType::Text),
        sqlite_column!("audiodb_id", &SqlType::Text),
        sqlite_column!("path", &SqlType::Text, non_null = true),
        sqlite_column!("nfo_exists", &SqlType::Integer, non_null = true),
        sqlite_column!("thumb_exists", &SqlType::Integer, non_null = true),
        sqlite_column!("fanart_exists", &SqlType::Integer, non_null = true),
        sqlite_column!("logo_exists", &SqlType::Integer, non_null = true),
        sqlite_column!("banner_exists", &SqlType::Integer, non_null = true),
        sqlite_column!("biography", &SqlType::Text, non_null = true),
        sqlite_column!("genres", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("formed", &SqlType::Text),
        sqlite_column!("disambiguation", &SqlType::Text),
        sqlite_column!("health_score", &SqlType::Real, non_null = true),
        sqlite_column!("is_excluded", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_artists_name", "name COLLATE NOCASE")],
    unique_constraints: &[],
};

const RULES_TABLE_V1: Table = Table {
    name: "rules",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text, non_null = true),
        sqlite_column!("category", &SqlType::Text, non_null = true),
        sqlite_column!("enabled", &SqlType::Integer, non_null = true),
        sqlite_column!("automation_mode", &SqlType::Text, non_null = true),
        sqlite_column!("config", &SqlType::Text, non_null = true), // JSON
        sqlite_column!("built_in", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const VIOLATIONS_TABLE_V1: Table = Table {
    name: "violations",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("rule_id", &SqlType::Text, non_null = true),
        sqlite_column!("artist_id", &SqlType::Text, non_null = true),
        sqlite_column!("artist_name", &SqlType::Text, non_null = true),
        sqlite_column!("severity", &SqlType::Text, non_null = true),
        sqlite_column!("message", &SqlType::Text, non_null = true),
        sqlite_column!("fixable", &SqlType::Integer, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("candidates", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
        sqlite_column!("dismissed_at", &SqlType::Text),
        sqlite_column!("resolved_at", &SqlType::Text),
    ],
    indices: &[
        ("idx_violations_status", "status"),
        ("idx_violations_artist", "artist_id"),
    ],
    unique_constraints: &[&["rule_id", "artist_id"]],
};

const BULK_JOBS_TABLE_V1: Table = Table {
    name: "bulk_jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("operation", &SqlType::Text, non_null = true),
        sqlite_column!("mode", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("total_items", &SqlType::Integer, non_null = true),
        sqlite_column!("processed_items", &SqlType::Integer, non_null = true),
        sqlite_column!("fixed_items", &SqlType::Integer, non_null = true),
        sqlite_column!("skipped_items", &SqlType::Integer, non_null = true),
        sqlite_column!("failed_items", &SqlType::Integer, non_null = true),
        sqlite_column!("artist_ids", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("started_at", &SqlType::Text),
        sqlite_column!("completed_at", &SqlType::Text),
    ],
    indices: &[("idx_bulk_jobs_created", "created_at DESC")],
    unique_constraints: &[],
};

const BULK_JOB_ITEMS_TABLE_V1: Table = Table {
    name: "bulk_job_items",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!(
            "job_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "bulk_jobs",
                foreign_column: "id",
            })
        ),
        sqlite_column!("artist_id", &SqlType::Text, non_null = true),
        sqlite_column!("artist_name", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("message", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_bulk_job_items_job", "job_id")],
    unique_constraints: &[],
};

pub static LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        ARTISTS_TABLE_V1,
        RULES_TABLE_V1,
        VIOLATIONS_TABLE_V1,
        BULK_JOBS_TABLE_V1,
        BULK_JOB_ITEMS_TABLE_V1,
    ],
    migration: None,
}];
