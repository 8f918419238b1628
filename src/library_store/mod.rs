mod schema;
mod sqlite_library_store;

pub use schema::LIBRARY_VERSIONED_SCHEMAS;
pub use sqlite_library_store::SqliteLibraryStore;

use crate::artist::Artist;
use crate::bulk::{BulkJob, BulkJobItem};
use crate::rules::{PersistedViolation, Rule, ViolationStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub trait ArtistStore: Send + Sync {
    /// Artists sorted by name. Excluded artists are left out unless asked for.
    fn list_artists(&self, include_excluded: bool) -> Result<Vec<Artist>>;
    fn get_artist(&self, id: &str) -> Result<Option<Artist>>;
    /// Insert or replace the full artist row.
    fn save_artist(&self, artist: &Artist) -> Result<()>;
    fn update_health_score(&self, id: &str, score: f64) -> Result<()>;
}

pub trait RuleStore: Send + Sync {
    fn list_rules(&self) -> Result<Vec<Rule>>;
    fn get_rule(&self, id: &str) -> Result<Option<Rule>>;
    fn save_rule(&self, rule: &Rule) -> Result<()>;
    /// Deletes a user-created rule. Built-in rules are refused with an error.
    fn delete_rule(&self, id: &str) -> Result<bool>;
    /// Insert missing built-in rules. Existing rows are left untouched.
    /// Returns how many were inserted.
    fn seed_defaults(&self) -> Result<usize>;
}

pub trait ViolationStore: Send + Sync {
    /// Insert or update the row for `(rule_id, artist_id)` and return what
    /// was stored. A dismissed row stays dismissed unless the new status is
    /// `Resolved`.
    fn upsert_violation(&self, violation: &PersistedViolation) -> Result<PersistedViolation>;
    /// All rows, or only those with `status`, newest first.
    fn list_violations(&self, status: Option<ViolationStatus>) -> Result<Vec<PersistedViolation>>;
    fn list_violations_for_artist(&self, artist_id: &str) -> Result<Vec<PersistedViolation>>;
    fn get_violation(&self, id: &str) -> Result<Option<PersistedViolation>>;
    /// Returns false when no row has that id.
    fn set_violation_status(&self, id: &str, status: ViolationStatus) -> Result<bool>;
    /// Delete resolved and dismissed rows last touched before `before`.
    fn prune_closed_violations(&self, before: DateTime<Utc>) -> Result<usize>;
}

pub trait BulkJobStore: Send + Sync {
    fn create_bulk_job(&self, job: &BulkJob) -> Result<()>;
    fn update_bulk_job(&self, job: &BulkJob) -> Result<()>;
    fn get_bulk_job(&self, id: &str) -> Result<Option<BulkJob>>;
    fn list_bulk_jobs(&self, limit: usize) -> Result<Vec<BulkJob>>;
    fn add_bulk_job_item(&self, item: &BulkJobItem) -> Result<i64>;
    fn list_bulk_job_items(&self, job_id: &str) -> Result<Vec<BulkJobItem>>;
    /// Mark jobs left `pending` or `running` by a previous process as failed.
    fn fail_unfinished_bulk_jobs(&self, reason: &str) -> Result<usize>;
}

/// Handles to every library store, usually all backed by one SQLite file.
#[derive(Clone)]
pub struct LibraryStores {
    pub artists: Arc<dyn ArtistStore>,
    pub rules: Arc<dyn RuleStore>,
    pub violations: Arc<dyn ViolationStore>,
    pub bulk_jobs: Arc<dyn BulkJobStore>,
}

impl LibraryStores {
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ArtistStore + RuleStore + ViolationStore + BulkJobStore + 'static,
    {
        Self {
            artists: store.clone(),
            rules: store.clone(),
            violations: store.clone(),
            bulk_jobs: store,
        }
    }
}
