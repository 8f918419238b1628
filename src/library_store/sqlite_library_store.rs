use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use super::{ArtistStore, BulkJobStore, RuleStore, ViolationStore};
use crate::artist::Artist;
use crate::bulk::{
    BulkItemStatus, BulkJob, BulkJobItem, BulkJobStatus, BulkOperation, ResolutionMode,
};
use crate::rules::{
    builtin_rules, is_builtin, normalize_candidates, AutomationMode, ImageCandidate,
    PersistedViolation, Rule, RuleCategory, RuleConfig, Severity, ViolationStatus,
};
use crate::sqlite_persistence::open_versioned;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub struct SqliteLibraryStore {
    conn: Arc<Mutex<Connection>>,
}

/// Fixed-width UTC timestamps so text comparison in SQL matches time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

const VIOLATION_COLUMNS: &str = "id, rule_id, artist_id, artist_name, severity, message, fixable, \
     status, candidates, created_at, updated_at, dismissed_at, resolved_at";

const BULK_JOB_COLUMNS: &str = "id, operation, mode, status, total_items, processed_items, \
     fixed_items, skipped_items, failed_items, artist_ids, error, created_at, started_at, \
     completed_at";

impl SqliteLibraryStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), LIBRARY_VERSIONED_SCHEMAS, "library")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_artist(row: &rusqlite::Row) -> rusqlite::Result<Artist> {
        let genres_json: String = row.get("genres")?;
        let path: String = row.get("path")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(Artist {
            id: row.get("id")?,
            name: row.get("name")?,
            sort_name: row.get("sort_name")?,
            musicbrainz_id: row.get("musicbrainz_id")?,
            audiodb_id: row.get("audiodb_id")?,
            path: PathBuf::from(path),
            nfo_exists: row.get("nfo_exists")?,
            thumb_exists: row.get("thumb_exists")?,
            fanart_exists: row.get("fanart_exists")?,
            logo_exists: row.get("logo_exists")?,
            banner_exists: row.get("banner_exists")?,
            biography: row.get("biography")?,
            genres: serde_json::from_str(&genres_json).unwrap_or_default(),
            formed: row.get("formed")?,
            disambiguation: row.get("disambiguation")?,
            health_score: row.get("health_score")?,
            is_excluded: row.get("is_excluded")?,
            updated_at: parse_datetime(&updated_at),
        })
    }

    fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<Rule> {
        let category: String = row.get("category")?;
        let mode: String = row.get("automation_mode")?;
        let config_json: String = row.get("config")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(Rule {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            category: RuleCategory::parse(&category).unwrap_or(RuleCategory::Metadata),
            enabled: row.get("enabled")?,
            automation_mode: AutomationMode::parse(&mode).unwrap_or(AutomationMode::Manual),
            config: serde_json::from_str::<RuleConfig>(&config_json).unwrap_or_default(),
            built_in: row.get("built_in")?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }

    fn row_to_violation(row: &rusqlite::Row) -> rusqlite::Result<PersistedViolation> {
        let severity: String = row.get("severity")?;
        let status: String = row.get("status")?;
        let candidates_json: String = row.get("candidates")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(PersistedViolation {
            id: row.get("id")?,
            rule_id: row.get("rule_id")?,
            artist_id: row.get("artist_id")?,
            artist_name: row.get("artist_name")?,
            severity: Severity::parse(&severity).unwrap_or(Severity::Warning),
            message: row.get("message")?,
            fixable: row.get("fixable")?,
            status: ViolationStatus::parse(&status).unwrap_or(ViolationStatus::Open),
            candidates: serde_json::from_str::<Vec<ImageCandidate>>(&candidates_json)
                .unwrap_or_default(),
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
            dismissed_at: parse_optional_datetime(row.get("dismissed_at")?),
            resolved_at: parse_optional_datetime(row.get("resolved_at")?),
        })
    }

    fn row_to_bulk_job(row: &rusqlite::Row) -> rusqlite::Result<BulkJob> {
        let operation: String = row.get("operation")?;
        let mode: String = row.get("mode")?;
        let status: String = row.get("status")?;
        let artist_ids: String = row.get("artist_ids")?;
        let created_at: String = row.get("created_at")?;
        let count = |name: &str| -> rusqlite::Result<usize> {
            let value: i64 = row.get(name)?;
            Ok(value.max(0) as usize)
        };
        Ok(BulkJob {
            id: row.get("id")?,
            operation: BulkOperation::parse(&operation).unwrap_or(BulkOperation::FetchMetadata),
            mode: ResolutionMode::parse(&mode).unwrap_or(ResolutionMode::Manual),
            status: BulkJobStatus::parse(&status).unwrap_or(BulkJobStatus::Failed),
            total_items: count("total_items")?,
            processed_items: count("processed_items")?,
            fixed_items: count("fixed_items")?,
            skipped_items: count("skipped_items")?,
            failed_items: count("failed_items")?,
            artist_ids: serde_json::from_str(&artist_ids).unwrap_or_default(),
            error: row.get("error")?,
            created_at: parse_datetime(&created_at),
            started_at: parse_optional_datetime(row.get("started_at")?),
            completed_at: parse_optional_datetime(row.get("completed_at")?),
        })
    }

    fn row_to_bulk_job_item(row: &rusqlite::Row) -> rusqlite::Result<BulkJobItem> {
        let status: String = row.get("status")?;
        let created_at: String = row.get("created_at")?;
        Ok(BulkJobItem {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            artist_id: row.get("artist_id")?,
            artist_name: row.get("artist_name")?,
            status: BulkItemStatus::parse(&status).unwrap_or(BulkItemStatus::Failed),
            message: row.get("message")?,
            created_at: parse_datetime(&created_at),
        })
    }

    fn insert_rule(conn: &Connection, rule: &Rule) -> Result<()> {
        conn.execute(
            "INSERT INTO rules (id, name, description, category, enabled, automation_mode, \
             config, built_in, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                rule.id,
                rule.name,
                rule.description,
                rule.category.as_str(),
                rule.enabled,
                rule.automation_mode.as_str(),
                serde_json::to_string(&rule.config)?,
                rule.built_in,
                format_datetime(&rule.created_at),
                format_datetime(&rule.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_violation_by_key(
        conn: &Connection,
        rule_id: &str,
        artist_id: &str,
    ) -> Result<Option<PersistedViolation>> {
        let sql = format!(
            "SELECT {} FROM violations WHERE rule_id = ?1 AND artist_id = ?2",
            VIOLATION_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![rule_id, artist_id], Self::row_to_violation)
            .optional()?)
    }
}

impl ArtistStore for SqliteLibraryStore {
    fn list_artists(&self, include_excluded: bool) -> Result<Vec<Artist>> {
        let conn = self.conn.lock().unwrap();
        let sql = if include_excluded {
            "SELECT * FROM artists ORDER BY name COLLATE NOCASE, id"
        } else {
            "SELECT * FROM artists WHERE is_excluded = 0 ORDER BY name COLLATE NOCASE, id"
        };
        let mut stmt = conn.prepare(sql)?;
        let artists = stmt
            .query_map([], Self::row_to_artist)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list artists")?;
        Ok(artists)
    }

    fn get_artist(&self, id: &str) -> Result<Option<Artist>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT * FROM artists WHERE id = ?1",
                params![id],
                Self::row_to_artist,
            )
            .optional()?)
    }

    fn save_artist(&self, artist: &Artist) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO artists (id, name, sort_name, musicbrainz_id, audiodb_id, path, \
             nfo_exists, thumb_exists, fanart_exists, logo_exists, banner_exists, biography, \
             genres, formed, disambiguation, health_score, is_excluded, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18) \
             ON CONFLICT(id) DO UPDATE SET \
                name = excluded.name, sort_name = excluded.sort_name, \
                musicbrainz_id = excluded.musicbrainz_id, audiodb_id = excluded.audiodb_id, \
                path = excluded.path, nfo_exists = excluded.nfo_exists, \
                thumb_exists = excluded.thumb_exists, fanart_exists = excluded.fanart_exists, \
                logo_exists = excluded.logo_exists, banner_exists = excluded.banner_exists, \
                biography = excluded.biography, genres = excluded.genres, \
                formed = excluded.formed, disambiguation = excluded.disambiguation, \
                health_score = excluded.health_score, is_excluded = excluded.is_excluded, \
                updated_at = excluded.updated_at",
            params![
                artist.id,
                artist.name,
                artist.sort_name,
                artist.musicbrainz_id,
                artist.audiodb_id,
                artist.path.to_string_lossy(),
                artist.nfo_exists,
                artist.thumb_exists,
                artist.fanart_exists,
                artist.logo_exists,
                artist.banner_exists,
                artist.biography,
                serde_json::to_string(&artist.genres)?,
                artist.formed,
                artist.disambiguation,
                artist.health_score,
                artist.is_excluded,
                format_datetime(&artist.updated_at),
            ],
        )
        .with_context(|| format!("Failed to save artist {}", artist.id))?;
        Ok(())
    }

    fn update_health_score(&self, id: &str, score: f64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE artists SET health_score = ?1 WHERE id = ?2",
            params![score, id],
        )?;
        if updated == 0 {
            bail!("Artist {} not found", id);
        }
        Ok(())
    }
}

impl RuleStore for SqliteLibraryStore {
    fn list_rules(&self) -> Result<Vec<Rule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM rules ORDER BY rowid")?;
        let rules = stmt
            .query_map([], Self::row_to_rule)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rules)
    }

    fn get_rule(&self, id: &str) -> Result<Option<Rule>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT * FROM rules WHERE id = ?1",
                params![id],
                Self::row_to_rule,
            )
            .optional()?)
    }

    fn save_rule(&self, rule: &Rule) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE rules SET name = ?2, description = ?3, category = ?4, enabled = ?5, \
             automation_mode = ?6, config = ?7, updated_at = ?8 WHERE id = ?1",
            params![
                rule.id,
                rule.name,
                rule.description,
                rule.category.as_str(),
                rule.enabled,
                rule.automation_mode.as_str(),
                serde_json::to_string(&rule.config)?,
                format_datetime(&rule.updated_at),
            ],
        )?;
        if updated == 0 {
            Self::insert_rule(&conn, rule)?;
        }
        Ok(())
    }

    fn delete_rule(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let built_in: Option<bool> = conn
            .query_row(
                "SELECT built_in FROM rules WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match built_in {
            None => Ok(false),
            Some(true) => bail!("Rule {} is built in and cannot be deleted", id),
            Some(false) if is_builtin(id) => {
                bail!("Rule {} is built in and cannot be deleted", id)
            }
            Some(false) => {
                conn.execute("DELETE FROM rules WHERE id = ?1", params![id])?;
                Ok(true)
            }
        }
    }

    fn seed_defaults(&self) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for rule in builtin_rules() {
            let exists: bool = tx
                .query_row(
                    "SELECT 1 FROM rules WHERE id = ?1",
                    params![rule.id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if !exists {
                Self::insert_rule(&tx, &rule)?;
                inserted += 1;
            }
        }
        tx.commit()?;
        if inserted > 0 {
            info!("Seeded {} built-in rules", inserted);
        }
        Ok(inserted)
    }
}

impl ViolationStore for SqliteLibraryStore {
    fn upsert_violation(&self, violation: &PersistedViolation) -> Result<PersistedViolation> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let (status, candidates) =
            normalize_candidates(violation.status, violation.candidates.clone());

        let existing = Self::get_violation_by_key(&conn, &violation.rule_id, &violation.artist_id)?;

        let stored = match existing {
            Some(existing) => {
                let keep_dismissed = existing.status == ViolationStatus::Dismissed
                    && status != ViolationStatus::Resolved;
                let (status, candidates, dismissed_at) = if keep_dismissed {
                    (ViolationStatus::Dismissed, Vec::new(), existing.dismissed_at)
                } else {
                    (status, candidates, None)
                };
                let resolved_at = match (status, existing.status) {
                    (ViolationStatus::Resolved, ViolationStatus::Resolved) => {
                        existing.resolved_at.or(Some(now))
                    }
                    (ViolationStatus::Resolved, _) => Some(now),
                    _ => None,
                };
                PersistedViolation {
                    id: existing.id,
                    rule_id: existing.rule_id,
                    artist_id: existing.artist_id,
                    artist_name: violation.artist_name.clone(),
                    severity: violation.severity,
                    message: violation.message.clone(),
                    fixable: violation.fixable,
                    status,
                    candidates,
                    created_at: existing.created_at,
                    updated_at: now,
                    dismissed_at,
                    resolved_at,
                }
            }
            None => PersistedViolation {
                status,
                candidates,
                resolved_at: if status == ViolationStatus::Resolved {
                    Some(violation.resolved_at.unwrap_or(now))
                } else {
                    None
                },
                dismissed_at: if status == ViolationStatus::Dismissed {
                    Some(violation.dismissed_at.unwrap_or(now))
                } else {
                    None
                },
                updated_at: now,
                ..violation.clone()
            },
        };

        conn.execute(
            "INSERT INTO violations (id, rule_id, artist_id, artist_name, severity, message, \
             fixable, status, candidates, created_at, updated_at, dismissed_at, resolved_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
             ON CONFLICT(rule_id, artist_id) DO UPDATE SET \
                artist_name = excluded.artist_name, severity = excluded.severity, \
                message = excluded.message, fixable = excluded.fixable, \
                status = excluded.status, candidates = excluded.candidates, \
                updated_at = excluded.updated_at, dismissed_at = excluded.dismissed_at, \
                resolved_at = excluded.resolved_at",
            params![
                stored.id,
                stored.rule_id,
                stored.artist_id,
                stored.artist_name,
                stored.severity.as_str(),
                stored.message,
                stored.fixable,
                stored.status.as_str(),
                serde_json::to_string(&stored.candidates)?,
                format_datetime(&stored.created_at),
                format_datetime(&stored.updated_at),
                stored.dismissed_at.as_ref().map(format_datetime),
                stored.resolved_at.as_ref().map(format_datetime),
            ],
        )
        .with_context(|| {
            format!(
                "Failed to upsert violation {} for artist {}",
                stored.rule_id, stored.artist_id
            )
        })?;

        debug!(
            "Violation {}/{} stored as {}",
            stored.rule_id,
            stored.artist_id,
            stored.status.as_str()
        );
        Ok(stored)
    }

    fn list_violations(&self, status: Option<ViolationStatus>) -> Result<Vec<PersistedViolation>> {
        let conn = self.conn.lock().unwrap();
        let violations = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM violations WHERE status = ?1 ORDER BY updated_at DESC",
                    VIOLATION_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![status.as_str()], Self::row_to_violation)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM violations ORDER BY updated_at DESC",
                    VIOLATION_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], Self::row_to_violation)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(violations)
    }

    fn list_violations_for_artist(&self, artist_id: &str) -> Result<Vec<PersistedViolation>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM violations WHERE artist_id = ?1 ORDER BY rule_id",
            VIOLATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![artist_id], Self::row_to_violation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn get_violation(&self, id: &str) -> Result<Option<PersistedViolation>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM violations WHERE id = ?1", VIOLATION_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_violation)
            .optional()?)
    }

    fn set_violation_status(&self, id: &str, status: ViolationStatus) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let now = format_datetime(&Utc::now());
        let updated = match status {
            ViolationStatus::PendingChoice => {
                let candidates: Option<String> = conn
                    .query_row(
                        "SELECT candidates FROM violations WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(candidates) = candidates else {
                    return Ok(false);
                };
                let parsed: Vec<ImageCandidate> =
                    serde_json::from_str(&candidates).unwrap_or_default();
                if parsed.is_empty() {
                    bail!("Violation {} has no candidates to choose from", id);
                }
                conn.execute(
                    "UPDATE violations SET status = ?2, updated_at = ?3, dismissed_at = NULL, \
                     resolved_at = NULL WHERE id = ?1",
                    params![id, status.as_str(), now],
                )?
            }
            ViolationStatus::Open => conn.execute(
                "UPDATE violations SET status = ?2, candidates = '[]', updated_at = ?3, \
                 dismissed_at = NULL, resolved_at = NULL WHERE id = ?1",
                params![id, status.as_str(), now],
            )?,
            ViolationStatus::Dismissed => conn.execute(
                "UPDATE violations SET status = ?2, candidates = '[]', updated_at = ?3, \
                 dismissed_at = ?3, resolved_at = NULL WHERE id = ?1",
                params![id, status.as_str(), now],
            )?,
            ViolationStatus::Resolved => conn.execute(
                "UPDATE violations SET status = ?2, candidates = '[]', updated_at = ?3, \
                 resolved_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), now],
            )?,
        };
        Ok(updated > 0)
    }

    fn prune_closed_violations(&self, before: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM violations WHERE status IN ('resolved', 'dismissed') AND updated_at < ?1",
            params![format_datetime(&before)],
        )?;
        Ok(deleted)
    }
}

impl BulkJobStore for SqliteLibraryStore {
    fn create_bulk_job(&self, job: &BulkJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO bulk_jobs ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                BULK_JOB_COLUMNS
            ),
            params![
                job.id,
                job.operation.as_str(),
                job.mode.as_str(),
                job.status.as_str(),
                job.total_items as i64,
                job.processed_items as i64,
                job.fixed_items as i64,
                job.skipped_items as i64,
                job.failed_items as i64,
                serde_json::to_string(&job.artist_ids)?,
                job.error,
                format_datetime(&job.created_at),
                job.started_at.as_ref().map(format_datetime),
                job.completed_at.as_ref().map(format_datetime),
            ],
        )
        .with_context(|| format!("Failed to create bulk job {}", job.id))?;
        Ok(())
    }

    fn update_bulk_job(&self, job: &BulkJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE bulk_jobs SET status = ?2, total_items = ?3, processed_items = ?4, \
             fixed_items = ?5, skipped_items = ?6, failed_items = ?7, error = ?8, \
             started_at = ?9, completed_at = ?10 WHERE id = ?1",
            params![
                job.id,
                job.status.as_str(),
                job.total_items as i64,
                job.processed_items as i64,
                job.fixed_items as i64,
                job.skipped_items as i64,
                job.failed_items as i64,
                job.error,
                job.started_at.as_ref().map(format_datetime),
                job.completed_at.as_ref().map(format_datetime),
            ],
        )?;
        if updated == 0 {
            bail!("Bulk job {} not found", job.id);
        }
        Ok(())
    }

    fn get_bulk_job(&self, id: &str) -> Result<Option<BulkJob>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM bulk_jobs WHERE id = ?1", BULK_JOB_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_bulk_job)
            .optional()?)
    }

    fn list_bulk_jobs(&self, limit: usize) -> Result<Vec<BulkJob>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM bulk_jobs ORDER BY created_at DESC LIMIT ?1",
            BULK_JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![limit as i64], Self::row_to_bulk_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn add_bulk_job_item(&self, item: &BulkJobItem) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO bulk_job_items (job_id, artist_id, artist_name, status, message, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.job_id,
                item.artist_id,
                item.artist_name,
                item.status.as_str(),
                item.message,
                format_datetime(&item.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_bulk_job_items(&self, job_id: &str) -> Result<Vec<BulkJobItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, job_id, artist_id, artist_name, status, message, created_at \
             FROM bulk_job_items WHERE job_id = ?1 ORDER BY id",
        )?;
        let items = stmt
            .query_map(params![job_id], Self::row_to_bulk_job_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn fail_unfinished_bulk_jobs(&self, reason: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE bulk_jobs SET status = 'failed', error = ?1, completed_at = ?2 \
             WHERE status IN ('pending', 'running')",
            params![reason, format_datetime(&Utc::now())],
        )?;
        Ok(updated)
    }
}
