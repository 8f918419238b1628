use super::models::{JobRun, JobRunOutcome, JobRunStatus, JobScheduleState};
use super::schema::SERVER_VERSIONED_SCHEMAS;
use super::ServerStore;
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

const INTERRUPTED: &str = "Interrupted by restart";

const RUN_COLUMNS: &str =
    "id, job_id, triggered_by, status, summary, error, started_at, finished_at";

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<JobRun> {
    let status: String = row.get("status")?;
    let started_at: String = row.get("started_at")?;
    let finished_at: Option<String> = row.get("finished_at")?;
    Ok(JobRun {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        trigger: row.get("triggered_by")?,
        // Unknown statuses only come from a newer binary; treat them as failed.
        status: JobRunStatus::parse(&status).unwrap_or(JobRunStatus::Failed),
        summary: row.get("summary")?,
        error: row.get("error")?,
        started_at: parse_datetime(&started_at),
        finished_at: finished_at.as_deref().map(parse_datetime),
    })
}

/// Job history and schedule state in `server.db`.
pub struct SqliteServerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteServerStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), SERVER_VERSIONED_SCHEMAS, "server")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Newest first. SQLite reads a negative limit as "no limit".
    fn select_runs<P: Params>(
        &self,
        filter: &str,
        params: P,
        limit: Option<usize>,
    ) -> Result<Vec<JobRun>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM job_runs {} ORDER BY started_at DESC, id DESC LIMIT {}",
            RUN_COLUMNS,
            filter,
            limit.map_or(-1, |l| l as i64)
        );
        let mut stmt = conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params, row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }
}

impl ServerStore for SqliteServerStore {
    fn start_job_run(&self, job_id: &str, trigger: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_runs (job_id, triggered_by, status, started_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                job_id,
                trigger,
                JobRunStatus::Running.as_str(),
                format_datetime(&Utc::now())
            ],
        )
        .with_context(|| format!("Failed to record start of job {}", job_id))?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_job_run(&self, run_id: i64, outcome: &JobRunOutcome) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE job_runs SET status = ?1, summary = ?2, error = ?3, finished_at = ?4 \
             WHERE id = ?5",
            params![
                outcome.status.as_str(),
                outcome.summary,
                outcome.error,
                format_datetime(&Utc::now()),
                run_id
            ],
        )?;
        if updated == 0 {
            debug!("Job run {} vanished before it finished", run_id);
        }
        Ok(())
    }

    fn running_job_runs(&self) -> Result<Vec<JobRun>> {
        self.select_runs(
            "WHERE status = ?1",
            params![JobRunStatus::Running.as_str()],
            None,
        )
    }

    fn job_runs(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>> {
        self.select_runs("WHERE job_id = ?1", params![job_id], Some(limit))
    }

    fn last_job_run(&self, job_id: &str) -> Result<Option<JobRun>> {
        Ok(self.job_runs(job_id, 1)?.into_iter().next())
    }

    fn fail_interrupted_runs(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE job_runs SET status = ?1, error = ?2, finished_at = ?3 WHERE status = ?4",
            params![
                JobRunStatus::Failed.as_str(),
                INTERRUPTED,
                format_datetime(&Utc::now()),
                JobRunStatus::Running.as_str()
            ],
        )?;
        Ok(count)
    }

    fn prune_job_runs(&self, before: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "DELETE FROM job_runs WHERE status != ?1 AND started_at < ?2",
            params![JobRunStatus::Running.as_str(), format_datetime(&before)],
        )?;
        Ok(count)
    }

    fn schedule_state(&self, job_id: &str) -> Result<Option<JobScheduleState>> {
        let conn = self.conn.lock().unwrap();
        let state = conn
            .query_row(
                "SELECT next_run_at, last_run_at FROM job_schedules WHERE job_id = ?1",
                params![job_id],
                |row| {
                    let next_run_at: String = row.get(0)?;
                    let last_run_at: Option<String> = row.get(1)?;
                    Ok(JobScheduleState {
                        job_id: job_id.to_string(),
                        next_run_at: parse_datetime(&next_run_at),
                        last_run_at: last_run_at.as_deref().map(parse_datetime),
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    fn save_schedule_state(&self, state: &JobScheduleState) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        // A start-of-run update carries no last_run_at; keep the previous one.
        conn.execute(
            "INSERT INTO job_schedules (job_id, next_run_at, last_run_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(job_id) DO UPDATE SET next_run_at = excluded.next_run_at, \
                last_run_at = COALESCE(excluded.last_run_at, job_schedules.last_run_at)",
            params![
                state.job_id,
                format_datetime(&state.next_run_at),
                state.last_run_at.as_ref().map(format_datetime)
            ],
        )?;
        Ok(())
    }
}
