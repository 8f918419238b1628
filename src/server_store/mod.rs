//! Scheduler bookkeeping, kept in `server.db` apart from the library data.

mod models;
mod schema;
mod sqlite_server_store;

pub use models::*;
pub use schema::SERVER_VERSIONED_SCHEMAS;
pub use sqlite_server_store::SqliteServerStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

pub trait ServerStore: Send + Sync {
    /// Open a run in `running` state and return its id.
    fn start_job_run(&self, job_id: &str, trigger: &str) -> Result<i64>;
    fn finish_job_run(&self, run_id: i64, outcome: &JobRunOutcome) -> Result<()>;
    fn running_job_runs(&self) -> Result<Vec<JobRun>>;
    /// Newest first.
    fn job_runs(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>>;
    fn last_job_run(&self, job_id: &str) -> Result<Option<JobRun>>;
    /// Close runs a previous process left open. Returns how many there were.
    fn fail_interrupted_runs(&self) -> Result<usize>;
    /// Delete finished runs that started before `before`.
    fn prune_job_runs(&self, before: DateTime<Utc>) -> Result<usize>;

    fn schedule_state(&self, job_id: &str) -> Result<Option<JobScheduleState>>;
    fn save_schedule_state(&self, state: &JobScheduleState) -> Result<()>;
}
