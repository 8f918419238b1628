use super::job::{BackgroundJob, JobError, JobSchedule};
use crate::server_store::{JobRun, ServerStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// A registered job as shown by `serve` and by callers of the handle.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub schedule: JobScheduleInfo,
    pub is_running: bool,
    pub last_run: Option<JobRun>,
    /// `None` for hook-only jobs and interval jobs that never ran.
    pub next_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobScheduleInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub every_secs: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<String>,
}

impl From<&JobSchedule> for JobScheduleInfo {
    fn from(schedule: &JobSchedule) -> Self {
        let hooks = match schedule {
            JobSchedule::Interval(_) => Vec::new(),
            JobSchedule::Hook(event) => vec![event.to_string()],
            JobSchedule::Combined { hooks, .. } => hooks.iter().map(|h| h.to_string()).collect(),
        };
        Self {
            every_secs: schedule.interval().map(|d| d.as_secs()),
            hooks,
        }
    }
}

impl std::fmt::Display for JobScheduleInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(secs) = self.every_secs {
            parts.push(format!("every {}s", secs));
        }
        if !self.hooks.is_empty() {
            parts.push(format!("on {}", self.hooks.join(", ")));
        }
        write!(f, "{}", parts.join(", "))
    }
}

pub enum SchedulerCommand {
    TriggerJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
}

/// State shared between the scheduler loop and its handles.
#[derive(Default)]
pub struct SharedJobState {
    /// Filled at registration, read-only once the loop runs
    pub jobs: HashMap<String, Arc<dyn BackgroundJob>>,
    pub running_jobs: HashSet<String>,
}

/// Cloneable view onto a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    shared_state: Arc<RwLock<SharedJobState>>,
    server_store: Arc<dyn ServerStore>,
}

impl SchedulerHandle {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedJobState>>,
        server_store: Arc<dyn ServerStore>,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
            server_store,
        }
    }

    fn describe(&self, job: &dyn BackgroundJob, is_running: bool) -> Result<JobInfo> {
        let schedule = job.schedule();
        let next_run_at = match schedule.interval() {
            Some(_) => self
                .server_store
                .schedule_state(job.id())?
                .map(|s| s.next_run_at),
            None => None,
        };
        Ok(JobInfo {
            id: job.id().to_string(),
            name: job.name().to_string(),
            description: job.description().to_string(),
            schedule: JobScheduleInfo::from(&schedule),
            is_running,
            last_run: self.server_store.last_job_run(job.id())?,
            next_run_at,
        })
    }

    /// All registered jobs, sorted by id.
    pub async fn list_jobs(&self) -> Result<Vec<JobInfo>> {
        let state = self.shared_state.read().await;
        let mut jobs = state
            .jobs
            .values()
            .map(|job| self.describe(job.as_ref(), state.running_jobs.contains(job.id())))
            .collect::<Result<Vec<_>>>()?;
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobInfo>> {
        let state = self.shared_state.read().await;
        state
            .jobs
            .get(job_id)
            .map(|job| self.describe(job.as_ref(), state.running_jobs.contains(job_id)))
            .transpose()
    }

    /// Start a job now, outside its schedule.
    pub async fn trigger_job(&self, job_id: &str) -> Result<(), JobError> {
        let (response, response_rx) = oneshot::channel();
        self.command_tx
            .send(SchedulerCommand::TriggerJob {
                job_id: job_id.to_string(),
                response,
            })
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler is not running".to_string()))?;
        response_rx
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler stopped before answering".to_string()))?
    }

    /// Newest first.
    pub fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>> {
        self.server_store.job_runs(job_id, limit)
    }

    pub async fn is_job_running(&self, job_id: &str) -> bool {
        self.shared_state.read().await.running_jobs.contains(job_id)
    }
}
