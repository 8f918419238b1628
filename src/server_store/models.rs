use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    Running,
    Completed,
    Failed,
    /// Stopped early by shutdown; the next run picks up the remaining work.
    Cancelled,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunStatus::Running => "running",
            JobRunStatus::Completed => "completed",
            JobRunStatus::Failed => "failed",
            JobRunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(JobRunStatus::Running),
            "completed" => Some(JobRunStatus::Completed),
            "failed" => Some(JobRunStatus::Failed),
            "cancelled" => Some(JobRunStatus::Cancelled),
            _ => None,
        }
    }
}

/// One execution of a background job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub id: i64,
    pub job_id: String,
    /// "schedule", "manual" or "hook:<event>".
    pub trigger: String,
    pub status: JobRunStatus,
    /// What the run did, e.g. "42 artists, 7 violations, 3/4 fixes".
    pub summary: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// How a run ended. Written once, when the job returns.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRunOutcome {
    pub status: JobRunStatus,
    pub summary: Option<String>,
    pub error: Option<String>,
}

impl JobRunOutcome {
    pub fn completed(summary: impl Into<String>) -> Self {
        Self {
            status: JobRunStatus::Completed,
            summary: Some(summary.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobRunStatus::Failed,
            summary: None,
            error: Some(error.into()),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: JobRunStatus::Cancelled,
            summary: None,
            error: None,
        }
    }
}

/// When an interval job is next due.
#[derive(Debug, Clone)]
pub struct JobScheduleState {
    pub job_id: String,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}
