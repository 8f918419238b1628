//! Retention for closed violations and scheduler history.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::info;

/// Deletes resolved and dismissed violations, and finished job runs, once
/// they are older than the retention period.
pub struct ViolationCleanupJob {
    retention_days: u64,
}

impl ViolationCleanupJob {
    pub fn new(retention_days: u64) -> Self {
        Self { retention_days }
    }

    /// Retention periods too long to represent keep everything.
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.retention_days)
            .ok()
            .and_then(chrono::Duration::try_days)
            .and_then(|retention| now.checked_sub_signed(retention))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[async_trait]
impl BackgroundJob for ViolationCleanupJob {
    fn id(&self) -> &'static str {
        "violation_cleanup"
    }

    fn name(&self) -> &'static str {
        "Violation Cleanup"
    }

    fn description(&self) -> &'static str {
        "Delete closed violations and job history past the retention period"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(Duration::from_secs(24 * 60 * 60))
    }

    async fn execute(&self, ctx: &JobContext) -> Result<String, JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let cutoff = self.cutoff(Utc::now());
        info!(
            "Cleaning up violations closed before {} ({} day retention)",
            cutoff.to_rfc3339(),
            self.retention_days
        );

        let violations = ctx
            .stores
            .violations
            .prune_closed_violations(cutoff)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        let runs = ctx
            .server_store
            .prune_job_runs(cutoff)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        let summary = format!("Deleted {} violations and {} job runs", violations, runs);
        info!("{}", summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_store::{LibraryStores, SqliteLibraryStore};
    use crate::rules::{
        PersistedViolation, RuleCategory, RuleConfig, Severity, Violation, ViolationStatus,
    };
    use crate::server_store::{JobRunOutcome, ServerStore, SqliteServerStore};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn violation(rule_id: &str) -> Violation {
        Violation {
            rule_id: rule_id.to_string(),
            rule_name: rule_id.to_string(),
            category: RuleCategory::Nfo,
            severity: Severity::Error,
            message: "missing".to_string(),
            fixable: true,
            config: RuleConfig::default(),
        }
    }

    #[test]
    fn test_retention_cutoff() {
        let job = ViolationCleanupJob::new(30);
        let now = Utc::now();
        assert_eq!(now - job.cutoff(now), chrono::Duration::days(30));
    }

    #[test]
    fn test_huge_retention_keeps_everything() {
        let now = Utc::now();
        for days in [u64::MAX, i64::MAX as u64, 200_000_000_000, 100_000_000] {
            let cutoff = ViolationCleanupJob::new(days).cutoff(now);
            assert_eq!(cutoff, DateTime::<Utc>::UNIX_EPOCH, "{} days", days);
        }
    }

    #[tokio::test]
    async fn test_execute_prunes_only_closed_rows() {
        let dir = TempDir::new().unwrap();
        let library = Arc::new(SqliteLibraryStore::new(dir.path().join("library.db")).unwrap());
        let server_store = Arc::new(SqliteServerStore::new(dir.path().join("server.db")).unwrap());
        let stores = LibraryStores::from_store(library);

        stores
            .violations
            .upsert_violation(&PersistedViolation::new(
                &violation("nfo_exists"),
                "a1",
                "Alpha",
                ViolationStatus::Open,
                vec![],
            ))
            .unwrap();
        stores
            .violations
            .upsert_violation(&PersistedViolation::new(
                &violation("nfo_has_mbid"),
                "a1",
                "Alpha",
                ViolationStatus::Resolved,
                vec![],
            ))
            .unwrap();
        let run = server_store.start_job_run("rule_compliance", "schedule").unwrap();
        server_store
            .finish_job_run(run, &JobRunOutcome::completed("1 artists"))
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let ctx = JobContext::new(CancellationToken::new(), stores.clone(), server_store.clone());
        let summary = ViolationCleanupJob::new(0).execute(&ctx).await.unwrap();
        assert_eq!(summary, "Deleted 1 violations and 1 job runs");

        let remaining = stores.violations.list_violations(None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].rule_id, "nfo_exists");
        assert!(server_store.last_job_run("rule_compliance").unwrap().is_none());
    }
}
