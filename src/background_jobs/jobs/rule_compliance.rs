//! Periodic full compliance pass over the library.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule, ShutdownBehavior},
};
use crate::pipeline::{Pipeline, PipelineError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Runs every enabled rule against every artist, at startup, after a
/// library scan and then on a fixed interval.
pub struct RuleComplianceJob {
    pipeline: Arc<Pipeline>,
    interval: Duration,
}

impl RuleComplianceJob {
    pub fn new(pipeline: Arc<Pipeline>, interval: Duration) -> Self {
        Self { pipeline, interval }
    }
}

#[async_trait]
impl BackgroundJob for RuleComplianceJob {
    fn id(&self) -> &'static str {
        "rule_compliance"
    }

    fn name(&self) -> &'static str {
        "Rule Compliance"
    }

    fn description(&self) -> &'static str {
        "Evaluate all rules across the library and apply automatic fixes"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Combined {
            interval: Some(self.interval),
            hooks: vec![HookEvent::OnStartup, HookEvent::OnLibraryScan],
        }
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        // Stops between artists; the next run picks up the rest.
        ShutdownBehavior::Cancellable
    }

    async fn execute(&self, ctx: &JobContext) -> Result<String, JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let result = self
            .pipeline
            .run_all(&ctx.cancellation_token)
            .await
            .map_err(|e: PipelineError| JobError::ExecutionFailed(e.to_string()))?;

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let summary = format!(
            "{} artists, {} violations, {}/{} fixes",
            result.artists_processed,
            result.violations_found,
            result.fixes_succeeded,
            result.fixes_attempted
        );
        info!("Compliance pass: {}", summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artist::Artist;
    use crate::events::NoOpEventBus;
    use crate::fixers::FixerSet;
    use crate::library_store::{LibraryStores, SqliteLibraryStore};
    use crate::naming::NamingProfile;
    use crate::rules::{builtin_rules, Engine, ViolationStatus};
    use crate::server_store::SqliteServerStore;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn setup() -> (RuleComplianceJob, JobContext, TempDir) {
        let dir = TempDir::new().unwrap();
        let library = Arc::new(SqliteLibraryStore::new(dir.path().join("library.db")).unwrap());
        let stores = LibraryStores::from_store(library);
        for mut rule in builtin_rules() {
            rule.enabled = rule.id == "nfo_exists";
            stores.rules.save_rule(&rule).unwrap();
        }

        let artist_dir = dir.path().join("Alpha");
        std::fs::create_dir_all(&artist_dir).unwrap();
        stores
            .artists
            .save_artist(&Artist::new("alpha", "Alpha", artist_dir))
            .unwrap();

        let engine = Arc::new(Engine::new(stores.rules.clone(), NamingProfile::kodi()));
        let pipeline = Arc::new(Pipeline::new(
            engine,
            stores.clone(),
            FixerSet::new(vec![]),
            Arc::new(NoOpEventBus),
        ));
        let server_store = Arc::new(SqliteServerStore::new(dir.path().join("server.db")).unwrap());
        let ctx = JobContext::new(CancellationToken::new(), stores, server_store);
        (
            RuleComplianceJob::new(pipeline, Duration::from_secs(24 * 60 * 60)),
            ctx,
            dir,
        )
    }

    #[test]
    fn test_job_metadata() {
        let (job, _ctx, _dir) = setup();
        assert_eq!(job.id(), "rule_compliance");
        let schedule = job.schedule();
        assert_eq!(schedule.interval(), Some(Duration::from_secs(86400)));
        assert!(schedule.listens_to(HookEvent::OnStartup));
        assert!(schedule.listens_to(HookEvent::OnLibraryScan));
    }

    #[tokio::test]
    async fn test_execute_records_violations() {
        let (job, ctx, _dir) = setup();
        let summary = job.execute(&ctx).await.unwrap();
        assert_eq!(summary, "1 artists, 1 violations, 0/0 fixes");

        let open = ctx
            .stores
            .violations
            .list_violations(Some(ViolationStatus::Open))
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].rule_id, "nfo_exists");
        assert_eq!(open[0].artist_id, "alpha");
    }

    #[tokio::test]
    async fn test_execute_cancelled() {
        let (job, ctx, _dir) = setup();
        ctx.cancellation_token.cancel();
        assert!(matches!(job.execute(&ctx).await, Err(JobError::Cancelled)));
        assert!(ctx.stores.violations.list_violations(None).unwrap().is_empty());
    }
}
