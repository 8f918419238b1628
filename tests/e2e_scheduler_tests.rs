//! End-to-end tests for the background job scheduler driving compliance runs

mod common;

use catalog_auditor::artist::scan_library;
use catalog_auditor::background_jobs::jobs::RuleComplianceJob;
use catalog_auditor::background_jobs::{create_scheduler, JobContext, JobError, SchedulerHandle};
use catalog_auditor::naming::NamingProfile;
use catalog_auditor::rules::AutomationMode;
use catalog_auditor::server_store::{JobRunStatus, SqliteServerStore};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn wait_for_runs(handle: &SchedulerHandle, job_id: &str, count: usize) {
    for _ in 0..300 {
        let history = handle.get_job_history(job_id, 10).unwrap();
        let settled = history.len() >= count && history.iter().all(|r| r.status != JobRunStatus::Running);
        if settled && !handle.is_job_running(job_id).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} did not finish {} run(s)", job_id, count);
}

#[tokio::test]
async fn test_startup_compliance_run_and_manual_trigger() {
    let library = TestLibrary::with_rules(PRESENCE_RULES, AutomationMode::Auto);
    std::fs::create_dir_all(library.library_path.join(ARTIST_1_NAME)).unwrap();
    let summary = scan_library(
        &library.library_path,
        &NamingProfile::kodi(),
        library.stores.artists.as_ref(),
    )
    .unwrap();
    assert_eq!(summary.added, 1);

    let state_dir = tempfile::TempDir::new().unwrap();
    let server_store = Arc::new(SqliteServerStore::new(state_dir.path().join("server.db")).unwrap());
    let shutdown = CancellationToken::new();
    let (_hook_sender, hook_receiver) = mpsc::channel(8);
    let job_context = JobContext::new(
        shutdown.child_token(),
        library.stores.clone(),
        server_store.clone(),
    );
    let (mut scheduler, handle) =
        create_scheduler(server_store, hook_receiver, shutdown.clone(), job_context);

    let pipeline = Arc::new(library.pipeline(vec![]));
    scheduler
        .register_job(Arc::new(RuleComplianceJob::new(
            pipeline,
            Duration::from_secs(24 * 60 * 60),
        )))
        .await;
    let task = tokio::spawn(async move { scheduler.run().await });

    wait_for_runs(&handle, "rule_compliance", 1).await;
    let history = handle.get_job_history("rule_compliance", 10).unwrap();
    assert_eq!(history[0].status, JobRunStatus::Completed);
    assert_eq!(history[0].trigger, "hook:OnStartup");
    assert_eq!(
        history[0].summary.as_deref(),
        Some("1 artists, 6 violations, 0/0 fixes")
    );
    assert_eq!(
        library.stores.violations.list_violations(None).unwrap().len(),
        6
    );

    handle.trigger_job("rule_compliance").await.unwrap();
    wait_for_runs(&handle, "rule_compliance", 2).await;
    let history = handle.get_job_history("rule_compliance", 10).unwrap();
    assert_eq!(history[0].trigger, "manual");
    assert_eq!(
        library.stores.violations.list_violations(None).unwrap().len(),
        6
    );

    assert!(matches!(
        handle.trigger_job("no_such_job").await,
        Err(JobError::NotFound)
    ));

    shutdown.cancel();
    task.await.unwrap();
}
