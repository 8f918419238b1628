//! Keeps the artist table in step with the library folder.

use crate::artist::scan_library;
use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule},
};
use crate::naming::NamingProfile;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Rescans the library on an interval and fires `OnLibraryScan` when
/// artists were added or changed.
pub struct LibraryScanJob {
    library_path: PathBuf,
    naming: NamingProfile,
    interval: Duration,
    hooks: mpsc::Sender<HookEvent>,
}

impl LibraryScanJob {
    pub fn new(
        library_path: PathBuf,
        naming: NamingProfile,
        interval: Duration,
        hooks: mpsc::Sender<HookEvent>,
    ) -> Self {
        Self {
            library_path,
            naming,
            interval,
            hooks,
        }
    }
}

#[async_trait]
impl BackgroundJob for LibraryScanJob {
    fn id(&self) -> &'static str {
        "library_scan"
    }

    fn name(&self) -> &'static str {
        "Library Scan"
    }

    fn description(&self) -> &'static str {
        "Discover artist folders and refresh their file presence flags"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    async fn execute(&self, ctx: &JobContext) -> Result<String, JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let library_path = self.library_path.clone();
        let naming = self.naming.clone();
        let artists = ctx.stores.artists.clone();
        let summary = tokio::task::spawn_blocking(move || {
            scan_library(&library_path, &naming, artists.as_ref())
        })
        .await
        .map_err(|e| JobError::ExecutionFailed(format!("Scan task failed: {}", e)))?
        .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        let line = format!(
            "{} added, {} updated, {} total",
            summary.added, summary.updated, summary.total
        );
        info!("Library scan: {}", line);

        if summary.added + summary.updated > 0 {
            if let Err(e) = self.hooks.send(HookEvent::OnLibraryScan).await {
                warn!("Could not notify scheduler of library changes: {}", e);
            }
        }
        Ok(line)
    }
}
