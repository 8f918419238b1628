use super::models::{
    BulkItemStatus, BulkJob, BulkJobItem, BulkJobStatus, BulkOperation, BulkRequest,
    ResolutionMode,
};
use crate::artist::{Artist, ImageType};
use crate::events::{Event, EventBus};
use crate::fixers::{apply_metadata, FixContext, Fixer};
use crate::library_store::LibraryStores;
use crate::provider::{select_hit, MetadataOrchestrator};
use crate::rules::{RuleCategory, RuleConfig, Severity, Violation};
use anyhow::Result;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum BulkError {
    #[error("Bulk job {0} is already running")]
    AlreadyRunning(String),
    #[error("No bulk job is running")]
    NotRunning,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct BulkExecutorSettings {
    /// Persist job counters after this many processed items.
    pub progress_every: usize,
}

impl Default for BulkExecutorSettings {
    fn default() -> Self {
        Self { progress_every: 10 }
    }
}

struct ActiveJob {
    job_id: String,
    cancel: CancellationToken,
}

type ActiveSlot = Arc<Mutex<Option<ActiveJob>>>;

/// Clears the active slot when the job task ends, however it ends.
struct ActiveJobGuard {
    slot: ActiveSlot,
    job_id: String,
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap();
        if slot.as_ref().is_some_and(|a| a.job_id == self.job_id) {
            *slot = None;
        }
    }
}

struct Worker {
    stores: LibraryStores,
    orchestrator: Arc<MetadataOrchestrator>,
    image_fixer: Option<Arc<dyn Fixer>>,
    events: Arc<dyn EventBus>,
    progress_every: usize,
}

/// Runs bulk metadata and image backfills in the background. At most one
/// job runs at a time.
pub struct BulkExecutor {
    worker: Arc<Worker>,
    active: ActiveSlot,
}

impl BulkExecutor {
    pub fn new(
        stores: LibraryStores,
        orchestrator: Arc<MetadataOrchestrator>,
        image_fixer: Option<Arc<dyn Fixer>>,
        events: Arc<dyn EventBus>,
        settings: BulkExecutorSettings,
    ) -> Self {
        Self {
            worker: Arc::new(Worker {
                stores,
                orchestrator,
                image_fixer,
                events,
                progress_every: settings.progress_every.max(1),
            }),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Mark jobs a previous process left unfinished as failed.
    pub fn recover_stale(&self) -> Result<usize> {
        let count = self
            .worker
            .stores
            .bulk_jobs
            .fail_unfinished_bulk_jobs("Interrupted by restart")?;
        if count > 0 {
            warn!("Marked {} interrupted bulk job(s) as failed", count);
        }
        Ok(count)
    }

    pub fn start(&self, request: BulkRequest) -> Result<BulkJob, BulkError> {
        self.spawn(request).map(|(job, _)| job)
    }

    /// Like `start`, also handing back the task so callers can wait for it.
    pub fn spawn(&self, request: BulkRequest) -> Result<(BulkJob, JoinHandle<()>), BulkError> {
        let mut slot = self.active.lock().unwrap();
        if let Some(active) = slot.as_ref() {
            return Err(BulkError::AlreadyRunning(active.job_id.clone()));
        }

        let job = BulkJob::new(request.operation, request.mode, request.artist_ids);
        self.worker.stores.bulk_jobs.create_bulk_job(&job)?;
        let cancel = CancellationToken::new();
        *slot = Some(ActiveJob {
            job_id: job.id.clone(),
            cancel: cancel.clone(),
        });
        drop(slot);

        info!(
            "Starting bulk job {} ({}, {})",
            job.id,
            job.operation.as_str(),
            job.mode.as_str()
        );
        let guard = ActiveJobGuard {
            slot: self.active.clone(),
            job_id: job.id.clone(),
        };
        let worker = self.worker.clone();
        let task_job = job.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            worker.run(task_job, cancel).await;
        });
        Ok((job, handle))
    }

    pub fn cancel(&self) -> Result<(), BulkError> {
        let slot = self.active.lock().unwrap();
        match slot.as_ref() {
            Some(active) => {
                info!("Cancelling bulk job {}", active.job_id);
                active.cancel.cancel();
                Ok(())
            }
            None => Err(BulkError::NotRunning),
        }
    }

    pub fn current_job_id(&self) -> Option<String> {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .map(|a| a.job_id.clone())
    }
}

impl Worker {
    async fn run(&self, mut job: BulkJob, cancel: CancellationToken) {
        job.status = BulkJobStatus::Running;
        job.started_at = Some(Utc::now());
        if let Err(e) = self.stores.bulk_jobs.update_bulk_job(&job) {
            self.fail(&mut job, e);
            return;
        }

        let targets = match self.targets(&job) {
            Ok(targets) => targets,
            Err(e) => {
                self.fail(&mut job, e);
                return;
            }
        };
        job.total_items = targets.len();
        if let Err(e) = self.stores.bulk_jobs.update_bulk_job(&job) {
            self.fail(&mut job, e);
            return;
        }

        if let Some(fixer) = &self.image_fixer {
            fixer.begin_pass();
        }
        let ctx = FixContext::new(cancel.clone());
        for mut artist in targets {
            if cancel.is_cancelled() {
                info!(
                    "Bulk job {} cancelled after {} of {} items",
                    job.id, job.processed_items, job.total_items
                );
                self.finish(&mut job, BulkJobStatus::Canceled, None);
                return;
            }

            let (status, message) = match job.operation {
                BulkOperation::FetchMetadata => self.fetch_metadata(&ctx, &mut artist, job.mode).await,
                BulkOperation::FetchImages => self.fetch_images(&ctx, &mut artist, job.mode).await,
            };
            debug!("{}: {} ({})", artist.name, status.as_str(), message);

            let item = BulkJobItem {
                id: 0,
                job_id: job.id.clone(),
                artist_id: artist.id.clone(),
                artist_name: artist.name.clone(),
                status,
                message,
                created_at: Utc::now(),
            };
            if let Err(e) = self.stores.bulk_jobs.add_bulk_job_item(&item) {
                self.fail(&mut job, e);
                return;
            }
            job.record(status);

            if job.processed_items % self.progress_every == 0 {
                if let Err(e) = self.stores.bulk_jobs.update_bulk_job(&job) {
                    self.fail(&mut job, e);
                    return;
                }
            }
        }

        self.finish(&mut job, BulkJobStatus::Completed, None);
    }

    fn targets(&self, job: &BulkJob) -> Result<Vec<Artist>> {
        if job.artist_ids.is_empty() {
            return self.stores.artists.list_artists(false);
        }
        let mut artists = Vec::with_capacity(job.artist_ids.len());
        for id in &job.artist_ids {
            match self.stores.artists.get_artist(id)? {
                Some(artist) => artists.push(artist),
                None => warn!("Bulk job {}: artist {} not found, skipping", job.id, id),
            }
        }
        Ok(artists)
    }

    fn finish(&self, job: &mut BulkJob, status: BulkJobStatus, error: Option<String>) {
        job.finish(status, error);
        if let Err(e) = self.stores.bulk_jobs.update_bulk_job(job) {
            error!("Failed to record end of bulk job {}: {:#}", job.id, e);
        }
        info!(
            "Bulk job {} {}: {} processed, {} fixed, {} skipped, {} failed",
            job.id,
            status.as_str(),
            job.processed_items,
            job.fixed_items,
            job.skipped_items,
            job.failed_items
        );
        self.events.publish(Event::BulkJobFinished {
            job_id: job.id.clone(),
            status,
            processed: job.processed_items,
            fixed: job.fixed_items,
            skipped: job.skipped_items,
            failed: job.failed_items,
        });
    }

    fn fail(&self, job: &mut BulkJob, err: anyhow::Error) {
        error!("Bulk job {} failed: {:#}", job.id, err);
        self.finish(job, BulkJobStatus::Failed, Some(format!("{:#}", err)));
    }

    async fn fetch_metadata(
        &self,
        ctx: &FixContext,
        artist: &mut Artist,
        mode: ResolutionMode,
    ) -> (BulkItemStatus, String) {
        let has_bio = !artist.biography.trim().is_empty();
        if artist.mbid().is_some() && has_bio && !artist.genres.is_empty() {
            return (BulkItemStatus::Skipped, "Metadata already complete".to_string());
        }

        let mut changed = Vec::new();
        if artist.mbid().is_none() {
            let hits = match self.orchestrator.search(&artist.name, &ctx.cancel).await {
                Ok(hits) => hits,
                Err(e) => return (BulkItemStatus::Failed, format!("Search failed: {:#}", e)),
            };
            let Some(hit) = select_hit(&hits, mode) else {
                return (
                    BulkItemStatus::Skipped,
                    format!(
                        "No match accepted in {} mode ({} result(s))",
                        mode.as_str(),
                        hits.len()
                    ),
                );
            };
            artist.musicbrainz_id = Some(hit.musicbrainz_id.clone());
            artist.touch();
            changed.push("musicbrainz_id");
        }

        let mbid = artist.mbid().unwrap_or_default().to_string();
        let fetched = self
            .orchestrator
            .fetch_metadata(&mbid, &artist.name, &ctx.cancel)
            .await;
        let fetch_error = match fetched {
            Ok(metadata) => {
                changed.extend(apply_metadata(artist, metadata));
                None
            }
            Err(e) => Some(format!("{:#}", e)),
        };

        if changed.is_empty() {
            return match fetch_error {
                Some(e) => (BulkItemStatus::Failed, format!("Metadata fetch failed: {}", e)),
                None => (BulkItemStatus::Skipped, "Providers had nothing new".to_string()),
            };
        }
        if let Err(e) = self.stores.artists.save_artist(artist) {
            return (BulkItemStatus::Failed, format!("Failed to save artist: {:#}", e));
        }
        let mut message = format!("Updated {}", changed.join(", "));
        if let Some(e) = fetch_error {
            message.push_str(&format!("; metadata fetch failed: {}", e));
        }
        (BulkItemStatus::Fixed, message)
    }

    async fn fetch_images(
        &self,
        ctx: &FixContext,
        artist: &mut Artist,
        mode: ResolutionMode,
    ) -> (BulkItemStatus, String) {
        if artist.mbid().is_none() {
            return (BulkItemStatus::Skipped, "No MusicBrainz ID".to_string());
        }
        let Some(fixer) = &self.image_fixer else {
            return (
                BulkItemStatus::Skipped,
                "No image provider configured".to_string(),
            );
        };
        let missing = artist.missing_images();
        if missing.is_empty() {
            return (BulkItemStatus::Skipped, "All images present".to_string());
        }

        let mut written: Vec<ImageType> = Vec::new();
        let mut offered = 0;
        let mut errors = Vec::new();
        for image_type in missing {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let violation = missing_image_violation(image_type, mode);
            match fixer.fix(ctx, artist, &violation).await {
                Ok(result) if result.fixed => written.push(image_type),
                Ok(result) => offered += result.candidates.len(),
                Err(e) => errors.push(format!("{}: {:#}", image_type, e)),
            }
        }

        if !written.is_empty() {
            if let Err(e) = self.stores.artists.save_artist(artist) {
                return (BulkItemStatus::Failed, format!("Failed to save artist: {:#}", e));
            }
            let names: Vec<&str> = written.iter().map(|t| t.as_str()).collect();
            return (BulkItemStatus::Fixed, format!("Saved {}", names.join(", ")));
        }
        if !errors.is_empty() && offered == 0 {
            return (BulkItemStatus::Failed, errors.join("; "));
        }
        (
            BulkItemStatus::Skipped,
            format!("{} candidate(s) found, none applied", offered),
        )
    }
}

/// Synthetic `<type>_exists` violation handed to the image fixer. Only
/// `yolo` picks among several candidates and `manual` never writes.
fn missing_image_violation(image_type: ImageType, mode: ResolutionMode) -> Violation {
    Violation {
        rule_id: format!("{}_exists", image_type),
        rule_name: format!("{} exists", image_type),
        category: RuleCategory::Image,
        severity: Severity::Info,
        message: format!("Missing {}", image_type),
        fixable: true,
        config: RuleConfig {
            auto_select_best: mode == ResolutionMode::Yolo,
            discovery_only: mode == ResolutionMode::Manual,
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoOpEventBus;
    use crate::library_store::{ArtistStore, BulkJobStore, SqliteLibraryStore};
    use crate::provider::{ArtistMetadata, ArtistSearchHit, MetadataProvider};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Search blocks until cancelled, holding the job in `running`.
    struct Stuck;

    #[async_trait]
    impl MetadataProvider for Stuck {
        fn name(&self) -> &'static str {
            "stuck"
        }

        async fn search(&self, _: &str, cancel: &CancellationToken) -> Result<Vec<ArtistSearchHit>> {
            cancel.cancelled().await;
            Ok(Vec::new())
        }

        async fn fetch_metadata(
            &self,
            _: &str,
            _: &str,
            _: &CancellationToken,
        ) -> Result<ArtistMetadata> {
            Ok(ArtistMetadata::default())
        }
    }

    struct Generous;

    #[async_trait]
    impl MetadataProvider for Generous {
        fn name(&self) -> &'static str {
            "generous"
        }

        async fn search(&self, name: &str, _: &CancellationToken) -> Result<Vec<ArtistSearchHit>> {
            Ok(vec![ArtistSearchHit {
                musicbrainz_id: format!("mbid-{}", name.to_lowercase()),
                name: name.to_string(),
                disambiguation: None,
                score: 70,
            }])
        }

        async fn fetch_metadata(
            &self,
            _: &str,
            _: &str,
            _: &CancellationToken,
        ) -> Result<ArtistMetadata> {
            Ok(ArtistMetadata {
                biography: Some("Some biography text".to_string()),
                genres: vec!["rock".to_string()],
                ..Default::default()
            })
        }
    }

    fn executor(
        provider: Arc<dyn MetadataProvider>,
        progress_every: usize,
    ) -> (BulkExecutor, Arc<SqliteLibraryStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteLibraryStore::new(dir.path().join("library.db")).unwrap());
        let executor = BulkExecutor::new(
            LibraryStores::from_store(store.clone()),
            Arc::new(MetadataOrchestrator::new(vec![provider])),
            None,
            Arc::new(NoOpEventBus),
            BulkExecutorSettings { progress_every },
        );
        (executor, store, dir)
    }

    fn request(mode: ResolutionMode) -> BulkRequest {
        BulkRequest {
            operation: BulkOperation::FetchMetadata,
            mode,
            artist_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_cancel_without_job_errors() {
        let (executor, _store, _dir) = executor(Arc::new(Generous), 10);
        assert!(matches!(executor.cancel(), Err(BulkError::NotRunning)));
        assert!(executor.current_job_id().is_none());
    }

    #[tokio::test]
    async fn test_second_start_conflicts_then_cancel() {
        let (executor, store, _dir) = executor(Arc::new(Stuck), 10);
        store.save_artist(&Artist::new("a1", "Alpha", "/m/Alpha")).unwrap();
        store.save_artist(&Artist::new("b1", "Beta", "/m/Beta")).unwrap();

        let (job, handle) = executor.spawn(request(ResolutionMode::Yolo)).unwrap();
        assert_eq!(executor.current_job_id().as_deref(), Some(job.id.as_str()));

        let err = executor.start(request(ResolutionMode::Manual)).unwrap_err();
        assert!(matches!(err, BulkError::AlreadyRunning(ref id) if *id == job.id));
        assert_eq!(store.list_bulk_jobs(10).unwrap().len(), 1);
        let running = store.get_bulk_job(&job.id).unwrap().unwrap();
        assert!(!running.status.is_terminal());

        executor.cancel().unwrap();
        handle.await.unwrap();
        assert!(executor.current_job_id().is_none());
        // the search in flight for Alpha returns empty, then the loop sees
        // the cancel before Beta
        let finished = store.get_bulk_job(&job.id).unwrap().unwrap();
        assert_eq!(finished.status, BulkJobStatus::Canceled);
        assert_eq!(finished.processed_items, 1);
        assert!(finished.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_modes_control_assignment() {
        let (executor, store, _dir) = executor(Arc::new(Generous), 1);
        store.save_artist(&Artist::new("a1", "Alpha", "/m/Alpha")).unwrap();
        store.save_artist(&Artist::new("b1", "Beta", "/m/Beta")).unwrap();

        let (job, handle) = executor.spawn(request(ResolutionMode::Manual)).unwrap();
        handle.await.unwrap();
        let done = store.get_bulk_job(&job.id).unwrap().unwrap();
        assert_eq!(done.status, BulkJobStatus::Completed);
        assert_eq!(done.total_items, 2);
        assert_eq!(done.skipped_items, 2);
        assert!(store.get_artist("a1").unwrap().unwrap().musicbrainz_id.is_none());

        // a weak hit is only accepted in yolo mode
        let (job, handle) = executor.spawn(request(ResolutionMode::Yolo)).unwrap();
        handle.await.unwrap();
        let done = store.get_bulk_job(&job.id).unwrap().unwrap();
        assert_eq!(done.fixed_items, 2);
        let alpha = store.get_artist("a1").unwrap().unwrap();
        assert_eq!(alpha.mbid(), Some("mbid-alpha"));
        assert_eq!(alpha.genres, vec!["rock".to_string()]);

        let items = store.list_bulk_job_items(&job.id).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.status == BulkItemStatus::Fixed));

        // everything is populated now
        let (job, handle) = executor.spawn(request(ResolutionMode::Yolo)).unwrap();
        handle.await.unwrap();
        let done = store.get_bulk_job(&job.id).unwrap().unwrap();
        assert_eq!(done.skipped_items, 2);
    }

    #[tokio::test]
    async fn test_recover_stale_marks_running_jobs_failed() {
        let (executor, store, _dir) = executor(Arc::new(Generous), 10);
        let mut job = BulkJob::new(BulkOperation::FetchImages, ResolutionMode::Yolo, vec![]);
        job.status = BulkJobStatus::Running;
        store.create_bulk_job(&job).unwrap();

        assert_eq!(executor.recover_stale().unwrap(), 1);
        let job = store.get_bulk_job(&job.id).unwrap().unwrap();
        assert_eq!(job.status, BulkJobStatus::Failed);
    }
}
