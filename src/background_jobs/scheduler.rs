use super::context::JobContext;
use super::handle::{SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, HookEvent, JobError, RunTrigger, ShutdownBehavior};
use crate::server_store::{JobRunOutcome, JobScheduleState, ServerStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on how long the loop sleeps without re-checking schedules.
const MAX_IDLE: Duration = Duration::from_secs(60);

/// How long shutdown waits for each running job.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

struct RunningJob {
    task: JoinHandle<()>,
    token: CancellationToken,
}

/// Owns the registered jobs and runs them on schedule, on hooks and on
/// demand. Use [`create_scheduler`] to get one together with its handle.
pub struct JobScheduler {
    shared_state: Arc<RwLock<SharedJobState>>,
    /// Only touched by the loop.
    running: HashMap<String, RunningJob>,
    server_store: Arc<dyn ServerStore>,
    hooks: mpsc::Receiver<HookEvent>,
    commands: mpsc::Receiver<SchedulerCommand>,
    shutdown_token: CancellationToken,
    job_context: JobContext,
}

impl JobScheduler {
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        info!("Registering job {}: {}", job.id(), job.description());
        self.shared_state
            .write()
            .await
            .jobs
            .insert(job.id().to_string(), job);
    }

    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main loop. Returns once the shutdown token is cancelled and running
    /// jobs have wound down.
    pub async fn run(&mut self) {
        info!("Job scheduler started with {} jobs", self.job_count().await);

        match self.server_store.fail_interrupted_runs() {
            Ok(0) => {}
            Ok(count) => warn!("{} job runs were interrupted by the last shutdown", count),
            Err(e) => error!("Failed to close interrupted job runs: {}", e),
        }

        self.on_hook(HookEvent::OnStartup).await;

        loop {
            self.reap_finished().await;
            let idle = self.idle_time().await;
            debug!("Scheduler idle for {:?}", idle);

            tokio::select! {
                _ = tokio::time::sleep(idle) => self.run_due_jobs().await,
                Some(event) = self.hooks.recv() => {
                    debug!("Hook fired: {}", event);
                    self.on_hook(event).await;
                }
                Some(command) = self.commands.recv() => self.on_command(command).await,
                _ = self.shutdown_token.cancelled() => {
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    async fn on_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_now(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    async fn trigger_now(&mut self, job_id: &str) -> Result<(), JobError> {
        {
            let state = self.shared_state.read().await;
            if !state.jobs.contains_key(job_id) {
                return Err(JobError::NotFound);
            }
            if state.running_jobs.contains(job_id) {
                return Err(JobError::AlreadyRunning);
            }
        }
        self.spawn_job(job_id, RunTrigger::Manual).await;
        Ok(())
    }

    /// Jobs that are idle and satisfy `pred`, in id order.
    async fn idle_jobs(&self, pred: impl Fn(&str, &dyn BackgroundJob) -> bool) -> Vec<String> {
        let state = self.shared_state.read().await;
        let mut ids: Vec<String> = state
            .jobs
            .iter()
            .filter(|(id, _)| !state.running_jobs.contains(*id))
            .filter(|(id, job)| pred(id, job.as_ref()))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    async fn idle_time(&self) -> Duration {
        let now = Utc::now();
        let state = self.shared_state.read().await;
        state
            .jobs
            .iter()
            .filter(|(id, _)| !state.running_jobs.contains(*id))
            .filter_map(|(id, job)| self.next_run_at(id, job.as_ref()))
            .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO))
            .fold(MAX_IDLE, Duration::min)
    }

    /// `None` for hook-only jobs. Interval jobs with no persisted state are
    /// due immediately.
    fn next_run_at(&self, job_id: &str, job: &dyn BackgroundJob) -> Option<DateTime<Utc>> {
        job.schedule().interval()?;
        match self.server_store.schedule_state(job_id) {
            Ok(state) => Some(state.map_or_else(Utc::now, |s| s.next_run_at)),
            Err(e) => {
                warn!("Cannot read schedule of {}: {}", job_id, e);
                None
            }
        }
    }

    async fn run_due_jobs(&mut self) {
        let now = Utc::now();
        let due = self
            .idle_jobs(|id, job| self.next_run_at(id, job).is_some_and(|next| next <= now))
            .await;
        for job_id in due {
            self.spawn_job(&job_id, RunTrigger::Schedule).await;
        }
    }

    async fn on_hook(&mut self, event: HookEvent) {
        let listeners = self
            .idle_jobs(|_, job| job.schedule().listens_to(event))
            .await;
        for job_id in listeners {
            self.spawn_job(&job_id, RunTrigger::Hook(event)).await;
        }
    }

    /// Push `next_run_at` one interval ahead. Done when a run starts and
    /// again when it ends, so a slow job is not re-spawned in a tight loop.
    fn advance_schedule(&self, job: &dyn BackgroundJob, finished: bool) {
        let Some(interval) = job.schedule().interval() else {
            return;
        };
        let now = Utc::now();
        let state = JobScheduleState {
            job_id: job.id().to_string(),
            next_run_at: now + chrono::Duration::from_std(interval).unwrap_or_default(),
            last_run_at: finished.then_some(now),
        };
        if let Err(e) = self.server_store.save_schedule_state(&state) {
            warn!("Cannot save schedule of {}: {}", job.id(), e);
        }
    }

    async fn spawn_job(&mut self, job_id: &str, trigger: RunTrigger) {
        let Some(job) = self.shared_state.read().await.jobs.get(job_id).cloned() else {
            error!("No job registered as {}", job_id);
            return;
        };

        let run_id = match self.server_store.start_job_run(job_id, &trigger.to_string()) {
            Ok(id) => id,
            Err(e) => {
                error!("Not starting {}, run could not be recorded: {}", job_id, e);
                return;
            }
        };
        info!("Job {} started (run {}, {})", job_id, run_id, trigger);

        self.shared_state
            .write()
            .await
            .running_jobs
            .insert(job_id.to_string());
        self.advance_schedule(job.as_ref(), false);

        let token = self.shutdown_token.child_token();
        let ctx = self.job_context.with_token(token.clone());
        let server_store = Arc::clone(&self.server_store);
        let shared_state = Arc::clone(&self.shared_state);

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match job.execute(&ctx).await {
                Ok(summary) => {
                    info!("Job {} done in {:?}: {}", job.id(), started.elapsed(), summary);
                    JobRunOutcome::completed(summary)
                }
                Err(JobError::Cancelled) => {
                    info!("Job {} cancelled after {:?}", job.id(), started.elapsed());
                    JobRunOutcome::cancelled()
                }
                Err(e) => {
                    error!("Job {} failed after {:?}: {}", job.id(), started.elapsed(), e);
                    JobRunOutcome::failed(e.to_string())
                }
            };
            if let Err(e) = server_store.finish_job_run(run_id, &outcome) {
                error!("Cannot record end of run {}: {}", run_id, e);
            }
            shared_state.write().await.running_jobs.remove(job.id());
        });

        self.running
            .insert(job_id.to_string(), RunningJob { task, token });
    }

    async fn reap_finished(&mut self) {
        let finished: Vec<String> = self
            .running
            .iter()
            .filter(|(_, running)| running.task.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        for job_id in finished {
            let Some(running) = self.running.remove(&job_id) else {
                continue;
            };
            if let Err(e) = running.task.await {
                error!("Job {} panicked: {}", job_id, e);
                self.shared_state.write().await.running_jobs.remove(&job_id);
            }
            let job = self.shared_state.read().await.jobs.get(&job_id).cloned();
            if let Some(job) = job {
                self.advance_schedule(job.as_ref(), true);
            }
        }
    }

    /// Every job gets the same grace period to return.
    async fn shutdown(&mut self) {
        info!("Scheduler shutting down, {} jobs running", self.running.len());

        let running: Vec<(String, RunningJob)> = self.running.drain().collect();
        let state = self.shared_state.read().await;
        for (job_id, job) in &running {
            let waits = state
                .jobs
                .get(job_id)
                .is_some_and(|j| j.shutdown_behavior() == ShutdownBehavior::WaitForCompletion);
            if waits {
                info!("Waiting for {} to finish its current unit of work", job_id);
            } else {
                job.token.cancel();
            }
        }
        drop(state);

        for (job_id, job) in running {
            if tokio::time::timeout(SHUTDOWN_GRACE, job.task).await.is_err() {
                warn!("Job {} did not stop within {:?}", job_id, SHUTDOWN_GRACE);
            }
        }
    }
}

/// Create a scheduler and its handle.
///
/// Per-job tokens are children of `shutdown_token`, so cancelling it stops
/// the loop and signals every cancellable job at once. Jobs marked
/// [`ShutdownBehavior::WaitForCompletion`] are expected to ignore their token
/// and finish their unit of work within the grace period.
pub fn create_scheduler(
    server_store: Arc<dyn ServerStore>,
    hook_receiver: mpsc::Receiver<HookEvent>,
    shutdown_token: CancellationToken,
    job_context: JobContext,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));

    let handle = SchedulerHandle::new(
        command_tx,
        Arc::clone(&shared_state),
        Arc::clone(&server_store),
    );
    let scheduler = JobScheduler {
        shared_state,
        running: HashMap::new(),
        server_store,
        hooks: hook_receiver,
        commands: command_rx,
        shutdown_token,
        job_context,
    };

    (scheduler, handle)
}
