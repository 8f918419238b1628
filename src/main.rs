use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use catalog_auditor::artist::scan_library;
use catalog_auditor::background_jobs::jobs::{
    LibraryScanJob, RuleComplianceJob, ViolationCleanupJob,
};
use catalog_auditor::background_jobs::{create_scheduler, JobContext};
use catalog_auditor::bulk::{
    BulkExecutor, BulkExecutorSettings, BulkJobStatus, BulkOperation, BulkRequest, ResolutionMode,
};
use catalog_auditor::config::{AppConfig, CliConfig, FileConfig};
use catalog_auditor::events::{BroadcastEventBus, Event, EventBus, NoOpEventBus};
use catalog_auditor::fixers::{
    ExtraneousFixer, Fixer, FixerSet, LogoTrimFixer, MetadataFixer, NfoFixer,
};
use catalog_auditor::library_store::{LibraryStores, SqliteLibraryStore};
use catalog_auditor::pipeline::Pipeline;
use catalog_auditor::provider::MetadataOrchestrator;
use catalog_auditor::rules::{AutomationMode, Engine, ViolationStatus};
use catalog_auditor::server_store::{ServerStore, SqliteServerStore};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[clap(version, about = "Audit an artist library against compliance rules")]
struct CliArgs {
    /// Path to a TOML config file. Its values override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding library.db and server.db.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Root folder with one sub-folder per artist.
    #[clap(long, value_parser = parse_path)]
    pub library_path: Option<PathBuf>,

    /// Default log level; LOG_LEVEL takes precedence.
    #[clap(long)]
    pub logging_level: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted.
    Serve,
    /// Register artist folders and refresh their presence flags.
    Scan,
    /// Print the evaluation of every artist, without fixing anything.
    Evaluate {
        /// Only this artist.
        #[clap(long)]
        artist: Option<String>,
    },
    /// Evaluate every rule and apply automatic fixes.
    RunAll,
    /// Evaluate one rule and apply automatic fixes.
    RunRule { rule_id: String },
    /// Run a bulk backfill in the foreground. Ctrl-C cancels it.
    Bulk {
        #[clap(value_enum)]
        operation: BulkOperationArg,
        #[clap(long, value_enum, default_value = "disambiguate")]
        mode: ResolutionModeArg,
        /// Limit the job to these artist ids. Repeatable.
        #[clap(long = "artist")]
        artists: Vec<String>,
    },
    /// List persisted violations.
    Violations {
        /// open, pending_choice, resolved or dismissed
        #[clap(long)]
        status: Option<String>,
    },
    /// Dismiss a violation.
    Dismiss { violation_id: String },
    /// Install one of the candidates offered for a pending violation.
    Apply {
        violation_id: String,
        candidate_index: usize,
    },
    /// List rules.
    Rules,
    /// Change a rule's enabled flag or automation mode.
    SetRule {
        rule_id: String,
        #[clap(long)]
        enabled: Option<bool>,
        /// auto, manual or disabled
        #[clap(long)]
        mode: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BulkOperationArg {
    FetchMetadata,
    FetchImages,
}

impl From<BulkOperationArg> for BulkOperation {
    fn from(arg: BulkOperationArg) -> Self {
        match arg {
            BulkOperationArg::FetchMetadata => BulkOperation::FetchMetadata,
            BulkOperationArg::FetchImages => BulkOperation::FetchImages,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ResolutionModeArg {
    Yolo,
    PromptNoMatch,
    Disambiguate,
    Manual,
}

impl From<ResolutionModeArg> for ResolutionMode {
    fn from(arg: ResolutionModeArg) -> Self {
        match arg {
            ResolutionModeArg::Yolo => ResolutionMode::Yolo,
            ResolutionModeArg::PromptNoMatch => ResolutionMode::PromptNoMatch,
            ResolutionModeArg::Disambiguate => ResolutionMode::Disambiguate,
            ResolutionModeArg::Manual => ResolutionMode::Manual,
        }
    }
}

/// Everything the commands need, wired from the resolved config.
struct App {
    config: AppConfig,
    stores: LibraryStores,
    server_store: Arc<dyn ServerStore>,
    orchestrator: Arc<MetadataOrchestrator>,
    image_fixer: Option<Arc<dyn Fixer>>,
    pipeline: Arc<Pipeline>,
    events: Arc<dyn EventBus>,
}

#[cfg(not(feature = "no_providers"))]
fn build_providers(config: &AppConfig) -> Result<(Arc<MetadataOrchestrator>, Option<Arc<dyn Fixer>>)> {
    use catalog_auditor::fixers::ImageFixer;
    use catalog_auditor::provider::{
        FanartTvClient, HttpImageDownloader, LastFmClient, MetadataProvider, MusicBrainzClient,
    };

    let settings = &config.providers;
    let mut providers: Vec<Arc<dyn MetadataProvider>> = Vec::new();
    providers.push(Arc::new(MusicBrainzClient::new(
        &settings.musicbrainz_user_agent,
        settings.musicbrainz_interval,
    )?));
    match &settings.lastfm_api_key {
        Some(key) => providers.push(Arc::new(LastFmClient::new(key, settings.lastfm_interval)?)),
        None => info!("No Last.fm API key configured, skipping Last.fm"),
    }
    let orchestrator = Arc::new(MetadataOrchestrator::new(providers));

    let image_fixer: Option<Arc<dyn Fixer>> = match &settings.fanarttv_api_key {
        Some(key) => {
            let provider = Arc::new(FanartTvClient::new(key, settings.fanarttv_interval)?);
            let downloader = Arc::new(HttpImageDownloader::new(
                &settings.musicbrainz_user_agent,
                config.images.max_download_bytes,
                config.images.download_timeout,
            )?);
            Some(Arc::new(ImageFixer::new(
                provider,
                downloader,
                config.naming.clone(),
                config.images.max_edge_px,
            )) as Arc<dyn Fixer>)
        }
        None => {
            warn!("No fanart.tv API key configured, image fixes are disabled");
            None
        }
    };
    Ok((orchestrator, image_fixer))
}

#[cfg(feature = "no_providers")]
fn build_providers(_config: &AppConfig) -> Result<(Arc<MetadataOrchestrator>, Option<Arc<dyn Fixer>>)> {
    warn!("Built without providers, metadata and image fixes are disabled");
    Ok((Arc::new(MetadataOrchestrator::new(vec![])), None))
}

impl App {
    fn open(config: AppConfig, events: Arc<dyn EventBus>) -> Result<Self> {
        info!("Opening library database at {:?}...", config.library_db_path());
        let library = Arc::new(SqliteLibraryStore::new(config.library_db_path())?);
        let stores = LibraryStores::from_store(library);
        let seeded = stores.rules.seed_defaults()?;
        if seeded > 0 {
            info!("Seeded {} built-in rules", seeded);
        }

        info!("Opening server database at {:?}...", config.server_db_path());
        let server_store: Arc<dyn ServerStore> =
            Arc::new(SqliteServerStore::new(config.server_db_path())?);

        let (orchestrator, image_fixer) = build_providers(&config)?;

        let mut fixers: Vec<Arc<dyn Fixer>> = vec![Arc::new(NfoFixer)];
        if !orchestrator.is_empty() {
            fixers.push(Arc::new(MetadataFixer::new(orchestrator.clone())));
        }
        if let Some(image_fixer) = &image_fixer {
            fixers.push(image_fixer.clone());
        }
        fixers.push(Arc::new(LogoTrimFixer::new(config.naming.clone())));
        fixers.push(Arc::new(ExtraneousFixer::new(config.naming.clone())));

        let engine = Arc::new(Engine::new(stores.rules.clone(), config.naming.clone()));
        let pipeline = Arc::new(Pipeline::new(
            engine,
            stores.clone(),
            FixerSet::new(fixers),
            events.clone(),
        ));

        Ok(Self {
            config,
            stores,
            server_store,
            orchestrator,
            image_fixer,
            pipeline,
            events,
        })
    }

    fn library_path(&self) -> Result<PathBuf> {
        self.config
            .library_path
            .clone()
            .context("library_path must be specified via --library-path or in config file")
    }

    fn bulk_executor(&self) -> BulkExecutor {
        BulkExecutor::new(
            self.stores.clone(),
            self.orchestrator.clone(),
            self.image_fixer.clone(),
            self.events.clone(),
            BulkExecutorSettings {
                progress_every: self.config.bulk.progress_every,
            },
        )
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping...");
            token.cancel();
        }
    });
}

async fn serve(app: App) -> Result<()> {
    let bulk = app.bulk_executor();
    bulk.recover_stale()?;

    let scheduler_settings = app.config.scheduler.clone();
    let shutdown = CancellationToken::new();
    let (hook_tx, hook_rx) = mpsc::channel(16);

    let job_context = JobContext::new(
        shutdown.child_token(),
        app.stores.clone(),
        app.server_store.clone(),
    );
    let (mut scheduler, handle) = create_scheduler(
        app.server_store.clone(),
        hook_rx,
        shutdown.clone(),
        job_context,
    );

    if let Some(library_path) = app.config.library_path.clone() {
        // Catch up before the startup compliance pass sees the artist table.
        let summary = scan_library(&library_path, &app.config.naming, app.stores.artists.as_ref())?;
        info!("Startup scan: {} artists ({} new)", summary.total, summary.added);
        scheduler
            .register_job(Arc::new(LibraryScanJob::new(
                library_path,
                app.config.naming.clone(),
                Duration::from_secs(scheduler_settings.library_scan_interval_hours * 60 * 60),
                hook_tx.clone(),
            )))
            .await;
    }
    scheduler
        .register_job(Arc::new(RuleComplianceJob::new(
            app.pipeline.clone(),
            Duration::from_secs(scheduler_settings.rule_run_interval_hours * 60 * 60),
        )))
        .await;
    scheduler
        .register_job(Arc::new(ViolationCleanupJob::new(
            scheduler_settings.violation_retention_days,
        )))
        .await;

    for job in handle.list_jobs().await? {
        info!("Job '{}' registered ({})", job.id, job.schedule);
    }

    cancel_on_ctrl_c(shutdown.clone());
    scheduler.run().await;
    drop(hook_tx);
    Ok(())
}

async fn run_bulk(app: &App, request: BulkRequest) -> Result<()> {
    let bulk = app.bulk_executor();
    bulk.recover_stale()?;
    let (job, mut task) = bulk.spawn(request)?;
    info!("Bulk job {} started", job.id);

    let interrupted = CancellationToken::new();
    cancel_on_ctrl_c(interrupted.clone());
    tokio::select! {
        res = &mut task => res?,
        _ = interrupted.cancelled() => {
            if let Err(e) = bulk.cancel() {
                warn!("Nothing to cancel: {}", e);
            }
            task.await?;
        }
    }

    let finished = app
        .stores
        .bulk_jobs
        .get_bulk_job(&job.id)?
        .context("Bulk job row disappeared")?;
    print_json(&finished)?;
    if finished.status == BulkJobStatus::Failed {
        bail!(
            "Bulk job failed: {}",
            finished.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn run_command(app: App, command: Command) -> Result<()> {
    match command {
        Command::Serve => serve(app).await?,
        Command::Scan => {
            let library_path = app.library_path()?;
            let summary =
                scan_library(&library_path, &app.config.naming, app.stores.artists.as_ref())?;
            println!(
                "{} artists: {} added, {} updated",
                summary.total, summary.added, summary.updated
            );
        }
        Command::Evaluate { artist } => {
            let artists = match artist {
                Some(id) => vec![app
                    .stores
                    .artists
                    .get_artist(&id)?
                    .with_context(|| format!("Artist '{}' not found", id))?],
                None => app.stores.artists.list_artists(false)?,
            };
            let engine = app.pipeline.engine();
            let results = artists
                .iter()
                .map(|a| engine.evaluate(a))
                .collect::<Result<Vec<_>>>()?;
            print_json(&results)?;
        }
        Command::RunAll => {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            print_json(&app.pipeline.run_all(&cancel).await?)?;
        }
        Command::RunRule { rule_id } => {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            print_json(&app.pipeline.run_rule(&rule_id, &cancel).await?)?;
        }
        Command::Bulk {
            operation,
            mode,
            artists,
        } => {
            run_bulk(
                &app,
                BulkRequest {
                    operation: operation.into(),
                    mode: mode.into(),
                    artist_ids: artists,
                },
            )
            .await?
        }
        Command::Violations { status } => {
            let status = status
                .map(|s| {
                    ViolationStatus::parse(&s)
                        .with_context(|| format!("Unknown violation status '{}'", s))
                })
                .transpose()?;
            print_json(&app.stores.violations.list_violations(status)?)?;
        }
        Command::Dismiss { violation_id } => {
            if !app
                .stores
                .violations
                .set_violation_status(&violation_id, ViolationStatus::Dismissed)?
            {
                bail!("Violation '{}' not found", violation_id);
            }
            println!("Dismissed {}", violation_id);
        }
        Command::Apply {
            violation_id,
            candidate_index,
        } => {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let result = app
                .pipeline
                .apply_candidate(&violation_id, candidate_index, &cancel)
                .await?;
            print_json(&result)?;
            if !result.fixed {
                bail!("Candidate was not applied: {}", result.message);
            }
        }
        Command::Rules => print_json(&app.stores.rules.list_rules()?)?,
        Command::SetRule {
            rule_id,
            enabled,
            mode,
        } => {
            let mut rule = app
                .stores
                .rules
                .get_rule(&rule_id)?
                .with_context(|| format!("Rule '{}' not found", rule_id))?;
            if let Some(enabled) = enabled {
                rule.enabled = enabled;
            }
            if let Some(mode) = mode {
                rule.automation_mode = AutomationMode::parse(&mode)
                    .with_context(|| format!("Unknown automation mode '{}'", mode))?;
            }
            rule.updated_at = chrono::Utc::now();
            app.stores.rules.save_rule(&rule)?;
            print_json(&rule)?;
        }
    }
    Ok(())
}

/// Log pipeline and bulk events while serving.
fn log_events(bus: &BroadcastEventBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event log fell behind, {} events skipped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match event {
                Event::RunCompleted {
                    rule_id,
                    artists_processed,
                    violations_found,
                    fixes_succeeded,
                    ..
                } => info!(
                    "Run {} finished: {} artists, {} violations, {} fixed",
                    rule_id.as_deref().unwrap_or("all"),
                    artists_processed,
                    violations_found,
                    fixes_succeeded
                ),
                Event::BulkJobFinished { job_id, status, .. } => {
                    info!("Bulk job {} finished: {}", job_id, status.as_str())
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        library_path: cli_args.library_path.clone(),
        logging_level: cli_args.logging_level.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    let default_level = config
        .logging_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    info!(
        "catalog-auditor {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let events: Arc<dyn EventBus> = match cli_args.command {
        Command::Serve => {
            let bus = BroadcastEventBus::default();
            log_events(&bus);
            Arc::new(bus)
        }
        _ => Arc::new(NoOpEventBus),
    };

    let app = App::open(config, events)?;
    if let Err(e) = run_command(app, cli_args.command).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
