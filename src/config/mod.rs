mod file_config;

pub use file_config::{
    BulkConfig, FileConfig, ImagesConfig, NamingConfig, ProvidersConfig, SchedulerConfig,
};

use crate::naming::NamingProfile;
use anyhow::{anyhow, bail, Context, Result};
use byte_unit::Byte;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!(
    "catalog-auditor/",
    env!("CARGO_PKG_VERSION"),
    " ( set providers.musicbrainz_user_agent )"
);

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub library_path: Option<PathBuf>,
    pub logging_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub library_path: Option<PathBuf>,
    /// Directive for the tracing `EnvFilter`, e.g. "info"
    pub logging_level: String,

    pub naming: NamingProfile,
    pub providers: ProviderSettings,
    pub images: ImageSettings,
    pub bulk: BulkSettings,
    pub scheduler: SchedulerSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let library_path = file
            .library_path
            .map(PathBuf::from)
            .or_else(|| cli.library_path.clone());

        let logging_level = file
            .logging_level
            .or_else(|| cli.logging_level.clone())
            .unwrap_or_else(|| "info".to_string());

        let naming_file = file.naming.unwrap_or_default();
        let profile_name = naming_file.profile.as_deref().unwrap_or("kodi");
        let naming = NamingProfile::by_name(profile_name)
            .ok_or_else(|| anyhow!("Unknown naming profile: {}", profile_name))?
            .with_overrides(&naming_file.overrides);

        let providers_file = file.providers.unwrap_or_default();
        let defaults = ProviderSettings::default();
        let providers = ProviderSettings {
            musicbrainz_user_agent: providers_file
                .musicbrainz_user_agent
                .unwrap_or(defaults.musicbrainz_user_agent),
            musicbrainz_interval: providers_file
                .musicbrainz_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.musicbrainz_interval),
            lastfm_api_key: providers_file.lastfm_api_key.filter(|k| !k.is_empty()),
            lastfm_interval: providers_file
                .lastfm_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.lastfm_interval),
            fanarttv_api_key: providers_file.fanarttv_api_key.filter(|k| !k.is_empty()),
            fanarttv_interval: providers_file
                .fanarttv_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.fanarttv_interval),
        };

        let images_file = file.images.unwrap_or_default();
        let defaults = ImageSettings::default();
        let max_download_bytes = match images_file.max_download_size {
            Some(size) => parse_size(&size)?,
            None => defaults.max_download_bytes,
        };
        let images = ImageSettings {
            max_download_bytes,
            download_timeout: images_file
                .download_timeout_sec
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            max_edge_px: images_file.max_edge_px.unwrap_or(defaults.max_edge_px),
        };

        let bulk = BulkSettings {
            progress_every: file
                .bulk
                .and_then(|b| b.progress_every)
                .unwrap_or(BulkSettings::default().progress_every)
                .max(1),
        };

        let scheduler_file = file.scheduler.unwrap_or_default();
        let defaults = SchedulerSettings::default();
        let scheduler = SchedulerSettings {
            rule_run_interval_hours: scheduler_file
                .rule_run_interval_hours
                .unwrap_or(defaults.rule_run_interval_hours)
                .max(1),
            violation_retention_days: scheduler_file
                .violation_retention_days
                .unwrap_or(defaults.violation_retention_days),
            library_scan_interval_hours: scheduler_file
                .library_scan_interval_hours
                .unwrap_or(defaults.library_scan_interval_hours)
                .max(1),
        };

        Ok(Self {
            db_dir,
            library_path,
            logging_level,
            naming,
            providers,
            images,
            bulk,
            scheduler,
        })
    }

    pub fn library_db_path(&self) -> PathBuf {
        self.db_dir.join("library.db")
    }

    pub fn server_db_path(&self) -> PathBuf {
        self.db_dir.join("server.db")
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub musicbrainz_user_agent: String,
    pub musicbrainz_interval: Duration,
    /// Last.fm is skipped when unset
    pub lastfm_api_key: Option<String>,
    pub lastfm_interval: Duration,
    /// fanart.tv is skipped when unset
    pub fanarttv_api_key: Option<String>,
    pub fanarttv_interval: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            musicbrainz_user_agent: DEFAULT_USER_AGENT.to_string(),
            musicbrainz_interval: Duration::from_millis(1100),
            lastfm_api_key: None,
            lastfm_interval: Duration::from_millis(200),
            fanarttv_api_key: None,
            fanarttv_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub max_download_bytes: u64,
    pub download_timeout: Duration,
    /// Longest edge kept when writing downloaded images
    pub max_edge_px: u32,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            max_download_bytes: 25_000_000,
            download_timeout: Duration::from_secs(30),
            max_edge_px: 4096,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkSettings {
    pub progress_every: usize,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self { progress_every: 10 }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub rule_run_interval_hours: u64,
    pub violation_retention_days: u64,
    /// Only used when a library path is configured
    pub library_scan_interval_hours: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            rule_run_interval_hours: 24,
            violation_retention_days: 30,
            library_scan_interval_hours: 6,
        }
    }
}

fn parse_size(s: &str) -> Result<u64> {
    let bytes = Byte::parse_str(s, true)
        .with_context(|| format!("Invalid size in [images] max_download_size: {:?}", s))?;
    Ok(bytes.as_u64())
}
