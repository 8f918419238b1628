use crate::naming::NamingOverrides;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub library_path: Option<String>,
    pub logging_level: Option<String>,

    // Feature configs
    pub naming: Option<NamingConfig>,
    pub providers: Option<ProvidersConfig>,
    pub images: Option<ImagesConfig>,
    pub bulk: Option<BulkConfig>,
    pub scheduler: Option<SchedulerConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct NamingConfig {
    /// "kodi", "emby" or "plex"
    pub profile: Option<String>,
    #[serde(flatten)]
    pub overrides: NamingOverrides,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ProvidersConfig {
    pub musicbrainz_user_agent: Option<String>,
    pub musicbrainz_interval_ms: Option<u64>,
    pub lastfm_api_key: Option<String>,
    pub lastfm_interval_ms: Option<u64>,
    pub fanarttv_api_key: Option<String>,
    pub fanarttv_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ImagesConfig {
    /// Human readable size, e.g. "25 MB"
    pub max_download_size: Option<String>,
    pub download_timeout_sec: Option<u64>,
    pub max_edge_px: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BulkConfig {
    pub progress_every: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub rule_run_interval_hours: Option<u64>,
    pub violation_retention_days: Option<u64>,
    pub library_scan_interval_hours: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let config: FileConfig = toml::from_str(
            r#"
            db_dir = "/var/lib/auditor"
            library_path = "/music"
            logging_level = "debug"

            [naming]
            profile = "plex"
            fanart = ["backdrop.jpg", "background.jpg"]

            [providers]
            musicbrainz_user_agent = "auditor/1.0 (ops@example.com)"
            lastfm_api_key = "abc"

            [images]
            max_download_size = "10 MB"
            max_edge_px = 2048

            [bulk]
            progress_every = 5

            [scheduler]
            violation_retention_days = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.library_path.as_deref(), Some("/music"));
        let naming = config.naming.unwrap();
        assert_eq!(naming.profile.as_deref(), Some("plex"));
        assert_eq!(
            naming.overrides.fanart,
            Some(vec!["backdrop.jpg".to_string(), "background.jpg".to_string()])
        );
        assert!(naming.overrides.thumb.is_none());
        assert_eq!(
            config.providers.unwrap().lastfm_api_key.as_deref(),
            Some("abc")
        );
        assert_eq!(config.images.unwrap().max_edge_px, Some(2048));
        assert_eq!(config.bulk.unwrap().progress_every, Some(5));
        assert_eq!(
            config.scheduler.unwrap().violation_retention_days,
            Some(7)
        );
    }

    #[test]
    fn test_empty_file_is_valid() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.db_dir.is_none());
        assert!(config.naming.is_none());
    }

    #[test]
    fn test_load_reports_path() {
        let err = FileConfig::load(Path::new("/nonexistent/auditor.toml")).unwrap_err();
        assert!(err.to_string().contains("auditor.toml"));
    }
}
