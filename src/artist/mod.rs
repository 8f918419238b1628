mod scanner;

pub use scanner::{scan_library, ScanSummary};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of artwork an artist folder may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    Thumb,
    Fanart,
    Logo,
    Banner,
}

impl ImageType {
    pub const ALL: [ImageType; 4] = [
        ImageType::Thumb,
        ImageType::Fanart,
        ImageType::Logo,
        ImageType::Banner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Thumb => "thumb",
            ImageType::Fanart => "fanart",
            ImageType::Logo => "logo",
            ImageType::Banner => "banner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "thumb" => Some(ImageType::Thumb),
            "fanart" => Some(ImageType::Fanart),
            "logo" => Some(ImageType::Logo),
            "banner" => Some(ImageType::Banner),
            _ => None,
        }
    }

    /// Maps an image rule id (`thumb_exists`, `fanart_min_res`, ...) to the
    /// image type it inspects.
    pub fn for_rule(rule_id: &str) -> Option<Self> {
        let prefix = rule_id.split('_').next()?;
        Self::parse(prefix)
    }
}

impl std::fmt::Display for ImageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An artist folder in the library together with the metadata we track for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub sort_name: String,
    pub musicbrainz_id: Option<String>,
    pub audiodb_id: Option<String>,
    pub path: PathBuf,
    pub nfo_exists: bool,
    pub thumb_exists: bool,
    pub fanart_exists: bool,
    pub logo_exists: bool,
    pub banner_exists: bool,
    pub biography: String,
    pub genres: Vec<String>,
    pub formed: Option<String>,
    pub disambiguation: Option<String>,
    pub health_score: f64,
    pub is_excluded: bool,
    /// Last time we knowingly wrote this artist's data. Used to detect
    /// sidecar files edited by someone else.
    pub updated_at: DateTime<Utc>,
}

impl Artist {
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            sort_name: name.clone(),
            name,
            musicbrainz_id: None,
            audiodb_id: None,
            path: path.into(),
            nfo_exists: false,
            thumb_exists: false,
            fanart_exists: false,
            logo_exists: false,
            banner_exists: false,
            biography: String::new(),
            genres: Vec::new(),
            formed: None,
            disambiguation: None,
            health_score: 0.0,
            is_excluded: false,
            updated_at: Utc::now(),
        }
    }

    /// MusicBrainz id, ignoring blank values.
    pub fn mbid(&self) -> Option<&str> {
        self.musicbrainz_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn has_image(&self, image_type: ImageType) -> bool {
        match image_type {
            ImageType::Thumb => self.thumb_exists,
            ImageType::Fanart => self.fanart_exists,
            ImageType::Logo => self.logo_exists,
            ImageType::Banner => self.banner_exists,
        }
    }

    pub fn set_image_flag(&mut self, image_type: ImageType, present: bool) {
        match image_type {
            ImageType::Thumb => self.thumb_exists = present,
            ImageType::Fanart => self.fanart_exists = present,
            ImageType::Logo => self.logo_exists = present,
            ImageType::Banner => self.banner_exists = present,
        }
    }

    pub fn missing_images(&self) -> Vec<ImageType> {
        ImageType::ALL
            .into_iter()
            .filter(|t| !self.has_image(*t))
            .collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
