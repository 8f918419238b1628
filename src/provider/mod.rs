//! External metadata and artwork sources.

mod download;
mod fanarttv;
mod lastfm;
mod musicbrainz;
mod orchestrator;
mod rate_limit;

pub use download::HttpImageDownloader;
pub use fanarttv::FanartTvClient;
pub use lastfm::LastFmClient;
pub use musicbrainz::MusicBrainzClient;
pub use orchestrator::{select_hit, MetadataOrchestrator, STRONG_MATCH_SCORE};
pub use rate_limit::{RateLimitError, RateLimiter};

use crate::rules::ImageCandidate;
use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// One ranked answer to an artist name search.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtistSearchHit {
    pub musicbrainz_id: String,
    pub name: String,
    pub disambiguation: Option<String>,
    /// Provider confidence, 0 to 100.
    pub score: u32,
}

/// Fields a provider knows about an artist. Empty values mean "unknown".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtistMetadata {
    pub musicbrainz_id: Option<String>,
    pub sort_name: Option<String>,
    pub biography: Option<String>,
    pub genres: Vec<String>,
    pub formed: Option<String>,
    pub disambiguation: Option<String>,
    pub audiodb_id: Option<String>,
}

impl ArtistMetadata {
    /// Fill every empty field of `self` from `other`.
    pub fn merge_missing(&mut self, other: ArtistMetadata) {
        fn fill(target: &mut Option<String>, value: Option<String>) {
            let empty = target.as_deref().map_or(true, |s| s.trim().is_empty());
            if empty {
                if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                    *target = Some(v);
                }
            }
        }
        fill(&mut self.musicbrainz_id, other.musicbrainz_id);
        fill(&mut self.sort_name, other.sort_name);
        fill(&mut self.biography, other.biography);
        fill(&mut self.formed, other.formed);
        fill(&mut self.disambiguation, other.disambiguation);
        fill(&mut self.audiodb_id, other.audiodb_id);
        if self.genres.is_empty() {
            self.genres = other.genres;
        }
    }
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ranked artist matches for a name, best first.
    async fn search(&self, name: &str, cancel: &CancellationToken) -> Result<Vec<ArtistSearchHit>>;

    async fn fetch_metadata(
        &self,
        musicbrainz_id: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ArtistMetadata>;
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every image the provider has for the artist, across all types.
    async fn fetch_images(
        &self,
        musicbrainz_id: &str,
        secondary_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImageCandidate>>;
}

#[derive(Debug, Clone)]
pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    /// MIME type sniffed from the content.
    pub mime_type: String,
}

#[async_trait]
pub trait ImageDownloader: Send + Sync {
    async fn download(&self, url: &str, cancel: &CancellationToken) -> Result<DownloadedImage>;
}
