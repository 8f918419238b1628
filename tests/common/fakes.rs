//! In-process stand-ins for fixers and providers.

use anyhow::Result;
use async_trait::async_trait;
use catalog_auditor::artist::Artist;
use catalog_auditor::fixers::{FixContext, FixResult, Fixer};
use catalog_auditor::provider::{
    ArtistMetadata, ArtistSearchHit, DownloadedImage, ImageDownloader, ImageProvider,
    MetadataProvider,
};
use catalog_auditor::rules::{ImageCandidate, Violation};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Claims every violation and reports it fixed without touching anything.
/// Counts how often it was asked.
#[derive(Default)]
pub struct RecordingFixer {
    calls: AtomicUsize,
    discovery: bool,
}

impl RecordingFixer {
    pub fn discovering() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            discovery: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fixer for RecordingFixer {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn can_fix(&self, _: &Violation) -> bool {
        true
    }

    fn supports_candidate_discovery(&self) -> bool {
        self.discovery
    }

    async fn fix(
        &self,
        _: &FixContext,
        _: &mut Artist,
        violation: &Violation,
    ) -> Result<FixResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if violation.config.discovery_only {
            return Ok(FixResult::not_fixed(&violation.rule_id, "nothing to offer"));
        }
        Ok(FixResult::fixed(&violation.rule_id, "recorded"))
    }
}

/// Returns the same candidate list for every artist.
pub struct ScriptedImageProvider {
    pub candidates: Vec<ImageCandidate>,
}

#[async_trait]
impl ImageProvider for ScriptedImageProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_images(
        &self,
        _: &str,
        _: Option<&str>,
        _: &CancellationToken,
    ) -> Result<Vec<ImageCandidate>> {
        Ok(self.candidates.clone())
    }
}

/// Serves a generated PNG of a fixed size for every URL.
pub struct InMemoryDownloader {
    pub width: u32,
    pub height: u32,
}

#[async_trait]
impl ImageDownloader for InMemoryDownloader {
    async fn download(&self, _: &str, _: &CancellationToken) -> Result<DownloadedImage> {
        Ok(DownloadedImage {
            bytes: png_bytes(self.width, self.height),
            mime_type: "image/png".to_string(),
        })
    }
}

/// Never answers until cancelled, so a bulk job stays busy.
pub struct StalledMetadataProvider;

#[async_trait]
impl MetadataProvider for StalledMetadataProvider {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn search(&self, _: &str, cancel: &CancellationToken) -> Result<Vec<ArtistSearchHit>> {
        tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("cancelled"),
            _ = tokio::time::sleep(Duration::from_secs(60)) => Ok(Vec::new()),
        }
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

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([40, 80, 120])));
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageFormat::Png).unwrap();
    cursor.into_inner()
}
