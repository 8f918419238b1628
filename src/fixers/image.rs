use super::{FixContext, FixResult, Fixer};
use crate::artist::{Artist, ImageType};
use crate::imaging;
use crate::naming::NamingProfile;
use crate::provider::{ImageDownloader, ImageProvider};
use crate::rules::{ImageCandidate, ImageRequirements, RuleConfig, Violation};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identifies one artist's provider lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateCacheKey {
    pub musicbrainz_id: String,
    pub secondary_id: Option<String>,
}

impl CandidateCacheKey {
    pub fn for_artist(artist: &Artist) -> Option<Self> {
        Some(Self {
            musicbrainz_id: artist.mbid()?.to_string(),
            secondary_id: artist
                .audiodb_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from),
        })
    }
}

/// Candidates that survived the pre-download gate, plus how many were
/// dropped for each reason.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateOutcome {
    pub kept: Vec<ImageCandidate>,
    pub below_minimum: usize,
    pub below_existing: usize,
    pub wrong_aspect: usize,
}

impl GateOutcome {
    fn rejection_message(&self, image_type: ImageType) -> String {
        let mut reasons = Vec::new();
        if self.below_minimum > 0 {
            reasons.push(format!("{} below configured minimum", self.below_minimum));
        }
        if self.below_existing > 0 {
            reasons.push(format!("{} smaller than the existing image", self.below_existing));
        }
        if self.wrong_aspect > 0 {
            reasons.push(format!("{} with the wrong aspect ratio", self.wrong_aspect));
        }
        if reasons.is_empty() {
            format!("No {} candidates available from providers", image_type)
        } else {
            format!(
                "All {} candidates rejected: {}",
                image_type,
                reasons.join(", ")
            )
        }
    }
}

/// Drop candidates whose declared size is known to be unusable. A candidate
/// without declared dimensions passes; it is checked again after download.
pub fn pre_download_gate(
    candidates: Vec<ImageCandidate>,
    required: &ImageRequirements,
    existing_area: Option<u64>,
) -> GateOutcome {
    let mut outcome = GateOutcome::default();
    for candidate in candidates {
        if candidate.has_declared_dimensions() {
            if required.below_minimum(candidate.width, candidate.height) {
                outcome.below_minimum += 1;
                continue;
            }
            if existing_area.is_some_and(|area| candidate.declared_area() < area) {
                outcome.below_existing += 1;
                continue;
            }
            if required.wrong_aspect(candidate.width, candidate.height) {
                outcome.wrong_aspect += 1;
                continue;
            }
        }
        outcome.kept.push(candidate);
    }
    outcome
}

fn post_download_reject(
    width: u32,
    height: u32,
    required: &ImageRequirements,
    existing_area: Option<u64>,
) -> Option<String> {
    if required.below_minimum(width, height) {
        return Some(format!(
            "downloaded image is {}x{}, below configured minimum {}x{}",
            width, height, required.min.0, required.min.1
        ));
    }
    let area = u64::from(width) * u64::from(height);
    if existing_area.is_some_and(|existing| area < existing) {
        return Some(format!(
            "downloaded image is {}x{}, smaller than the existing image",
            width, height
        ));
    }
    match required.aspect {
        Some(target) if !target.matches(width, height) => Some(format!(
            "downloaded image is {}x{}, aspect ratio differs from {:.2}",
            width, height, target.ratio
        )),
        _ => None,
    }
}

/// Finds artwork through an image provider and installs it under the
/// profile's canonical names.
pub struct ImageFixer {
    provider: Arc<dyn ImageProvider>,
    downloader: Arc<dyn ImageDownloader>,
    naming: NamingProfile,
    max_edge_px: u32,
    cache: Mutex<HashMap<CandidateCacheKey, Vec<ImageCandidate>>>,
}

impl ImageFixer {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        downloader: Arc<dyn ImageDownloader>,
        naming: NamingProfile,
        max_edge_px: u32,
    ) -> Self {
        Self {
            provider,
            downloader,
            naming,
            max_edge_px,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn all_candidates(
        &self,
        key: &CandidateCacheKey,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImageCandidate>> {
        let cached = self.cache.lock().unwrap().get(key).cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }
        let fetched = self
            .provider
            .fetch_images(&key.musicbrainz_id, key.secondary_id.as_deref(), cancel)
            .await
            .with_context(|| format!("{} image lookup failed", self.provider.name()))?;
        debug!(
            "{} returned {} image candidates for {}",
            self.provider.name(),
            fetched.len(),
            key.musicbrainz_id
        );
        self.cache
            .lock()
            .unwrap()
            .insert(key.clone(), fetched.clone());
        Ok(fetched)
    }

    /// Candidates of `image_type`, most liked first, then largest.
    async fn ranked_candidates(
        &self,
        key: &CandidateCacheKey,
        image_type: ImageType,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImageCandidate>> {
        let mut candidates: Vec<ImageCandidate> = self
            .all_candidates(key, cancel)
            .await?
            .into_iter()
            .filter(|c| c.image_type == image_type)
            .collect();
        candidates.sort_by(|a, b| {
            b.likes
                .cmp(&a.likes)
                .then_with(|| b.declared_area().cmp(&a.declared_area()))
        });
        Ok(candidates)
    }

    fn existing_area(&self, artist: &Artist, image_type: ImageType) -> Option<u64> {
        let path = self.naming.find_existing(&artist.path, image_type)?;
        let (w, h) = imaging::dimensions(&path)?;
        Some(u64::from(w) * u64::from(h))
    }

    fn target_paths(&self, artist: &Artist, image_type: ImageType) -> Result<Vec<PathBuf>> {
        let existing = self.naming.existing_files(&artist.path, image_type);
        if !existing.is_empty() {
            return Ok(existing);
        }
        let primary = self
            .naming
            .primary_name(image_type)
            .ok_or_else(|| anyhow!("Naming profile has no {} filename", image_type))?;
        Ok(vec![artist.path.join(primary)])
    }

    /// Download, check and write a single candidate. Nothing on disk changes
    /// unless every check passes.
    async fn install(
        &self,
        ctx: &FixContext,
        artist: &Artist,
        candidate: &ImageCandidate,
        required: ImageRequirements,
        existing_area: Option<u64>,
    ) -> Result<Vec<PathBuf>> {
        let downloaded = self.downloader.download(&candidate.url, &ctx.cancel).await?;
        let targets = self.target_paths(artist, candidate.image_type)?;
        let max_edge = self.max_edge_px;

        let written = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
            let img = imaging::decode_bytes(&downloaded.bytes)?;
            let (width, height) = (img.width(), img.height());
            if let Some(reason) = post_download_reject(width, height, &required, existing_area) {
                bail!(reason);
            }
            // The size cap never takes an image below what the rule accepts
            let (scaled_w, scaled_h) = imaging::fit_to_max_edge(width, height, max_edge);
            let img = match post_download_reject(scaled_w, scaled_h, &required, existing_area) {
                None => imaging::downscale(img, max_edge),
                Some(reason) => {
                    debug!("Keeping {}x{} unscaled: {}", width, height, reason);
                    img
                }
            };
            for target in &targets {
                imaging::write_atomic(&img, target)?;
            }
            Ok(targets)
        })
        .await
        .context("Image write task panicked")??;
        Ok(written)
    }

    fn installed(
        &self,
        artist: &mut Artist,
        rule_id: &str,
        candidate: &ImageCandidate,
        written: &[PathBuf],
    ) -> FixResult {
        artist.set_image_flag(candidate.image_type, true);
        artist.touch();
        let names: Vec<String> = written
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        info!(
            "Installed {} for '{}' from {} as {}",
            candidate.image_type,
            artist.name,
            candidate.source,
            names.join(", ")
        );
        FixResult::fixed(
            rule_id,
            format!(
                "Saved {} from {} as {}",
                candidate.image_type,
                candidate.source,
                names.join(", ")
            ),
        )
    }
}

#[async_trait]
impl Fixer for ImageFixer {
    fn name(&self) -> &'static str {
        "image"
    }

    fn can_fix(&self, violation: &Violation) -> bool {
        violation.rule_id != "logo_padding" && ImageType::for_rule(&violation.rule_id).is_some()
    }

    fn supports_candidate_discovery(&self) -> bool {
        true
    }

    fn begin_pass(&self) {
        self.cache.lock().unwrap().clear();
    }

    async fn fix(
        &self,
        ctx: &FixContext,
        artist: &mut Artist,
        violation: &Violation,
    ) -> Result<FixResult> {
        let rule_id = violation.rule_id.as_str();
        let Some(image_type) = ImageType::for_rule(rule_id) else {
            return Ok(FixResult::not_fixed(rule_id, "Not an image rule"));
        };
        let Some(key) = CandidateCacheKey::for_artist(artist) else {
            return Ok(FixResult::not_fixed(
                rule_id,
                "No MusicBrainz ID; cannot look up images",
            ));
        };

        let candidates = self
            .ranked_candidates(&key, image_type, &ctx.cancel)
            .await?;
        let required = ImageRequirements::for_rule(rule_id, &violation.config);
        let existing_area = self.existing_area(artist, image_type);
        let gate = pre_download_gate(candidates, &required, existing_area);
        if gate.kept.is_empty() {
            return Ok(FixResult::not_fixed(
                rule_id,
                gate.rejection_message(image_type),
            ));
        }

        let config = &violation.config;
        if config.discovery_only || (gate.kept.len() > 1 && !config.auto_select_best) {
            let count = gate.kept.len();
            return Ok(FixResult::with_candidates(
                rule_id,
                format!("{} {} candidate(s) available", count, image_type),
                gate.kept,
            ));
        }

        let mut failures = Vec::new();
        for candidate in &gate.kept {
            if ctx.cancel.is_cancelled() {
                failures.push("cancelled".to_string());
                break;
            }
            match self.install(ctx, artist, candidate, required, existing_area).await {
                Ok(written) => return Ok(self.installed(artist, rule_id, candidate, &written)),
                Err(e) => {
                    warn!("Candidate {} for '{}' rejected: {:#}", candidate.url, artist.name, e);
                    failures.push(format!("{:#}", e));
                }
            }
        }
        Ok(FixResult::not_fixed(
            rule_id,
            format!(
                "All {} {} candidate(s) failed: {}",
                gate.kept.len(),
                image_type,
                failures.join("; ")
            ),
        ))
    }

    async fn apply_candidate(
        &self,
        ctx: &FixContext,
        artist: &mut Artist,
        rule_id: &str,
        candidate: &ImageCandidate,
        config: &RuleConfig,
    ) -> Result<FixResult> {
        let required = ImageRequirements::for_rule(rule_id, config);
        let existing_area = self.existing_area(artist, candidate.image_type);
        match self.install(ctx, artist, candidate, required, existing_area).await {
            Ok(written) => Ok(self.installed(artist, rule_id, candidate, &written)),
            Err(e) => Ok(FixResult::not_fixed(
                rule_id,
                format!("Candidate rejected: {:#}", e),
            )),
        }
    }
}
