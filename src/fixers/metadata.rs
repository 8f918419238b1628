use super::{FixContext, FixResult, Fixer};
use crate::artist::Artist;
use crate::bulk::ResolutionMode;
use crate::provider::{select_hit, ArtistMetadata, MetadataOrchestrator};
use crate::rules::Violation;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

const DEFAULT_BIO_MIN_LENGTH: usize = 10;

/// Copy provider metadata into every empty field of `artist`. Returns the
/// names of the fields that changed.
pub fn apply_metadata(artist: &mut Artist, metadata: ArtistMetadata) -> Vec<&'static str> {
    fn blank(value: Option<&str>) -> bool {
        value.map_or(true, |v| v.trim().is_empty())
    }
    fn present(value: &Option<String>) -> Option<String> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(String::from)
    }

    let mut changed = Vec::new();
    if artist.mbid().is_none() {
        if let Some(mbid) = present(&metadata.musicbrainz_id) {
            artist.musicbrainz_id = Some(mbid);
            changed.push("musicbrainz_id");
        }
    }
    if blank(artist.audiodb_id.as_deref()) {
        if let Some(id) = present(&metadata.audiodb_id) {
            artist.audiodb_id = Some(id);
            changed.push("audiodb_id");
        }
    }
    if artist.sort_name.trim().is_empty() || artist.sort_name == artist.name {
        if let Some(sort_name) = present(&metadata.sort_name) {
            if sort_name != artist.sort_name {
                artist.sort_name = sort_name;
                changed.push("sort_name");
            }
        }
    }
    if artist.biography.trim().is_empty() {
        if let Some(bio) = present(&metadata.biography) {
            artist.biography = bio;
            changed.push("biography");
        }
    }
    if artist.genres.is_empty() && !metadata.genres.is_empty() {
        artist.genres = metadata.genres;
        changed.push("genres");
    }
    if blank(artist.formed.as_deref()) {
        if let Some(formed) = present(&metadata.formed) {
            artist.formed = Some(formed);
            changed.push("formed");
        }
    }
    if blank(artist.disambiguation.as_deref()) {
        if let Some(disambiguation) = present(&metadata.disambiguation) {
            artist.disambiguation = Some(disambiguation);
            changed.push("disambiguation");
        }
    }
    if !changed.is_empty() {
        artist.touch();
    }
    changed
}

/// Fills the MusicBrainz id and biography from metadata providers.
pub struct MetadataFixer {
    orchestrator: Arc<MetadataOrchestrator>,
}

impl MetadataFixer {
    pub fn new(orchestrator: Arc<MetadataOrchestrator>) -> Self {
        Self { orchestrator }
    }

    fn satisfied(artist: &Artist, violation: &Violation) -> bool {
        match violation.rule_id.as_str() {
            "nfo_has_mbid" => artist.mbid().is_some(),
            "bio_exists" => {
                let min = violation.config.min_length.unwrap_or(DEFAULT_BIO_MIN_LENGTH);
                artist.biography.trim().chars().count() >= min
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Fixer for MetadataFixer {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn can_fix(&self, violation: &Violation) -> bool {
        matches!(violation.rule_id.as_str(), "nfo_has_mbid" | "bio_exists")
    }

    async fn fix(
        &self,
        ctx: &FixContext,
        artist: &mut Artist,
        violation: &Violation,
    ) -> Result<FixResult> {
        let rule_id = violation.rule_id.as_str();
        let mut changed = Vec::new();

        if artist.mbid().is_none() {
            let hits = self.orchestrator.search(&artist.name, &ctx.cancel).await?;
            let Some(hit) = select_hit(&hits, ResolutionMode::Disambiguate) else {
                return Ok(FixResult::not_fixed(
                    rule_id,
                    format!(
                        "No unambiguous MusicBrainz match for '{}' ({} result(s))",
                        artist.name,
                        hits.len()
                    ),
                ));
            };
            info!(
                "Matched '{}' to MusicBrainz {} (score {})",
                artist.name, hit.musicbrainz_id, hit.score
            );
            artist.musicbrainz_id = Some(hit.musicbrainz_id.clone());
            artist.touch();
            changed.push("musicbrainz_id");
        }

        if !Self::satisfied(artist, violation) {
            let mbid = artist.mbid().unwrap_or_default().to_string();
            let metadata = self
                .orchestrator
                .fetch_metadata(&mbid, &artist.name, &ctx.cancel)
                .await?;
            changed.extend(apply_metadata(artist, metadata));
        }

        if Self::satisfied(artist, violation) {
            Ok(FixResult::fixed(
                rule_id,
                format!("Updated {}", changed.join(", ")),
            ))
        } else {
            Ok(FixResult::not_fixed(
                rule_id,
                "Providers had nothing usable for this artist",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ArtistSearchHit, MetadataProvider};
    use crate::rules::{RuleCategory, RuleConfig, Severity};
    use tokio_util::sync::CancellationToken;

    struct OneArtist {
        score: u32,
        bio: &'static str,
    }

    #[async_trait]
    impl MetadataProvider for OneArtist {
        fn name(&self) -> &'static str {
            "one"
        }

        async fn search(&self, name: &str, _: &CancellationToken) -> Result<Vec<ArtistSearchHit>> {
            Ok(vec![ArtistSearchHit {
                musicbrainz_id: "mbid-1".to_string(),
                name: name.to_string(),
                disambiguation: None,
                score: self.score,
            }])
        }

        async fn fetch_metadata(
            &self,
            _: &str,
            _: &str,
            _: &CancellationToken,
        ) -> Result<ArtistMetadata> {
            Ok(ArtistMetadata {
                biography: Some(self.bio.to_string()),
                genres: vec!["rock".to_string()],
                ..Default::default()
            })
        }
    }

    fn fixer(score: u32, bio: &'static str) -> MetadataFixer {
        MetadataFixer::new(Arc::new(MetadataOrchestrator::new(vec![Arc::new(
            OneArtist { score, bio },
        )])))
    }

    fn violation(rule_id: &str) -> Violation {
        Violation {
            rule_id: rule_id.to_string(),
            rule_name: rule_id.to_string(),
            category: RuleCategory::Metadata,
            severity: Severity::Warning,
            message: "bad".to_string(),
            fixable: true,
            config: RuleConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_resolves_mbid_from_strong_match() {
        let mut artist = Artist::new("a1", "Alpha", "/music/Alpha");
        let result = fixer(100, "A long enough biography.")
            .fix(&FixContext::default(), &mut artist, &violation("nfo_has_mbid"))
            .await
            .unwrap();
        assert!(result.fixed);
        assert_eq!(artist.mbid(), Some("mbid-1"));
    }

    #[tokio::test]
    async fn test_weak_match_is_not_assigned() {
        let mut artist = Artist::new("a1", "Alpha", "/music/Alpha");
        let result = fixer(60, "A long enough biography.")
            .fix(&FixContext::default(), &mut artist, &violation("nfo_has_mbid"))
            .await
            .unwrap();
        assert!(!result.fixed);
        assert!(artist.musicbrainz_id.is_none());
    }

    #[tokio::test]
    async fn test_bio_fill_respects_min_length() {
        let mut artist = Artist::new("a1", "Alpha", "/music/Alpha");
        artist.musicbrainz_id = Some("mbid-1".to_string());
        let result = fixer(100, "Short")
            .fix(&FixContext::default(), &mut artist, &violation("bio_exists"))
            .await
            .unwrap();
        assert!(!result.fixed);
        // the short bio is still merged into the empty field
        assert_eq!(artist.biography, "Short");

        let mut artist = Artist::new("a2", "Beta", "/music/Beta");
        artist.musicbrainz_id = Some("mbid-2".to_string());
        let result = fixer(100, "Formed in a garage in 1990.")
            .fix(&FixContext::default(), &mut artist, &violation("bio_exists"))
            .await
            .unwrap();
        assert!(result.fixed);
        assert_eq!(artist.genres, vec!["rock".to_string()]);
    }

    #[test]
    fn test_apply_metadata_only_fills_empty_fields() {
        let mut artist = Artist::new("a1", "Alpha", "/music/Alpha");
        artist.biography = "Mine".to_string();
        let changed = apply_metadata(
            &mut artist,
            ArtistMetadata {
                biography: Some("Theirs".to_string()),
                formed: Some("1990".to_string()),
                sort_name: Some("Alpha, The".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(artist.biography, "Mine");
        assert_eq!(artist.formed.as_deref(), Some("1990"));
        assert_eq!(artist.sort_name, "Alpha, The");
        assert_eq!(changed, vec!["sort_name", "formed"]);
    }
}
