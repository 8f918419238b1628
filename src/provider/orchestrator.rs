use super::{ArtistMetadata, ArtistSearchHit, MetadataProvider};
use crate::bulk::ResolutionMode;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Search score at or above which a hit counts as a strong match.
pub const STRONG_MATCH_SCORE: u32 = 90;

/// Queries metadata providers in priority order.
pub struct MetadataOrchestrator {
    providers: Vec<Arc<dyn MetadataProvider>>,
}

impl MetadataOrchestrator {
    pub fn new(providers: Vec<Arc<dyn MetadataProvider>>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Hits from the first provider that returns any. Provider errors are
    /// logged and skipped; the call only fails when every provider failed.
    pub async fn search(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ArtistSearchHit>> {
        let mut last_error = None;
        let mut any_ok = false;
        for provider in &self.providers {
            match provider.search(name, cancel).await {
                Ok(hits) if !hits.is_empty() => return Ok(hits),
                Ok(_) => any_ok = true,
                Err(e) => {
                    warn!("{} search for '{}' failed: {:#}", provider.name(), name, e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if !any_ok => Err(e),
            _ => Ok(Vec::new()),
        }
    }

    /// Merge metadata across providers, taking the first non-empty value of
    /// each field.
    pub async fn fetch_metadata(
        &self,
        musicbrainz_id: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ArtistMetadata> {
        let mut merged = ArtistMetadata::default();
        let mut last_error = None;
        let mut any_ok = false;
        for provider in &self.providers {
            if cancel.is_cancelled() {
                break;
            }
            match provider.fetch_metadata(musicbrainz_id, name, cancel).await {
                Ok(metadata) => {
                    any_ok = true;
                    merged.merge_missing(metadata);
                }
                Err(e) => {
                    warn!(
                        "{} metadata for '{}' failed: {:#}",
                        provider.name(),
                        name,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }
        if !any_ok {
            return Err(last_error.unwrap_or_else(|| anyhow!("No metadata providers configured")));
        }
        Ok(merged)
    }
}

/// Pick the search hit `mode` allows us to assign without asking.
pub fn select_hit(hits: &[ArtistSearchHit], mode: ResolutionMode) -> Option<&ArtistSearchHit> {
    let top = hits.iter().min_by_key(|h| std::cmp::Reverse(h.score))?;
    match mode {
        ResolutionMode::Yolo => Some(top),
        ResolutionMode::PromptNoMatch => (top.score >= STRONG_MATCH_SCORE).then_some(top),
        ResolutionMode::Disambiguate => {
            let strong = hits
                .iter()
                .filter(|h| h.score >= STRONG_MATCH_SCORE)
                .count();
            (strong == 1 && top.score >= STRONG_MATCH_SCORE).then_some(top)
        }
        ResolutionMode::Manual => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Scripted {
        name: &'static str,
        hits: Vec<ArtistSearchHit>,
        metadata: Option<ArtistMetadata>,
    }

    #[async_trait]
    impl MetadataProvider for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, _: &str, _: &CancellationToken) -> Result<Vec<ArtistSearchHit>> {
            Ok(self.hits.clone())
        }

        async fn fetch_metadata(
            &self,
            _: &str,
            _: &str,
            _: &CancellationToken,
        ) -> Result<ArtistMetadata> {
            self.metadata
                .clone()
                .ok_or_else(|| anyhow!("{} is down", self.name))
        }
    }

    fn hit(id: &str, score: u32) -> ArtistSearchHit {
        ArtistSearchHit {
            musicbrainz_id: id.to_string(),
            name: "Alpha".to_string(),
            disambiguation: None,
            score,
        }
    }

    #[test]
    fn test_select_hit_by_mode() {
        let strong_and_weak = vec![hit("a", 100), hit("b", 60)];
        let two_strong = vec![hit("a", 100), hit("b", 95)];
        let weak = vec![hit("a", 70)];

        assert_eq!(
            select_hit(&weak, ResolutionMode::Yolo).unwrap().musicbrainz_id,
            "a"
        );
        assert!(select_hit(&weak, ResolutionMode::PromptNoMatch).is_none());
        assert!(select_hit(&two_strong, ResolutionMode::PromptNoMatch).is_some());
        assert!(select_hit(&two_strong, ResolutionMode::Disambiguate).is_none());
        assert!(select_hit(&strong_and_weak, ResolutionMode::Disambiguate).is_some());
        assert!(select_hit(&strong_and_weak, ResolutionMode::Manual).is_none());
        assert!(select_hit(&[], ResolutionMode::Yolo).is_none());
    }

    #[tokio::test]
    async fn test_search_uses_first_provider_with_hits() {
        let orchestrator = MetadataOrchestrator::new(vec![
            Arc::new(Scripted {
                name: "empty",
                hits: vec![],
                metadata: None,
            }),
            Arc::new(Scripted {
                name: "full",
                hits: vec![hit("x", 99)],
                metadata: None,
            }),
        ]);
        let hits = orchestrator
            .search("Alpha", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(hits[0].musicbrainz_id, "x");
    }

    #[tokio::test]
    async fn test_fetch_metadata_merges_and_tolerates_failures() {
        let orchestrator = MetadataOrchestrator::new(vec![
            Arc::new(Scripted {
                name: "down",
                hits: vec![],
                metadata: None,
            }),
            Arc::new(Scripted {
                name: "mb",
                hits: vec![],
                metadata: Some(ArtistMetadata {
                    genres: vec!["rock".to_string()],
                    formed: Some("1990".to_string()),
                    ..Default::default()
                }),
            }),
            Arc::new(Scripted {
                name: "lastfm",
                hits: vec![],
                metadata: Some(ArtistMetadata {
                    biography: Some("Bio".to_string()),
                    genres: vec!["pop".to_string()],
                    ..Default::default()
                }),
            }),
        ]);
        let merged = orchestrator
            .fetch_metadata("mbid", "Alpha", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(merged.genres, vec!["rock".to_string()]);
        assert_eq!(merged.biography.as_deref(), Some("Bio"));
        assert_eq!(merged.formed.as_deref(), Some("1990"));
    }

    #[tokio::test]
    async fn test_fetch_metadata_fails_when_all_fail() {
        let orchestrator = MetadataOrchestrator::new(vec![Arc::new(Scripted {
            name: "down",
            hits: vec![],
            metadata: None,
        })]);
        assert!(orchestrator
            .fetch_metadata("mbid", "Alpha", &CancellationToken::new())
            .await
            .is_err());
        let empty = MetadataOrchestrator::new(vec![]);
        assert!(empty
            .fetch_metadata("mbid", "Alpha", &CancellationToken::new())
            .await
            .is_err());
    }
}
