//! Last.fm API client for artist biographies and tags.
//!
//! Rate limited to 5 requests per second per Last.fm API guidelines.

use super::{ArtistMetadata, ArtistSearchHit, MetadataProvider, RateLimiter};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";
const MAX_TAGS: usize = 5;

pub struct LastFmClient {
    client: Client,
    api_key: String,
    limiter: RateLimiter,
}

#[derive(Deserialize)]
struct ArtistInfoResponse {
    artist: Option<LastFmArtist>,
}

#[derive(Deserialize)]
struct LastFmArtist {
    bio: Option<LastFmBio>,
    tags: Option<LastFmTags>,
}

#[derive(Deserialize)]
struct LastFmBio {
    content: Option<String>,
    summary: Option<String>,
}

#[derive(Deserialize)]
struct LastFmTags {
    #[serde(default)]
    tag: Vec<LastFmTag>,
}

#[derive(Deserialize)]
struct LastFmTag {
    name: String,
}

/// Last.fm appends a "Read more on Last.fm" link to every biography.
fn clean_biography(text: &str) -> Option<String> {
    let cut = text.find("<a href=").unwrap_or(text.len());
    let cleaned = text[..cut].trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn parse_info(body: ArtistInfoResponse) -> ArtistMetadata {
    let Some(artist) = body.artist else {
        return ArtistMetadata::default();
    };
    let biography = artist.bio.and_then(|bio| {
        bio.content
            .as_deref()
            .and_then(clean_biography)
            .or_else(|| bio.summary.as_deref().and_then(clean_biography))
    });
    let genres = artist
        .tags
        .map(|t| t.tag.into_iter().take(MAX_TAGS).map(|t| t.name).collect())
        .unwrap_or_default();
    ArtistMetadata {
        biography,
        genres,
        ..Default::default()
    }
}

impl LastFmClient {
    pub fn new(api_key: &str, interval: Duration) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            limiter: RateLimiter::new(interval),
        })
    }
}

#[async_trait]
impl MetadataProvider for LastFmClient {
    fn name(&self) -> &'static str {
        "lastfm"
    }

    /// Last.fm search results carry no confidence score, so this provider
    /// never answers searches.
    async fn search(&self, _name: &str, _cancel: &CancellationToken) -> Result<Vec<ArtistSearchHit>> {
        Ok(Vec::new())
    }

    async fn fetch_metadata(
        &self,
        musicbrainz_id: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ArtistMetadata> {
        self.limiter.wait(cancel).await?;

        let selector = if musicbrainz_id.is_empty() {
            format!("artist={}", urlencoding::encode(name))
        } else {
            format!("mbid={}", urlencoding::encode(musicbrainz_id))
        };
        let url = format!(
            "{}?method=artist.getinfo&{}&api_key={}&format=json",
            LASTFM_API_BASE, selector, self.api_key
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach Last.fm")?;

        if !response.status().is_success() {
            bail!("Last.fm API failed with status {}", response.status());
        }

        let body: ArtistInfoResponse = response
            .json()
            .await
            .context("Failed to parse Last.fm response")?;
        Ok(parse_info(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_strips_read_more_link() {
        let json = r#"{
            "artist": {
                "name": "Alpha",
                "bio": {
                    "summary": "Short. <a href=\"https://www.last.fm/music/Alpha\">Read more on Last.fm</a>",
                    "content": "Alpha are a band from somewhere. <a href=\"https://www.last.fm/music/Alpha\">Read more on Last.fm</a>"
                },
                "tags": {"tag": [{"name": "indie"}, {"name": "dream pop"}]}
            }
        }"#;
        let body: ArtistInfoResponse = serde_json::from_str(json).unwrap();
        let meta = parse_info(body);
        assert_eq!(
            meta.biography.as_deref(),
            Some("Alpha are a band from somewhere.")
        );
        assert_eq!(meta.genres, vec!["indie".to_string(), "dream pop".to_string()]);
    }

    #[test]
    fn test_parse_info_falls_back_to_summary() {
        let json = r#"{"artist": {"bio": {"content": " <a href=\"x\">Read more</a>", "summary": "Summary only"}}}"#;
        let body: ArtistInfoResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parse_info(body).biography.as_deref(), Some("Summary only"));
    }

    #[test]
    fn test_parse_info_unknown_artist() {
        let body: ArtistInfoResponse = serde_json::from_str(r#"{"error": 6}"#).unwrap();
        assert_eq!(parse_info(body), ArtistMetadata::default());
    }
}
