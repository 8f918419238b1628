//! MusicBrainz API client for artist search and core metadata.
//!
//! Rate limited to roughly one request per second per MusicBrainz API policy.

use super::{ArtistMetadata, ArtistSearchHit, MetadataProvider, RateLimiter};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MUSICBRAINZ_API_BASE: &str = "https://musicbrainz.org/ws/2";
const SEARCH_LIMIT: usize = 5;

pub struct MusicBrainzClient {
    client: Client,
    base_url: String,
    limiter: RateLimiter,
}

#[derive(Deserialize)]
struct ArtistSearchResponse {
    artists: Option<Vec<MbSearchArtist>>,
}

#[derive(Deserialize)]
struct MbSearchArtist {
    id: String,
    name: String,
    #[serde(default)]
    score: Option<u32>,
    #[serde(default)]
    disambiguation: Option<String>,
}

#[derive(Deserialize)]
struct MbLifeSpan {
    begin: Option<String>,
}

#[derive(Deserialize)]
struct MbGenre {
    name: String,
    #[serde(default)]
    count: i64,
}

#[derive(Deserialize)]
struct ArtistLookupResponse {
    id: String,
    #[serde(rename = "sort-name")]
    sort_name: Option<String>,
    disambiguation: Option<String>,
    #[serde(rename = "life-span")]
    life_span: Option<MbLifeSpan>,
    #[serde(default)]
    genres: Vec<MbGenre>,
}

fn parse_search(body: ArtistSearchResponse) -> Vec<ArtistSearchHit> {
    let mut hits: Vec<ArtistSearchHit> = body
        .artists
        .unwrap_or_default()
        .into_iter()
        .map(|a| ArtistSearchHit {
            musicbrainz_id: a.id,
            name: a.name,
            disambiguation: a.disambiguation.filter(|d| !d.is_empty()),
            score: a.score.unwrap_or(0),
        })
        .collect();
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits
}

fn parse_lookup(body: ArtistLookupResponse) -> ArtistMetadata {
    let mut genres = body.genres;
    genres.sort_by(|a, b| b.count.cmp(&a.count));
    ArtistMetadata {
        musicbrainz_id: Some(body.id),
        sort_name: body.sort_name.filter(|s| !s.is_empty()),
        biography: None,
        genres: genres.into_iter().map(|g| g.name).collect(),
        formed: body
            .life_span
            .and_then(|ls| ls.begin)
            .filter(|b| !b.is_empty()),
        disambiguation: body.disambiguation.filter(|d| !d.is_empty()),
        audiodb_id: None,
    }
}

impl MusicBrainzClient {
    pub fn new(user_agent: &str, interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: MUSICBRAINZ_API_BASE.to_string(),
            limiter: RateLimiter::new(interval),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        self.limiter.wait(cancel).await?;
        debug!("MusicBrainz GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach MusicBrainz")?;

        if !response.status().is_success() {
            bail!("MusicBrainz request failed with status {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse MusicBrainz response")
    }
}

#[async_trait]
impl MetadataProvider for MusicBrainzClient {
    fn name(&self) -> &'static str {
        "musicbrainz"
    }

    async fn search(&self, name: &str, cancel: &CancellationToken) -> Result<Vec<ArtistSearchHit>> {
        let query = format!("artist:\"{}\"", name.replace('"', ""));
        let url = format!(
            "{}/artist/?query={}&fmt=json&limit={}",
            self.base_url,
            urlencoding::encode(&query),
            SEARCH_LIMIT
        );
        let body: ArtistSearchResponse = self.get_json(&url, cancel).await?;
        Ok(parse_search(body))
    }

    async fn fetch_metadata(
        &self,
        musicbrainz_id: &str,
        _name: &str,
        cancel: &CancellationToken,
    ) -> Result<ArtistMetadata> {
        let url = format!(
            "{}/artist/{}?inc=genres&fmt=json",
            self.base_url,
            urlencoding::encode(musicbrainz_id)
        );
        let body: ArtistLookupResponse = self.get_json(&url, cancel).await?;
        Ok(parse_lookup(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_orders_by_score() {
        let json = r#"{
            "artists": [
                {"id": "b", "name": "Bends", "score": 70},
                {"id": "a", "name": "Bends", "score": 100, "disambiguation": "UK rock band"},
                {"id": "c", "name": "Bendz", "disambiguation": ""}
            ]
        }"#;
        let body: ArtistSearchResponse = serde_json::from_str(json).unwrap();
        let hits = parse_search(body);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].musicbrainz_id, "a");
        assert_eq!(hits[0].disambiguation.as_deref(), Some("UK rock band"));
        assert_eq!(hits[2].score, 0);
        assert!(hits[2].disambiguation.is_none());
    }

    #[test]
    fn test_parse_lookup() {
        let json = r#"{
            "id": "mbid-1",
            "name": "Alpha",
            "sort-name": "Alpha, The",
            "disambiguation": "",
            "life-span": {"begin": "1991", "end": null},
            "genres": [
                {"name": "pop", "count": 1},
                {"name": "shoegaze", "count": 5}
            ]
        }"#;
        let body: ArtistLookupResponse = serde_json::from_str(json).unwrap();
        let meta = parse_lookup(body);
        assert_eq!(meta.musicbrainz_id.as_deref(), Some("mbid-1"));
        assert_eq!(meta.sort_name.as_deref(), Some("Alpha, The"));
        assert_eq!(meta.formed.as_deref(), Some("1991"));
        assert!(meta.disambiguation.is_none());
        assert_eq!(meta.genres, vec!["shoegaze".to_string(), "pop".to_string()]);
    }

    #[test]
    fn test_empty_search_response() {
        let body: ArtistSearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parse_search(body).is_empty());
    }
}
