//! fanart.tv client for artist artwork.

use super::{ImageProvider, RateLimiter};
use crate::artist::ImageType;
use crate::rules::ImageCandidate;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const FANARTTV_API_BASE: &str = "https://webservice.fanart.tv/v3/music";
const SOURCE: &str = "fanart.tv";

pub struct FanartTvClient {
    client: Client,
    api_key: String,
    limiter: RateLimiter,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct MusicImagesResponse {
    artistthumb: Vec<FanartImage>,
    artistbackground: Vec<FanartImage>,
    hdmusiclogo: Vec<FanartImage>,
    musiclogo: Vec<FanartImage>,
    musicbanner: Vec<FanartImage>,
}

#[derive(Deserialize)]
struct FanartImage {
    url: String,
    #[serde(default)]
    likes: Option<String>,
    #[serde(default)]
    lang: Option<String>,
}

fn to_candidates(images: Vec<FanartImage>, image_type: ImageType) -> Vec<ImageCandidate> {
    images
        .into_iter()
        .map(|img| ImageCandidate {
            url: img.url,
            // fanart.tv does not report dimensions
            width: 0,
            height: 0,
            likes: img.likes.and_then(|l| l.parse().ok()).unwrap_or(0),
            source: SOURCE.to_string(),
            image_type,
            language: img.lang.filter(|l| !l.is_empty() && l != "00"),
        })
        .collect()
}

fn parse_images(body: MusicImagesResponse) -> Vec<ImageCandidate> {
    let mut candidates = to_candidates(body.artistthumb, ImageType::Thumb);
    candidates.extend(to_candidates(body.artistbackground, ImageType::Fanart));
    // HD logos first, they are the better source
    candidates.extend(to_candidates(body.hdmusiclogo, ImageType::Logo));
    candidates.extend(to_candidates(body.musiclogo, ImageType::Logo));
    candidates.extend(to_candidates(body.musicbanner, ImageType::Banner));
    candidates
}

impl FanartTvClient {
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
impl ImageProvider for FanartTvClient {
    fn name(&self) -> &'static str {
        SOURCE
    }

    async fn fetch_images(
        &self,
        musicbrainz_id: &str,
        _secondary_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImageCandidate>> {
        self.limiter.wait(cancel).await?;

        let url = format!(
            "{}/{}?api_key={}",
            FANARTTV_API_BASE,
            urlencoding::encode(musicbrainz_id),
            self.api_key
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach fanart.tv")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            bail!("fanart.tv request failed with status {}", response.status());
        }

        let body: MusicImagesResponse = response
            .json()
            .await
            .context("Failed to parse fanart.tv response")?;
        Ok(parse_images(body))
    }
}
