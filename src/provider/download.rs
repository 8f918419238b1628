use super::{DownloadedImage, ImageDownloader};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Streams image downloads with a byte cap and an overall timeout, then
/// checks the content really is an image.
pub struct HttpImageDownloader {
    client: Client,
    max_bytes: u64,
    timeout: Duration,
}

impl HttpImageDownloader {
    pub fn new(user_agent: &str, max_bytes: u64, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            max_bytes,
            timeout,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to request {}", url))?;

        if !response.status().is_success() {
            bail!("Download of {} failed with status {}", url, response.status());
        }
        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                bail!(
                    "Image at {} is {} bytes, over the {} byte limit",
                    url,
                    length,
                    self.max_bytes
                );
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("Failed reading body of {}", url))?;
            if bytes.len() as u64 + chunk.len() as u64 > self.max_bytes {
                bail!("Image at {} exceeds the {} byte limit", url, self.max_bytes);
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

/// Accept only content that sniffs as an image.
pub(crate) fn sniff_image(bytes: &[u8]) -> Result<String> {
    match infer::get(bytes) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => {
            Ok(kind.mime_type().to_string())
        }
        Some(kind) => bail!("Downloaded content is {}, not an image", kind.mime_type()),
        None => bail!("Downloaded content type is unknown"),
    }
}

#[async_trait]
impl ImageDownloader for HttpImageDownloader {
    async fn download(&self, url: &str, cancel: &CancellationToken) -> Result<DownloadedImage> {
        debug!("Downloading image {}", url);
        let bytes = tokio::select! {
            _ = cancel.cancelled() => bail!("Download of {} cancelled", url),
            result = tokio::time::timeout(self.timeout, self.fetch(url)) => {
                result.with_context(|| format!("Download of {} timed out", url))??
            }
        };
        let mime_type = sniff_image(&bytes)?;
        Ok(DownloadedImage { bytes, mime_type })
    }
}
