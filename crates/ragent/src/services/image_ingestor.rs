use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ImagesConfig;
use crate::models::{ChannelInfo, CommunityId, LogEntry};
use crate::store::{ConversationStore, StoreError};

/// A downloaded attachment ready to be remembered
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub source_url: String,
    pub cache_path: PathBuf,
    /// `data:image/<ext>;base64,<bytes>`
    pub data_uri: String,
}

pub struct ImageIngestor {
    client: Client,
    cache_dir: PathBuf,
}

impl ImageIngestor {
    pub fn new(config: &ImagesConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create image HTTP client")?;
        Ok(Self {
            client,
            cache_dir: config.cache_dir.clone(),
        })
    }

    /// Fetch every URL concurrently; the result lines up with `urls` and holds
    /// `None` wherever that download failed.
    pub async fn fetch_all(&self, urls: &[String]) -> Vec<Option<EncodedImage>> {
        join_all(urls.iter().map(|url| self.fetch_one(url))).await
    }

    async fn fetch_one(&self, url: &str) -> Option<EncodedImage> {
        match self.try_fetch(url).await {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("Skipping image {}: {:#}", url, e);
                None
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<EncodedImage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Image request failed")?
            .error_for_status()
            .context("Image server returned an error status")?;

        let bytes = response.bytes().await.context("Failed to read image body")?;
        let kind = infer::get(&bytes)
            .filter(|k| k.matcher_type() == infer::MatcherType::Image)
            .context("Downloaded content is not an image")?;

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.cache_dir.display()))?;

        let cache_path = self.cache_dir.join(cache_file_name(url));
        tokio::fs::write(&cache_path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", cache_path.display()))?;
        let stored = tokio::fs::read(&cache_path)
            .await
            .with_context(|| format!("Failed to read back {}", cache_path.display()))?;

        let ext = url_extension(url).unwrap_or_else(|| kind.extension().to_string());
        debug!(
            "Cached image {} ({} bytes) at {}",
            url,
            stored.len(),
            cache_path.display()
        );

        Ok(EncodedImage {
            source_url: url.to_string(),
            cache_path,
            data_uri: format!("data:image/{};base64,{}", ext, STANDARD.encode(&stored)),
        })
    }

    /// Append one image entry per successful download, skipping failures.
    /// Returns the appended entries.
    pub fn remember_images(
        &self,
        store: &dyn ConversationStore,
        community_id: CommunityId,
        posted_at: DateTime<Utc>,
        author: &str,
        channel: &ChannelInfo,
        images: &[Option<EncodedImage>],
    ) -> Result<Vec<LogEntry>, StoreError> {
        let entries: Vec<LogEntry> = images
            .iter()
            .flatten()
            .map(|image| {
                LogEntry::image(
                    posted_at,
                    author,
                    channel,
                    image.cache_path.display().to_string(),
                    image.data_uri.clone(),
                )
            })
            .collect();

        store.append_all(community_id, entries.clone())?;
        Ok(entries)
    }
}

/// Last path segment without query or fragment, reduced to safe characters
fn source_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let name = path.rsplit('/').next().unwrap_or_default();
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.trim_matches('.').is_empty() {
        "image".to_string()
    } else {
        sanitized
    }
}

fn cache_file_name(url: &str) -> String {
    let prefix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", &prefix[..8], source_file_name(url))
}

fn url_extension(url: &str) -> Option<String> {
    let name = source_file_name(url);
    let (stem, ext) = name.rsplit_once('.')?;
    let valid = !stem.is_empty()
        && (1..=5).contains(&ext.len())
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}
