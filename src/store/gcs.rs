//! Google Cloud Storage JSON API client.
//!
//! Covers exactly the two calls the watcher makes: bucket listing
//! (`/storage/v1/b/{bucket}/o`) and media download (`?alt=media`). Auth is
//! an optional bearer token; public buckets work anonymously.

use crate::config::WatcherConfig;
use crate::error::{PrompterError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::{ObjectInfo, ObjectStore};

/// Configuration for the GCS client.
#[derive(Debug, Clone)]
pub struct GcsConfig {
    /// Bucket name.
    pub bucket: String,
    /// Optional bearer token. Empty means anonymous access.
    pub token: String,
    /// Base URL (defaults to the public endpoint).
    pub base_url: String,
}

impl GcsConfig {
    /// Create a new config for the given bucket.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            token: String::new(),
            base_url: "https://storage.googleapis.com".into(),
        }
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Set a custom base URL (used by tests to point at a mock server).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl From<&WatcherConfig> for GcsConfig {
    fn from(config: &WatcherConfig) -> Self {
        Self::new(config.bucket.clone()).with_token(config.token.clone())
    }
}

/// One page of a bucket listing.
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListedObject>,
}

/// Object entry as the JSON API reports it.
///
/// `size` arrives as a decimal string, not a number.
#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(rename = "timeCreated")]
    time_created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
}

/// GCS-backed implementation of [`ObjectStore`].
pub struct GcsClient {
    config: GcsConfig,
    client: reqwest::Client,
}

impl GcsClient {
    #[must_use]
    pub fn new(config: GcsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn list_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!(
            "{base}/storage/v1/b/{bucket}/o",
            bucket = self.config.bucket
        )
    }

    fn media_url(&self, name: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!(
            "{base}/storage/v1/b/{bucket}/o/{object}?alt=media",
            bucket = self.config.bucket,
            object = urlencoding::encode(name)
        )
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.config.token)
        }
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn list_objects(&self) -> Result<Vec<ObjectInfo>> {
        let response = self
            .authorize(self.client.get(self.list_url()))
            .send()
            .await
            .map_err(|e| PrompterError::Ingest(format!("bucket listing failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PrompterError::Ingest(format!(
                "bucket listing returned {status}"
            )));
        }

        let parsed: ListResponse = response
            .json()
            .await
            .map_err(|e| PrompterError::Ingest(format!("invalid listing response: {e}")))?;

        Ok(parsed
            .items
            .into_iter()
            .map(|item| ObjectInfo {
                name: item.name,
                size: item
                    .size
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                created: item.time_created,
                updated: item.updated,
            })
            .collect())
    }

    async fn download(&self, name: &str, dest: &Path) -> Result<PathBuf> {
        let response = self
            .authorize(self.client.get(self.media_url(name)))
            .send()
            .await
            .map_err(|e| PrompterError::Ingest(format!("download of {name} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PrompterError::Ingest(format!(
                "download of {name} returned {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PrompterError::Ingest(format!("download of {name} truncated: {e}")))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PrompterError::Ingest(format!("cannot create download dir: {e}")))?;
        }
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| PrompterError::Ingest(format!("cannot write {}: {e}", dest.display())))?;

        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn media_url_percent_encodes_object_names() {
        let client = GcsClient::new(
            GcsConfig::new("shots").with_base_url("http://localhost:1"),
        );
        assert_eq!(
            client.media_url("dir/shot 1.png"),
            "http://localhost:1/storage/v1/b/shots/o/dir%2Fshot%201.png?alt=media"
        );
    }

    #[test]
    fn listing_parses_string_sizes_and_timestamps() {
        let raw = r#"{
            "items": [{
                "name": "shot_20250101_090000.png",
                "size": "2048",
                "timeCreated": "2025-01-01T09:00:00Z",
                "updated": "2025-01-01T09:00:05Z"
            }]
        }"#;
        let parsed: ListResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].size.as_deref(), Some("2048"));
        assert!(parsed.items[0].time_created.is_some());
    }
}
