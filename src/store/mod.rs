//! Remote object store boundary.
//!
//! The watcher only needs two operations: list what exists, download one
//! object. Anything resembling provider mechanics lives behind
//! [`ObjectStore`].

pub mod gcs;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub use gcs::{GcsClient, GcsConfig};

/// One entry of a remote object listing.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Full object name as listed (may contain `/` separators).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Creation time reported by the store.
    pub created: Option<DateTime<Utc>>,
    /// Last-updated time reported by the store.
    pub updated: Option<DateTime<Utc>>,
}

/// Listing + download against a remote object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List all objects in the configured bucket.
    ///
    /// # Errors
    ///
    /// Returns an ingest error if the listing request fails.
    async fn list_objects(&self) -> Result<Vec<ObjectInfo>>;

    /// Download one object to `dest`, returning the local path written.
    ///
    /// # Errors
    ///
    /// Returns an ingest error if the download fails or the file cannot be
    /// written.
    async fn download(&self, name: &str, dest: &Path) -> Result<PathBuf>;
}
