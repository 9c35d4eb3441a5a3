//! Remote ingest watcher: polls an object store for freshly uploaded
//! screenshots and turns each into exactly one image utterance.
//!
//! Per cycle only the single newest candidate is evaluated; the polling
//! cadence and the one-screenshot-at-a-time use case keep per-cycle cost to
//! at most one download.

pub mod registry;

use crate::error::{PrompterError, Result};
use crate::pipeline::messages::{ImageMeta, Utterance};
use crate::runtime::{RuntimeEvent, Severity};
use crate::store::{ObjectInfo, ObjectStore};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub use registry::SeenRegistry;

/// Polls a remote store and emits deduplicated image utterances.
pub struct RemoteIngestWatcher {
    store: Arc<dyn ObjectStore>,
    registry: SeenRegistry,
    download_dir: PathBuf,
    /// Lowercase extension (no dot) that marks an image object.
    image_extension: String,
    poll_interval: Duration,
    utterance_tx: mpsc::UnboundedSender<Utterance>,
    events_tx: broadcast::Sender<RuntimeEvent>,
    /// Name of the object last skipped by the cutoff filter, to demote the
    /// repeat log line to debug.
    last_cutoff_skip: Option<String>,
}

impl RemoteIngestWatcher {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: SeenRegistry,
        download_dir: PathBuf,
        image_extension: String,
        poll_interval: Duration,
        utterance_tx: mpsc::UnboundedSender<Utterance>,
        events_tx: broadcast::Sender<RuntimeEvent>,
    ) -> Self {
        Self {
            store,
            registry,
            download_dir,
            image_extension: image_extension.to_ascii_lowercase(),
            poll_interval,
            utterance_tx,
            events_tx,
            last_cutoff_skip: None,
        }
    }

    /// Run the poll loop until cancelled.
    ///
    /// Cancellation is cooperative: a cycle in progress finishes before the
    /// loop exits.
    pub fn run(mut self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "watching remote store every {}s for new .{} objects",
                self.poll_interval.as_secs(),
                self.image_extension
            );
            let mut ticker = tokio::time::interval(self.poll_interval);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.poll_once().await {
                            // Registry untouched on failure, so the same
                            // object is retried next cycle.
                            error!("poll cycle failed: {e}");
                        }
                    }
                }
            }
            info!("remote ingest watcher stopped");
        })
    }

    /// Run one poll cycle; returns the name ingested this cycle, if any.
    ///
    /// # Errors
    ///
    /// Returns an ingest error when listing, timestamp derivation, or the
    /// download fails; the seen set is left unchanged in every error path.
    pub async fn poll_once(&mut self) -> Result<Option<String>> {
        let objects = self.store.list_objects().await?;

        let suffix = format!(".{}", self.image_extension);
        let mut candidates: Vec<ObjectInfo> = objects
            .into_iter()
            .filter(|o| o.name.to_ascii_lowercase().ends_with(&suffix))
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }

        // Newest-only: later candidates are never revisited once something
        // newer exists, so at most one download happens per cycle.
        candidates.sort_by_key(|o| o.created.unwrap_or(DateTime::<Utc>::MIN_UTC));
        let newest = match candidates.pop() {
            Some(newest) => newest,
            None => return Ok(None),
        };

        let image_name = basename(&newest.name).to_owned();
        let derived = derive_name_stamp(&image_name)?;

        if self.registry.contains(&image_name) {
            return Ok(None);
        }

        if let Some(cutoff) = self.registry.cutoff()
            && derived < cutoff
        {
            // Not marked seen: if it resurfaces as the newest it is
            // re-evaluated (and re-skipped) on purpose.
            if self.last_cutoff_skip.as_deref() == Some(image_name.as_str()) {
                debug!("skipping old file: {image_name}");
            } else {
                info!("skipping old file: {image_name}");
                self.last_cutoff_skip = Some(image_name.clone());
            }
            return Ok(None);
        }

        info!("new image object detected: {}", newest.name);
        let local_path = self
            .store
            .download(&newest.name, &self.download_dir.join(&image_name))
            .await?;
        info!("downloaded to: {}", local_path.display());

        // Seen if and only if downloaded and handed to the dispatcher.
        self.registry.record(&image_name)?;

        let _ = self.events_tx.send(RuntimeEvent::ImageListItem {
            name: image_name.clone(),
            timestamp: Utc::now(),
        });
        let _ = self.events_tx.send(RuntimeEvent::Status {
            message: format!("New image detected: {image_name}"),
            severity: Severity::Notice,
        });

        let utterance = Utterance::image(
            local_path,
            ImageMeta {
                remote_name: image_name.clone(),
                size: newest.size,
                created: newest.created,
                updated: newest.updated,
            },
        );
        if self.utterance_tx.send(utterance).is_err() {
            return Err(PrompterError::Channel(
                "utterance channel closed".to_owned(),
            ));
        }

        Ok(Some(image_name))
    }

    #[cfg(test)]
    fn registry(&self) -> &SeenRegistry {
        &self.registry
    }
}

fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Derive an object's creation time from the stamp embedded in its name.
///
/// Names look like `shot_20250101_090000.png`: a date segment and a time
/// segment separated by underscores, the time segment carrying a trailing
/// extension.
///
/// # Errors
///
/// Returns an ingest error when the name does not carry a parseable stamp.
fn derive_name_stamp(image_name: &str) -> Result<DateTime<Utc>> {
    let mut segments = image_name.split('_');
    let _prefix = segments.next();
    let (Some(date), Some(time)) = (segments.next(), segments.next()) else {
        return Err(PrompterError::Ingest(format!(
            "object name carries no timestamp: {image_name}"
        )));
    };
    let time = time.get(..6).ok_or_else(|| {
        PrompterError::Ingest(format!("object name carries no timestamp: {image_name}"))
    })?;

    let stamp = format!("{date}_{time}");
    let naive = NaiveDateTime::parse_from_str(&stamp, "%Y%m%d_%H%M%S").map_err(|e| {
        PrompterError::Ingest(format!("bad timestamp in object name {image_name}: {e}"))
    })?;
    Ok(naive.and_utc())
}
