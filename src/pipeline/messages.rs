//! Message types passed between pipeline stages.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Instant;

/// Metadata carried alongside a downloaded image.
#[derive(Debug, Clone)]
pub struct ImageMeta {
    /// Object name in the remote store (basename, no prefix).
    pub remote_name: String,
    /// Object size in bytes.
    pub size: u64,
    /// Creation time reported by the store.
    pub created: Option<DateTime<Utc>>,
    /// Last-updated time reported by the store.
    pub updated: Option<DateTime<Utc>>,
}

/// One finalized unit of user input, ready for dispatch.
///
/// Immutable after creation; consumed exactly once by the dispatcher.
#[derive(Debug, Clone)]
pub enum Utterance {
    /// A finalized spoken question.
    Text {
        text: String,
        /// When the producer finalized this utterance.
        produced_at: Instant,
    },
    /// A freshly ingested screenshot.
    Image {
        /// Local path of the downloaded payload.
        local_path: PathBuf,
        meta: ImageMeta,
        /// When the producer finalized this utterance.
        produced_at: Instant,
    },
}

impl Utterance {
    /// Create a text utterance stamped now.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            produced_at: Instant::now(),
        }
    }

    /// Create an image utterance stamped now.
    #[must_use]
    pub fn image(local_path: PathBuf, meta: ImageMeta) -> Self {
        Self::Image {
            local_path,
            meta,
            produced_at: Instant::now(),
        }
    }

    /// When the producer finalized this utterance.
    #[must_use]
    pub fn produced_at(&self) -> Instant {
        match self {
            Self::Text { produced_at, .. } | Self::Image { produced_at, .. } => *produced_at,
        }
    }
}
