//! Runtime events emitted by the pipeline for UI and observability.
//!
//! The sink is a typed broadcast channel: producers never know what is on
//! the other end (desktop window, browser socket, test harness), and a slow
//! or absent subscriber never blocks the pipeline.

use chrono::{DateTime, Utc};

/// Display weight of a status message.
///
/// Mirrors the status colors of the reference UI: black, green, blue,
/// orange, red.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Notice,
    Warning,
    Error,
}

/// Events that describe what the pipeline is doing "right now".
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Human-readable status line.
    Status { message: String, severity: Severity },
    /// A finalized utterance left the segmenter (live transcript display).
    Transcript(String),
    /// The just-classified fragment should be removed from the live display.
    ClearTranscript,
    /// Answer text for a spoken question.
    Answer(String),
    /// Answer text for an ingested screenshot.
    ImageAnswer {
        text: String,
        image_name: String,
        image_path: String,
    },
    /// A new screenshot entered the processed-image list.
    ImageListItem {
        name: String,
        timestamp: DateTime<Utc>,
    },
    /// Whether a transcription session is currently running.
    RecordingState { active: bool },
    /// Whether the dispatch gate is currently frozen.
    FreezeState { frozen: bool },
}
