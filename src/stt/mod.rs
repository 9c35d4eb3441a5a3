//! Streaming transcription boundary.
//!
//! The segmenter consumes a stream of turn events; how those events are
//! produced (which vendor, which transport) stays behind
//! [`StreamingTranscriber`]. The bundled implementation is a realtime
//! WebSocket client in [`realtime`].

pub mod realtime;

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use realtime::RealtimeTranscriber;

/// Events fired by an upstream streaming session.
#[derive(Debug, Clone)]
pub enum TranscriberEvent {
    /// Session handshake completed.
    Begin { id: String },
    /// One turn update; `end_of_turn` marks explicit finalization.
    Turn { text: String, end_of_turn: bool },
    /// Clean session end, with the audio duration the service processed.
    Terminated { audio_duration_seconds: f64 },
    /// Transport or protocol failure; the session is over.
    Error(String),
}

/// Lifecycle of one transcription session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Streaming,
    /// Ended cleanly by the service.
    Terminated,
    /// Ended by an operator stop command.
    Stopped,
    /// Ended by a transport failure.
    Errored,
}

/// An upstream streaming transcription service.
#[async_trait]
pub trait StreamingTranscriber: Send + Sync {
    /// Open a session, pump it until it ends, and tear it down.
    ///
    /// Events are delivered on `events_tx` as they arrive. The call returns
    /// when the service terminates the session, the transport fails, or
    /// `cancel` fires. Implementations must disconnect the underlying
    /// session on every exit path, including errors.
    ///
    /// # Errors
    ///
    /// Returns a transport error when connect or streaming fails. The error
    /// has already been mirrored as [`TranscriberEvent::Error`] on
    /// `events_tx`.
    async fn run_session(
        &self,
        events_tx: mpsc::UnboundedSender<TranscriberEvent>,
        cancel: CancellationToken,
    ) -> Result<()>;
}
