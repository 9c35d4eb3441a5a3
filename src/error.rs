//! Error types for the prompter pipeline.

/// Top-level error type for the assistant pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PrompterError {
    /// Streaming transcription session connect/stream/disconnect failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Classifier / answer generator / vision model call failure.
    #[error("service error: {0}")]
    Service(String),

    /// Remote object listing or download failure.
    #[error("ingest error: {0}")]
    Ingest(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Persisted state (seen-set) read/write error.
    #[error("persist error: {0}")]
    Persist(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PrompterError>;
