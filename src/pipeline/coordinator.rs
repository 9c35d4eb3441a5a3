//! Orchestrates producers, the dispatcher, and operator commands.
//!
//! The coordinator owns a single select loop: control commands mutate
//! session and gate state, finalized utterances flow to the dispatcher, and
//! a session-done signal distinguishes an operator stop from a session that
//! died on its own. Collaborators that are not configured simply degrade to
//! absent; nothing here is fatal to the rest of the pipeline.

use crate::config::AppConfig;
use crate::error::Result;
use crate::llm::{GeminiClient, GeminiConfig, GenerativeModel};
use crate::pipeline::dispatcher::GatedDispatcher;
use crate::pipeline::messages::Utterance;
use crate::pipeline::segmenter::TurnSegmenter;
use crate::runtime::{RuntimeEvent, Severity};
use crate::store::{GcsClient, GcsConfig, ObjectStore};
use crate::stt::{RealtimeTranscriber, SessionPhase, StreamingTranscriber, TranscriberEvent};
use crate::watcher::{RemoteIngestWatcher, SeenRegistry};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Operator commands, synchronous with respect to the command handler and
/// asynchronous with respect to in-flight work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    StartSession,
    StopSession,
    SetFrozen(bool),
}

/// One row of the processed-image list (latest first).
#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub name: String,
    pub local_path: PathBuf,
    pub created: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
}

/// Handles to one live transcription session.
struct ActiveSession {
    cancel: CancellationToken,
}

/// Wires the segmenter, watcher, and dispatcher to a control channel and
/// the event sink.
pub struct Coordinator {
    config: AppConfig,
    cancel: CancellationToken,
    events_tx: broadcast::Sender<RuntimeEvent>,
    model: Option<Arc<dyn GenerativeModel>>,
    transcriber: Option<Arc<dyn StreamingTranscriber>>,
    store: Option<Arc<dyn ObjectStore>>,
    image_list: Arc<Mutex<Vec<ImageEntry>>>,
}

impl Coordinator {
    /// Build a coordinator with real collaborators where configured.
    ///
    /// Missing credentials degrade the affected component to absent rather
    /// than failing construction.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let (events_tx, _) = broadcast::channel(256);

        let model: Option<Arc<dyn GenerativeModel>> = if config.model.api_key.trim().is_empty() {
            warn!("no model API key configured; dispatching disabled");
            None
        } else {
            Some(Arc::new(GeminiClient::new(GeminiConfig::from(&config.model))))
        };

        let transcriber: Option<Arc<dyn StreamingTranscriber>> =
            if config.stt.api_key.trim().is_empty() {
                warn!("no transcription API key configured; sessions disabled");
                None
            } else {
                Some(Arc::new(RealtimeTranscriber::new(config.stt.clone())))
            };

        let store: Option<Arc<dyn ObjectStore>> = if config.watcher.bucket.trim().is_empty() {
            info!("no bucket configured; remote ingest disabled");
            None
        } else {
            Some(Arc::new(GcsClient::new(GcsConfig::from(&config.watcher))))
        };

        Self {
            config,
            cancel: CancellationToken::new(),
            events_tx,
            model,
            transcriber,
            store,
            image_list: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replace the generative model (tests, alternative providers).
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn GenerativeModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Replace the streaming transcriber.
    #[must_use]
    pub fn with_transcriber(mut self, transcriber: Arc<dyn StreamingTranscriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Replace the remote object store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Subscribe to the event sink.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events_tx.subscribe()
    }

    /// Shared handle to the processed-image list (latest first).
    #[must_use]
    pub fn image_list(&self) -> Arc<Mutex<Vec<ImageEntry>>> {
        Arc::clone(&self.image_list)
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Get a clone of the cancellation token for external use.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled or the control channel closes.
    ///
    /// # Errors
    ///
    /// Currently infallible at runtime; the `Result` reserves the right to
    /// fail on startup wiring.
    pub async fn run(self, mut control_rx: mpsc::UnboundedReceiver<ControlCommand>) -> Result<()> {
        let (utterance_tx, mut utterance_rx) = mpsc::unbounded_channel::<Utterance>();
        let (session_done_tx, mut session_done_rx) = mpsc::unbounded_channel::<()>();

        let dispatcher = self
            .model
            .clone()
            .map(|model| GatedDispatcher::new(model, self.events_tx.clone()));

        // The ingestion cutoff is the process's own start time: screenshots
        // already in the bucket before launch are never answered.
        let start_time = Utc::now();
        if let (Some(store), Some(_)) = (&self.store, &dispatcher) {
            let registry = SeenRegistry::load(&self.config.watcher.state_path, Some(start_time));
            let watcher = RemoteIngestWatcher::new(
                Arc::clone(store),
                registry,
                self.config.watcher.download_dir.clone(),
                self.config.watcher.image_extension.clone(),
                Duration::from_secs(self.config.watcher.poll_interval_secs.max(1)),
                utterance_tx.clone(),
                self.events_tx.clone(),
            );
            watcher.run(self.cancel.child_token());
            info!("only processing images uploaded after: {start_time}");
        } else if self.store.is_some() {
            warn!("bucket configured but no model available; remote ingest disabled");
        }

        let mut session: Option<ActiveSession> = None;
        let mut recording = false;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,

                cmd = control_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    match cmd {
                        ControlCommand::StartSession => {
                            self.handle_start(&mut session, &mut recording, &utterance_tx, &session_done_tx);
                        }
                        ControlCommand::StopSession => {
                            self.handle_stop(&mut session, &mut recording);
                        }
                        ControlCommand::SetFrozen(frozen) => {
                            self.handle_set_frozen(dispatcher.as_ref(), frozen);
                        }
                    }
                }

                utterance = utterance_rx.recv() => {
                    let Some(utterance) = utterance else { break };
                    if let Utterance::Image { local_path, meta, .. } = &utterance {
                        let entry = ImageEntry {
                            name: meta.remote_name.clone(),
                            local_path: local_path.clone(),
                            created: meta.created,
                            ingested_at: Utc::now(),
                        };
                        // Latest first, matching the display order.
                        self.image_list
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .insert(0, entry);
                    }
                    match &dispatcher {
                        // Fire-and-forget: the producer never waits on the
                        // dispatch, and freezing is checked inside the task.
                        Some(dispatcher) => { let _handle = dispatcher.dispatch(utterance); }
                        None => debug!("no model configured, dropping utterance"),
                    }
                }

                done = session_done_rx.recv() => {
                    let Some(()) = done else { break };
                    if recording {
                        // The session ended without an operator stop.
                        recording = false;
                        session = None;
                        self.status("Recording stopped unexpectedly", Severity::Warning);
                        let _ = self.events_tx.send(RuntimeEvent::RecordingState { active: false });
                    }
                }
            }
        }

        // Leave any live session cleanly; in-flight dispatches are not
        // cancelled, only new ones stop arriving once this task exits.
        if let Some(session) = session.take() {
            session.cancel.cancel();
        }
        info!("coordinator shut down");
        Ok(())
    }

    fn handle_start(
        &self,
        session: &mut Option<ActiveSession>,
        recording: &mut bool,
        utterance_tx: &mpsc::UnboundedSender<Utterance>,
        session_done_tx: &mpsc::UnboundedSender<()>,
    ) {
        let Some(transcriber) = self.transcriber.clone() else {
            self.status("Transcription is not configured", Severity::Error);
            return;
        };
        if *recording {
            self.status("Already recording", Severity::Error);
            return;
        }

        // Tear down any stale session handle before reconnecting.
        if let Some(stale) = session.take() {
            stale.cancel.cancel();
        }

        *recording = true;
        self.status("Recording... Speak into your microphone", Severity::Notice);
        let _ = self
            .events_tx
            .send(RuntimeEvent::RecordingState { active: true });

        let session_cancel = self.cancel.child_token();
        // Restarting always gets a fresh segmentation state.
        let segmenter = Arc::new(TurnSegmenter::new(
            Duration::from_secs_f64(self.config.stt.debounce_secs),
            utterance_tx.clone(),
            self.events_tx.clone(),
            session_cancel.clone(),
        ));

        let (transcriber_tx, transcriber_rx) = mpsc::unbounded_channel::<TranscriberEvent>();

        {
            let cancel = session_cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = transcriber.run_session(transcriber_tx, cancel).await {
                    // Already mirrored on the sink by the session pump.
                    warn!("transcription session ended with error: {e}");
                }
            });
        }
        tokio::spawn(run_session_pump(
            transcriber_rx,
            segmenter,
            self.events_tx.clone(),
            session_done_tx.clone(),
            session_cancel.clone(),
        ));

        *session = Some(ActiveSession {
            cancel: session_cancel,
        });
    }

    fn handle_stop(&self, session: &mut Option<ActiveSession>, recording: &mut bool) {
        if self.transcriber.is_none() {
            self.status("Transcription is not configured", Severity::Error);
            return;
        }

        *recording = false;
        if let Some(active) = session.take() {
            active.cancel.cancel();
        }
        self.status("Recording stopped", Severity::Info);
        let _ = self
            .events_tx
            .send(RuntimeEvent::RecordingState { active: false });
    }

    fn handle_set_frozen(&self, dispatcher: Option<&GatedDispatcher>, frozen: bool) {
        let Some(dispatcher) = dispatcher else {
            self.status("AI is not configured", Severity::Error);
            return;
        };

        dispatcher.set_frozen(frozen);
        if frozen {
            self.status("AI responses frozen", Severity::Warning);
        } else {
            self.status("AI responses active", Severity::Success);
        }
        let _ = self.events_tx.send(RuntimeEvent::FreezeState { frozen });
    }

    fn status(&self, message: &str, severity: Severity) {
        let _ = self.events_tx.send(RuntimeEvent::Status {
            message: message.to_owned(),
            severity,
        });
    }
}

/// Consume upstream session events until the session ends, then clean up.
///
/// Cleanup (cancelling the pending debounce timer, discarding segmentation
/// state) runs on every exit path: clean termination, transport error, and
/// operator cancellation alike.
async fn run_session_pump(
    mut events_rx: mpsc::UnboundedReceiver<TranscriberEvent>,
    segmenter: Arc<TurnSegmenter>,
    events_tx: broadcast::Sender<RuntimeEvent>,
    session_done_tx: mpsc::UnboundedSender<()>,
    cancel: CancellationToken,
) {
    let mut phase = SessionPhase::Connecting;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                phase = SessionPhase::Stopped;
                break;
            }
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    TranscriberEvent::Begin { id } => {
                        phase = SessionPhase::Streaming;
                        let _ = events_tx.send(RuntimeEvent::Status {
                            message: format!("Session started: {id}"),
                            severity: Severity::Success,
                        });
                    }
                    TranscriberEvent::Turn { text, end_of_turn } => {
                        segmenter.on_update(&text, end_of_turn);
                    }
                    TranscriberEvent::Terminated { audio_duration_seconds } => {
                        phase = SessionPhase::Terminated;
                        let _ = events_tx.send(RuntimeEvent::Status {
                            message: format!(
                                "Session terminated: {audio_duration_seconds} seconds processed"
                            ),
                            severity: Severity::Info,
                        });
                    }
                    TranscriberEvent::Error(message) => {
                        phase = SessionPhase::Errored;
                        let _ = events_tx.send(RuntimeEvent::Status {
                            message: format!("Error: {message}"),
                            severity: Severity::Error,
                        });
                    }
                }
            }
        }
    }

    segmenter.stop();
    debug!("session pump exiting in phase {phase:?}");
    let _ = session_done_tx.send(());
}
