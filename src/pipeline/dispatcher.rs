//! Gated dispatch: turns one utterance into at most one downstream result.
//!
//! Each dispatch is an independent spawned task so producers never wait on
//! service latency. The freeze gate is read per dispatch: freezing never
//! cancels in-flight work, it only blocks new work.

use crate::error::PrompterError;
use crate::llm::{
    AFFIRMATIVE_TOKEN, GenerativeModel, IMAGE_INSTRUCTIONS, ImagePayload, answer_prompt,
    classification_prompt,
};
use crate::pipeline::messages::Utterance;
use crate::runtime::{RuntimeEvent, Severity};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Two-stage classify-then-answer dispatcher with a global freeze gate.
pub struct GatedDispatcher {
    model: Arc<dyn GenerativeModel>,
    frozen: Arc<AtomicBool>,
    events_tx: broadcast::Sender<RuntimeEvent>,
}

impl GatedDispatcher {
    #[must_use]
    pub fn new(model: Arc<dyn GenerativeModel>, events_tx: broadcast::Sender<RuntimeEvent>) -> Self {
        Self {
            model,
            frozen: Arc::new(AtomicBool::new(false)),
            events_tx,
        }
    }

    /// Freeze or unfreeze dispatching. Producers keep running either way.
    pub fn set_frozen(&self, frozen: bool) {
        self.frozen.store(frozen, Ordering::Relaxed);
    }

    /// Whether the gate is currently frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Relaxed)
    }

    /// Process one utterance on its own task.
    ///
    /// Fire-and-forget for the producer; the returned handle lets tests and
    /// the shutdown path await completion.
    pub fn dispatch(&self, utterance: Utterance) -> JoinHandle<()> {
        let model = Arc::clone(&self.model);
        let frozen = Arc::clone(&self.frozen);
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            // Per-dispatch gate check: a freeze issued while earlier work is
            // in flight blocks this utterance without touching that work.
            if frozen.load(Ordering::Relaxed) {
                info!("dispatch gate frozen, skipping utterance");
                return;
            }

            match utterance {
                Utterance::Text { text, .. } => {
                    dispatch_text(model.as_ref(), &events_tx, &text).await;
                }
                Utterance::Image {
                    local_path, meta, ..
                } => {
                    dispatch_image(model.as_ref(), &events_tx, &local_path, &meta.remote_name)
                        .await;
                }
            }
        })
    }
}

/// Stage 1 classify, stage 2 answer. Strictly sequential per utterance.
async fn dispatch_text(
    model: &dyn GenerativeModel,
    events_tx: &broadcast::Sender<RuntimeEvent>,
    text: &str,
) {
    let verdict = match model.generate(&classification_prompt(text)).await {
        Ok(verdict) => verdict,
        Err(e) => {
            // A human is expected to keep talking; drop without a sink event.
            warn!("classification failed, dropping utterance: {e}");
            return;
        }
    };
    info!("classification: {}", verdict.trim());

    if !verdict.contains(AFFIRMATIVE_TOKEN) {
        info!("not a technical question, no further action");
        return;
    }

    // Remove the fragment from the live display before the answer lands.
    let _ = events_tx.send(RuntimeEvent::ClearTranscript);

    match model.generate(&answer_prompt(text)).await {
        Ok(answer) => {
            let _ = events_tx.send(RuntimeEvent::Answer(answer));
        }
        Err(e) => {
            warn!("answer generation failed, dropping utterance: {e}");
        }
    }
}

/// Vision path: load the payload, forward the model's output verbatim.
async fn dispatch_image(
    model: &dyn GenerativeModel,
    events_tx: &broadcast::Sender<RuntimeEvent>,
    local_path: &Path,
    remote_name: &str,
) {
    let image_name = local_path
        .file_name()
        .map_or_else(|| remote_name.to_owned(), |n| n.to_string_lossy().into_owned());

    let result = analyze_image(model, local_path).await;
    match result {
        Ok(text) => {
            info!("image analysis response ready for: {image_name}");
            let _ = events_tx.send(RuntimeEvent::ImageAnswer {
                text,
                image_name,
                image_path: local_path.to_string_lossy().into_owned(),
            });
        }
        Err(e) => {
            error!("image analysis failed for {image_name}: {e}");
            let _ = events_tx.send(RuntimeEvent::Status {
                message: format!("Image analysis failed for {image_name}: {e}"),
                severity: Severity::Error,
            });
        }
    }
}

async fn analyze_image(
    model: &dyn GenerativeModel,
    local_path: &Path,
) -> crate::error::Result<String> {
    let data = tokio::fs::read(local_path)
        .await
        .map_err(|e| PrompterError::Service(format!("cannot read image payload: {e}")))?;
    let payload = ImagePayload {
        mime_type: mime_for(local_path),
        data,
    };
    model.generate_with_image(IMAGE_INSTRUCTIONS, &payload).await
}

fn mime_for(path: &Path) -> String {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg".to_owned(),
        _ => "image/png".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::pipeline::messages::ImageMeta;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Scripted model: pops one canned response per call.
    struct FakeModel {
        script: Mutex<VecDeque<std::result::Result<String, String>>>,
        calls: AtomicUsize,
        /// When set, every call waits here before returning.
        release: Option<Arc<Notify>>,
    }

    impl FakeModel {
        fn scripted(responses: &[std::result::Result<&str, &str>]) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(
                    responses
                        .iter()
                        .map(|r| match r {
                            Ok(s) => Ok((*s).to_owned()),
                            Err(s) => Err((*s).to_owned()),
                        })
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
                release: None,
            })
        }

        fn next(&self) -> crate::error::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(msg)) => Err(PrompterError::Service(msg)),
                None => Err(PrompterError::Service("script exhausted".to_owned())),
            }
        }
    }

    #[async_trait]
    impl GenerativeModel for FakeModel {
        async fn generate(&self, _prompt: &str) -> crate::error::Result<String> {
            if let Some(release) = &self.release {
                release.notified().await;
            }
            self.next()
        }

        async fn generate_with_image(
            &self,
            _prompt: &str,
            _image: &ImagePayload,
        ) -> crate::error::Result<String> {
            if let Some(release) = &self.release {
                release.notified().await;
            }
            self.next()
        }
    }

    fn setup(
        model: Arc<FakeModel>,
    ) -> (GatedDispatcher, broadcast::Receiver<RuntimeEvent>) {
        let (events_tx, events_rx) = broadcast::channel(64);
        (GatedDispatcher::new(model, events_tx), events_rx)
    }

    fn image_utterance(path: &Path) -> Utterance {
        Utterance::image(
            path.to_path_buf(),
            ImageMeta {
                remote_name: path.file_name().unwrap().to_string_lossy().into_owned(),
                size: 0,
                created: None,
                updated: None,
            },
        )
    }

    #[tokio::test]
    async fn relevant_question_clears_then_answers() {
        let model = FakeModel::scripted(&[Ok("Yes"), Ok("A mutex is a lock.")]);
        let (dispatcher, mut events) = setup(Arc::clone(&model));

        dispatcher
            .dispatch(Utterance::text("what is a mutex"))
            .await
            .unwrap();

        assert!(matches!(
            events.try_recv().unwrap(),
            RuntimeEvent::ClearTranscript
        ));
        match events.try_recv().unwrap() {
            RuntimeEvent::Answer(text) => assert_eq!(text, "A mutex is a lock."),
            other => panic!("expected answer, got {other:?}"),
        }
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn irrelevant_question_produces_no_sink_events() {
        let model = FakeModel::scripted(&[Ok("No")]);
        let (dispatcher, mut events) = setup(Arc::clone(&model));

        dispatcher
            .dispatch(Utterance::text("what's the weather today"))
            .await
            .unwrap();

        assert!(events.try_recv().is_err(), "no clear, no answer");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1, "stage 2 never runs");
    }

    #[tokio::test]
    async fn frozen_gate_skips_both_kinds_without_service_calls() {
        let model = FakeModel::scripted(&[Ok("Yes"), Ok("unused")]);
        let (dispatcher, mut events) = setup(Arc::clone(&model));
        dispatcher.set_frozen(true);

        dispatcher
            .dispatch(Utterance::text("what is a mutex"))
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot_20250101_090000.png");
        std::fs::write(&path, b"png-bytes").unwrap();
        dispatcher.dispatch(image_utterance(&path)).await.unwrap();

        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn classification_error_drops_silently() {
        let model = FakeModel::scripted(&[Err("boom")]);
        let (dispatcher, mut events) = setup(Arc::clone(&model));

        dispatcher
            .dispatch(Utterance::text("what is a mutex"))
            .await
            .unwrap();

        assert!(events.try_recv().is_err(), "text-path errors are silent");
    }

    #[tokio::test]
    async fn image_response_forwarded_verbatim() {
        let model = FakeModel::scripted(&[Ok("B")]);
        let (dispatcher, mut events) = setup(model);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot_20250101_090000.png");
        std::fs::write(&path, b"png-bytes").unwrap();

        dispatcher.dispatch(image_utterance(&path)).await.unwrap();

        match events.try_recv().unwrap() {
            RuntimeEvent::ImageAnswer {
                text, image_name, ..
            } => {
                assert_eq!(text, "B");
                assert_eq!(image_name, "shot_20250101_090000.png");
            }
            other => panic!("expected image answer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn image_failure_surfaces_error_status() {
        let model = FakeModel::scripted(&[Err("vision down")]);
        let (dispatcher, mut events) = setup(model);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot_20250101_090000.png");
        std::fs::write(&path, b"png-bytes").unwrap();

        dispatcher.dispatch(image_utterance(&path)).await.unwrap();

        match events.try_recv().unwrap() {
            RuntimeEvent::Status { message, severity } => {
                assert_eq!(severity, Severity::Error);
                assert!(message.contains("shot_20250101_090000.png"));
            }
            other => panic!("expected error status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn freeze_mid_flight_completes_current_blocks_next() {
        let release = Arc::new(Notify::new());
        let model = Arc::new(FakeModel {
            script: Mutex::new(VecDeque::from([Ok("B".to_owned())])),
            calls: AtomicUsize::new(0),
            release: Some(Arc::clone(&release)),
        });
        let (dispatcher, mut events) = setup(Arc::clone(&model));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot_20250101_090000.png");
        std::fs::write(&path, b"png-bytes").unwrap();

        let in_flight = dispatcher.dispatch(image_utterance(&path));
        tokio::task::yield_now().await;

        // Freeze lands while the first dispatch is awaiting the model.
        dispatcher.set_frozen(true);
        release.notify_one();
        in_flight.await.unwrap();

        assert!(
            matches!(events.try_recv().unwrap(), RuntimeEvent::ImageAnswer { .. }),
            "in-flight dispatch still completes"
        );

        // A second submission after the toggle never reaches the model.
        dispatcher.dispatch(image_utterance(&path)).await.unwrap();
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert!(events.try_recv().is_err());
    }
}
