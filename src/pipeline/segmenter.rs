//! Turn segmentation: collapses a stream of partial-transcript updates into
//! well-separated finalized utterances.
//!
//! The upstream session marks some turns final explicitly; for the rest, a
//! restartable debounce timer finalizes once the text stops changing for a
//! quiet period. Every update supersedes the previous pending timer, so a
//! half-formed utterance is never dispatched while the speaker is still
//! going.

use crate::pipeline::messages::Utterance;
use crate::runtime::RuntimeEvent;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Mutable per-session segmentation state.
///
/// One mutex guards all three fields: the upstream turn callback and the
/// debounce timer callback must never interleave around them.
struct SegmentationState {
    /// Latest partial-or-final text observed.
    current_text: String,
    /// Last text actually forwarded downstream.
    last_dispatched: String,
    /// Cancellation handle of the single pending debounce timer, if any.
    pending_timer: Option<CancellationToken>,
}

/// Converts `(text, is_final)` turn events into finalized [`Utterance`]s.
///
/// One instance per transcription session; restarting a session means
/// constructing a fresh segmenter.
pub struct TurnSegmenter {
    state: Arc<Mutex<SegmentationState>>,
    utterance_tx: mpsc::UnboundedSender<Utterance>,
    events_tx: broadcast::Sender<RuntimeEvent>,
    debounce: Duration,
    /// Session-scoped token; cancelling it kills any pending timer.
    session: CancellationToken,
}

impl TurnSegmenter {
    #[must_use]
    pub fn new(
        debounce: Duration,
        utterance_tx: mpsc::UnboundedSender<Utterance>,
        events_tx: broadcast::Sender<RuntimeEvent>,
        session: CancellationToken,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SegmentationState {
                current_text: String::new(),
                last_dispatched: String::new(),
                pending_timer: None,
            })),
            utterance_tx,
            events_tx,
            debounce,
            session,
        }
    }

    /// Feed one turn event from the upstream session.
    ///
    /// Empty (after trimming) text is ignored. A final turn finalizes
    /// immediately; a partial turn restarts the debounce timer.
    pub fn on_update(&self, text: &str, is_final: bool) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.current_text = text.to_owned();

        // Single-timer invariant: a new update always supersedes any timer
        // armed for an earlier version of this turn.
        if let Some(prev) = st.pending_timer.take() {
            prev.cancel();
        }

        if is_final {
            finalize_locked(&mut st, &self.utterance_tx, &self.events_tx);
        } else {
            self.arm_timer(&mut st);
        }
    }

    /// Tear down the segmenter: cancel any pending timer and discard state.
    pub fn stop(&self) {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(timer) = st.pending_timer.take() {
            timer.cancel();
        }
        st.current_text.clear();
        st.last_dispatched.clear();
    }

    fn arm_timer(&self, st: &mut SegmentationState) {
        let token = self.session.child_token();
        st.pending_timer = Some(token.clone());

        let state = Arc::clone(&self.state);
        let utterance_tx = self.utterance_tx.clone();
        let events_tx = self.events_tx.clone();
        let delay = self.debounce;

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let mut st = state.lock().unwrap_or_else(|e| e.into_inner());
                    // The cancel in `on_update` happens under the state lock,
                    // so a token still live here is still the pending timer.
                    if token.is_cancelled() {
                        return;
                    }
                    st.pending_timer = None;
                    debug!("debounce elapsed, finalizing turn");
                    finalize_locked(&mut st, &utterance_tx, &events_tx);
                }
            }
        });
    }

    #[cfg(test)]
    fn has_pending_timer(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pending_timer
            .is_some()
    }
}

/// Emit the current text if it differs from the last dispatched one.
///
/// A repeated identical finalization is a no-op, not an error.
fn finalize_locked(
    st: &mut SegmentationState,
    utterance_tx: &mpsc::UnboundedSender<Utterance>,
    events_tx: &broadcast::Sender<RuntimeEvent>,
) {
    if st.current_text.is_empty() || st.current_text == st.last_dispatched {
        return;
    }
    st.last_dispatched = st.current_text.clone();

    let _ = events_tx.send(RuntimeEvent::Transcript(st.current_text.clone()));
    if utterance_tx
        .send(Utterance::text(st.current_text.clone()))
        .is_err()
    {
        warn!("utterance channel closed, dropping finalized turn");
    }
}
