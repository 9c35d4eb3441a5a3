//! Realtime transcription WebSocket client.
//!
//! Speaks a v3-style streaming API: session parameters go in the connect
//! query string, audio goes up as binary frames, turn events come back as
//! serde-tagged JSON messages.

use crate::config::SttConfig;
use crate::error::{PrompterError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{StreamingTranscriber, TranscriberEvent};

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ClientMessage {
    Terminate,
}

/// Messages received from the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ServerMessage {
    Begin {
        #[serde(default)]
        id: String,
    },
    Turn {
        #[serde(default)]
        transcript: String,
        #[serde(default)]
        end_of_turn: bool,
    },
    Termination {
        #[serde(default)]
        audio_duration_seconds: f64,
    },
    #[serde(other)]
    Unknown,
}

/// WebSocket-backed [`StreamingTranscriber`].
pub struct RealtimeTranscriber {
    config: SttConfig,
    /// PCM frames to stream up, handed over once per session.
    audio_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
}

impl RealtimeTranscriber {
    #[must_use]
    pub fn new(config: SttConfig) -> Self {
        Self {
            config,
            audio_rx: Mutex::new(None),
        }
    }

    /// Attach the audio source for the next session.
    ///
    /// Without one, the session connects and listens for events but sends
    /// no audio.
    pub async fn set_audio_source(&self, audio_rx: mpsc::Receiver<Vec<u8>>) {
        *self.audio_rx.lock().await = Some(audio_rx);
    }

    fn session_url(&self) -> String {
        format!(
            "wss://{host}/v3/ws?sample_rate={rate}&format_turns={format}\
             &min_end_of_turn_silence_when_confident={confident_ms}\
             &max_turn_silence={max_silence_ms}\
             &end_of_turn_confidence_threshold={threshold}",
            host = self.config.api_host,
            rate = self.config.sample_rate,
            format = self.config.format_turns,
            confident_ms = self.config.min_end_of_turn_silence_when_confident,
            max_silence_ms = self.config.max_turn_silence,
            threshold = self.config.end_of_turn_confidence_threshold,
        )
    }
}

#[async_trait]
impl StreamingTranscriber for RealtimeTranscriber {
    async fn run_session(
        &self,
        events_tx: mpsc::UnboundedSender<TranscriberEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut request = self
            .session_url()
            .into_client_request()
            .map_err(|e| PrompterError::Transport(format!("bad session URL: {e}")))?;
        let auth = self
            .config
            .api_key
            .parse()
            .map_err(|_| PrompterError::Transport("API key is not a valid header".to_owned()))?;
        request.headers_mut().insert("Authorization", auth);

        let (ws, _response) = match connect_async(request).await {
            Ok(conn) => conn,
            Err(e) => {
                let message = format!("connect failed: {e}");
                let _ = events_tx.send(TranscriberEvent::Error(message.clone()));
                return Err(PrompterError::Transport(message));
            }
        };
        info!("realtime session connected to {}", self.config.api_host);
        let (mut sink, mut stream) = ws.split();

        let mut audio_rx = self.audio_rx.lock().await.take();
        let mut result: Result<()> = Ok(());

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    // Operator stop: ask the service to flush and terminate.
                    let terminate = serde_json::to_string(&ClientMessage::Terminate)
                        .unwrap_or_default();
                    let _ = sink.send(Message::Text(terminate.into())).await;
                    break;
                }
                frame = recv_audio(&mut audio_rx) => {
                    match frame {
                        Some(frame) => {
                            if let Err(e) = sink.send(Message::Binary(frame.into())).await {
                                let message = format!("audio send failed: {e}");
                                let _ = events_tx.send(TranscriberEvent::Error(message.clone()));
                                result = Err(PrompterError::Transport(message));
                                break;
                            }
                        }
                        // Audio source closed: keep the session open for
                        // trailing turn events until the service terminates.
                        None => audio_rx = None,
                    }
                }
                message = stream.next() => {
                    match message {
                        Some(Ok(Message::Text(raw))) => {
                            match serde_json::from_str::<ServerMessage>(&raw) {
                                Ok(ServerMessage::Begin { id }) => {
                                    let _ = events_tx.send(TranscriberEvent::Begin { id });
                                }
                                Ok(ServerMessage::Turn { transcript, end_of_turn }) => {
                                    let _ = events_tx.send(TranscriberEvent::Turn {
                                        text: transcript,
                                        end_of_turn,
                                    });
                                }
                                Ok(ServerMessage::Termination { audio_duration_seconds }) => {
                                    let _ = events_tx.send(TranscriberEvent::Terminated {
                                        audio_duration_seconds,
                                    });
                                    break;
                                }
                                Ok(ServerMessage::Unknown) => {
                                    debug!("unhandled server message: {raw}");
                                }
                                Err(e) => warn!("unparseable server message: {e}"),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("realtime session socket closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let message = format!("stream failed: {e}");
                            let _ = events_tx.send(TranscriberEvent::Error(message.clone()));
                            result = Err(PrompterError::Transport(message));
                            break;
                        }
                    }
                }
            }
        }

        // Teardown runs on every exit path; a close failure is not fatal.
        if let Err(e) = sink.close().await {
            debug!("error during session close: {e}");
        }
        result
    }
}

/// Receive one audio frame, or pend forever when no source is attached.
async fn recv_audio(audio_rx: &mut Option<mpsc::Receiver<Vec<u8>>>) -> Option<Vec<u8>> {
    match audio_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
