//! One WebSocket streaming session
//!
//! The socket-facing shell parses frames and forwards them to a
//! [`SessionActor`] that owns the session state machine; all outbound
//! traffic is serialized through a single sender task so event ordering is
//! preserved.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::adapters::EngineSet;
use crate::audio;
use crate::config::AppConfig;
use crate::error::Error;
use crate::pipeline::{Orchestrator, PipelineConfig};
use crate::streaming::protocol::{encode_tts_binary, ClientFrame, OutboundMessage, ServerEvent};

/// Close the session when the client goes quiet for this long.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound of the outbound event channel; a stalled client eventually stalls
/// the pipeline instead of growing a queue.
const EVENT_CHANNEL_BOUND: usize = 64;

/// What the shell should do after a frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlow {
    Continue,
    /// Clean stop: the pipeline has flushed and drained.
    Stopped,
}

/// Socket-agnostic session state machine. Exists separately from the
/// WebSocket shell so protocol behavior is testable without a connection.
pub struct SessionActor {
    engines: EngineSet,
    app: AppConfig,
    events_tx: mpsc::Sender<OutboundMessage>,
    orchestrator: Option<Orchestrator>,
}

impl SessionActor {
    pub fn new(engines: EngineSet, app: AppConfig, events_tx: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            engines,
            app,
            events_tx,
            orchestrator: None,
        }
    }

    /// Whether the config frame has arrived and the pipeline is running.
    pub fn is_started(&self) -> bool {
        self.orchestrator.is_some()
    }

    pub async fn handle_text(&mut self, text: &str) -> Result<SessionFlow, Error> {
        let frame: ClientFrame = serde_json::from_str(text)
            .map_err(|e| Error::protocol(format!("malformed frame: {e}")))?;
        self.handle_frame(frame).await
    }

    pub async fn handle_frame(&mut self, frame: ClientFrame) -> Result<SessionFlow, Error> {
        match frame {
            ClientFrame::Config {
                source_lang,
                target_lang,
                window_seconds,
                asr_interval_ms,
                commit_stability_k,
            } => {
                if self.is_started() {
                    return Err(Error::protocol("config may only be sent once per session"));
                }

                let mut cfg = PipelineConfig::from_app(&self.app, &source_lang, &target_lang);
                if let Some(w) = window_seconds {
                    cfg.window_seconds = w;
                }
                if let Some(ms) = asr_interval_ms {
                    cfg.asr_interval = Duration::from_millis(ms);
                }
                if let Some(k) = commit_stability_k {
                    cfg.stability_k = k;
                }

                info!(source = %source_lang, target = %target_lang, "Session configured");
                self.send(ServerEvent::Status {
                    message: format!("translating {source_lang} → {target_lang}"),
                })
                .await;
                self.orchestrator = Some(Orchestrator::start(
                    self.engines.clone(),
                    cfg,
                    self.events_tx.clone(),
                ));
                self.send(ServerEvent::Ready).await;
                Ok(SessionFlow::Continue)
            }

            ClientFrame::Audio {
                sample_rate,
                pcm16_base64,
                ..
            } => {
                let Some(orchestrator) = self.orchestrator.as_ref() else {
                    return Err(Error::protocol("audio before config"));
                };
                if sample_rate != self.app.capture_sample_rate {
                    return Err(Error::protocol(format!(
                        "sample rate mismatch: got {sample_rate}, session uses {}",
                        self.app.capture_sample_rate
                    )));
                }
                let bytes = BASE64
                    .decode(pcm16_base64.as_bytes())
                    .map_err(|e| Error::protocol(format!("invalid audio payload: {e}")))?;
                if bytes.len() % 2 != 0 {
                    return Err(Error::protocol("PCM16 payload has odd length"));
                }
                orchestrator.feed_audio(&audio::pcm16_to_f32(&bytes));
                Ok(SessionFlow::Continue)
            }

            ClientFrame::Stop => {
                info!("Client requested stop, flushing");
                if let Some(orchestrator) = self.orchestrator.take() {
                    orchestrator.stop(true).await;
                }
                Ok(SessionFlow::Stopped)
            }
        }
    }

    /// Tear down without flushing (connection drop, fatal error). Pending
    /// segments still drain; nothing new is committed.
    pub async fn abort(&mut self) {
        if let Some(orchestrator) = self.orchestrator.take() {
            orchestrator.stop(false).await;
        }
    }

    async fn send(&self, event: ServerEvent) {
        let _ = self.events_tx.send(OutboundMessage::Event(event)).await;
    }
}

/// Drive one accepted WebSocket until it closes.
pub async fn run_session(socket: WebSocket, engines: EngineSet, app: AppConfig) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_BOUND);
    let sender = tokio::spawn(sender_loop(ws_tx, events_rx));
    let mut actor = SessionActor::new(engines, app, events_tx.clone());

    loop {
        let received = match timeout(IDLE_TIMEOUT, ws_rx.next()).await {
            Err(_) => {
                warn!("Session idle for {IDLE_TIMEOUT:?}, closing");
                let _ = events_tx
                    .send(OutboundMessage::Event(ServerEvent::Error {
                        message: "session idle timeout".to_string(),
                        segment_id: None,
                    }))
                    .await;
                actor.abort().await;
                break;
            }
            Ok(next) => next,
        };

        match received {
            None => {
                info!("Client disconnected");
                actor.abort().await;
                break;
            }
            Some(Err(e)) => {
                warn!("WebSocket error: {e}");
                actor.abort().await;
                break;
            }
            Some(Ok(Message::Text(text))) => match actor.handle_text(&text).await {
                Ok(SessionFlow::Continue) => {}
                Ok(SessionFlow::Stopped) => break,
                Err(e) => {
                    warn!("Session error: {e}");
                    let _ = events_tx
                        .send(OutboundMessage::Event(ServerEvent::Error {
                            message: e.to_string(),
                            segment_id: None,
                        }))
                        .await;
                    if e.is_fatal() {
                        actor.abort().await;
                        break;
                    }
                }
            },
            Some(Ok(Message::Close(_))) => {
                info!("Client closed the stream");
                actor.abort().await;
                break;
            }
            Some(Ok(Message::Binary(_))) => {
                let _ = events_tx
                    .send(OutboundMessage::Event(ServerEvent::Error {
                        message: "binary frames are not accepted inbound".to_string(),
                        segment_id: None,
                    }))
                    .await;
                actor.abort().await;
                break;
            }
            Some(Ok(_)) => {} // ping/pong handled by the transport
        }
    }

    // Dropping the last event senders ends the sender task after it drains,
    // so tts_end and final stats reach the client before the close.
    drop(actor);
    drop(events_tx);
    let _ = sender.await;
    info!("Session ended");
}

/// The single writer to the socket: preserves the pipeline's event order.
async fn sender_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut events: mpsc::Receiver<OutboundMessage>,
) {
    while let Some(message) = events.recv().await {
        let ws_message = match message {
            OutboundMessage::Event(event) => match serde_json::to_string(&event) {
                Ok(json) => Message::Text(json),
                Err(e) => {
                    warn!("Failed to encode event: {e}");
                    continue;
                }
            },
            OutboundMessage::BinaryAudio { segment_id, pcm16 } => {
                Message::Binary(encode_tts_binary(segment_id, &pcm16))
            }
        };
        if ws_tx.send(ws_message).await.is_err() {
            break;
        }
    }
    let _ = ws_tx.close().await;
}
