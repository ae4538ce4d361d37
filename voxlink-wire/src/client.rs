//! Legacy streaming client
//!
//! Drives a shared [`PlaybackEngine`] from JSON frames received over a
//! raw WebSocket. A single corrupt frame is dropped after a debug log;
//! it never terminates an otherwise healthy stream.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use voxlink_core::VoxlinkError;
use voxlink_media::{pcm, PlaybackEngine};

use crate::protocol::{MarkPayload, MediaPayload, ToolResponsePayload, WireMessage};

/// Handles inbound remote tool invocations arriving on the stream
///
/// Implementations must not panic; a failed invocation is reported by
/// returning a `{"error": message}` object as the result.
#[async_trait]
pub trait WireToolHandler: Send + Sync {
    /// Invoke the named tool with JSON arguments and return its result
    async fn invoke(&self, name: &str, arguments: serde_json::Value) -> serde_json::Value;
}

/// Events surfaced to the application from the legacy stream
#[derive(Debug, Clone)]
pub enum WireEvent {
    /// The remote side opened the stream
    Started {
        /// Stream identifier, when the remote side assigns one
        stream_id: Option<String>,
    },
    /// A speech-to-text segment arrived
    Transcription {
        /// Segment text
        text: String,
        /// Whether the segment is final
        is_final: bool,
    },
    /// The agent produced answer text
    Answer {
        /// Answer text
        text: String,
    },
    /// Informational frame passed through verbatim
    Info {
        /// Frame content
        payload: serde_json::Value,
    },
    /// The remote side closed the stream gracefully
    Stopped,
    /// The socket closed without a stop frame
    Closed {
        /// Close reason or transport error text
        reason: String,
    },
}

/// Routes parsed inbound frames to the playback engine, the tool
/// handler and the application event stream.
struct InboundRouter {
    engine: Arc<PlaybackEngine>,
    tools: Option<Arc<dyn WireToolHandler>>,
    events: mpsc::UnboundedSender<WireEvent>,
    outbound: mpsc::UnboundedSender<WireMessage>,
}

impl InboundRouter {
    /// Handle one text frame; returns false when the stream should end
    async fn route(&self, text: &str) -> bool {
        let message = match WireMessage::from_frame(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("dropping malformed frame: {e}");
                return true;
            }
        };
        match message {
            WireMessage::Start { stream_id } => {
                info!(?stream_id, "stream started");
                let _ = self.events.send(WireEvent::Started { stream_id });
            }
            WireMessage::Media { media } => match pcm::decode_payload(&media.payload) {
                Ok(samples) => self.engine.enqueue(&samples),
                Err(e) => debug!("dropping undecodable media frame: {e}"),
            },
            WireMessage::Clear => self.engine.clear(),
            WireMessage::Mark { mark } => self.engine.add_mark(mark.name),
            WireMessage::Transcription { transcription } => {
                let _ = self.events.send(WireEvent::Transcription {
                    text: transcription.text,
                    is_final: transcription.is_final,
                });
            }
            WireMessage::Answer { answer } => {
                let _ = self.events.send(WireEvent::Answer { text: answer.text });
            }
            WireMessage::Info { info } => {
                let _ = self.events.send(WireEvent::Info { payload: info });
            }
            WireMessage::Tools { tools } => {
                let result = match &self.tools {
                    Some(handler) => handler.invoke(&tools.name, tools.arguments).await,
                    None => json!({ "error": format!("no handler for tool '{}'", tools.name) }),
                };
                let _ = self.outbound.send(WireMessage::ToolsResponse {
                    tools_response: ToolResponsePayload {
                        id: tools.id,
                        result,
                    },
                });
            }
            WireMessage::ToolsResponse { tools_response } => {
                debug!(id = %tools_response.id, "ignoring unexpected tools_response");
            }
            WireMessage::Stop => {
                info!("stream stopped by remote");
                let _ = self.events.send(WireEvent::Stopped);
                return false;
            }
        }
        true
    }
}

/// Client for the legacy raw-WebSocket media streaming path
///
/// Inbound audio frames feed the shared playback engine directly; all
/// other inbound frames surface as [`WireEvent`] values on the stream
/// returned by [`LegacyStreamClient::connect`].
pub struct LegacyStreamClient {
    outbound: mpsc::UnboundedSender<WireMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl LegacyStreamClient {
    /// Connect to a streaming endpoint
    ///
    /// `engine` receives decoded media frames; `tools` (when present)
    /// answers inbound tool invocations.
    pub async fn connect(
        url: &str,
        engine: Arc<PlaybackEngine>,
        tools: Option<Arc<dyn WireToolHandler>>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WireEvent>), VoxlinkError> {
        let (ws, _response) =
            connect_async(url)
                .await
                .map_err(|e| VoxlinkError::Transport {
                    reason: format!("websocket connect to {url} failed: {e}"),
                })?;
        info!(url, "legacy stream connected");
        let (mut sink, mut stream) = ws.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WireMessage>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let router = InboundRouter {
            engine,
            tools,
            events: event_tx.clone(),
            outbound: out_tx.clone(),
        };

        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                match message.to_frame() {
                    Ok(frame) => {
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("failed to serialize outbound frame: {e}"),
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if !router.route(&text).await {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        let _ = event_tx.send(WireEvent::Closed {
                            reason: "closed by remote".to_string(),
                        });
                        break;
                    }
                    Ok(_) => {} // binary, ping and pong frames are ignored
                    Err(e) => {
                        let _ = event_tx.send(WireEvent::Closed {
                            reason: e.to_string(),
                        });
                        break;
                    }
                }
            }
        });

        Ok((
            Self {
                outbound: out_tx,
                reader,
                writer,
            },
            event_rx,
        ))
    }

    fn send(&self, message: WireMessage) -> Result<(), VoxlinkError> {
        self.outbound
            .send(message)
            .map_err(|_| VoxlinkError::Transport {
                reason: "stream writer has shut down".to_string(),
            })
    }

    /// Open the stream
    pub fn send_start(&self, stream_id: Option<String>) -> Result<(), VoxlinkError> {
        self.send(WireMessage::Start { stream_id })
    }

    /// Send captured audio as a base64 PCM16 media frame
    pub fn send_media(&self, samples: &[f32]) -> Result<(), VoxlinkError> {
        self.send(WireMessage::Media {
            media: MediaPayload {
                payload: pcm::encode_payload(samples),
            },
        })
    }

    /// Send a playback checkpoint
    pub fn send_mark(&self, name: impl Into<String>) -> Result<(), VoxlinkError> {
        self.send(WireMessage::Mark {
            mark: MarkPayload { name: name.into() },
        })
    }

    /// Request a graceful close
    pub fn send_stop(&self) -> Result<(), VoxlinkError> {
        self.send(WireMessage::Stop)
    }
}

impl Drop for LegacyStreamClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxlink_media::PlaybackState;

    fn router(
        engine: Arc<PlaybackEngine>,
        tools: Option<Arc<dyn WireToolHandler>>,
    ) -> (
        InboundRouter,
        mpsc::UnboundedReceiver<WireEvent>,
        mpsc::UnboundedReceiver<WireMessage>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            InboundRouter {
                engine,
                tools,
                events: event_tx,
                outbound: out_tx,
            },
            event_rx,
            out_rx,
        )
    }

    #[tokio::test]
    async fn media_then_clear_leaves_the_queue_empty_and_paused() {
        let (engine, _playback_rx) = PlaybackEngine::new();
        let engine = Arc::new(engine);
        let (router, _events, _out) = router(Arc::clone(&engine), None);

        let payload = pcm::encode_payload(&vec![0.0f32; 16_000]);
        let media = format!(r#"{{"event":"media","media":{{"payload":"{payload}"}}}}"#);
        assert!(router.route(&media).await);
        assert!(engine.queued_samples() > 0);

        assert!(router.route(r#"{"event":"clear"}"#).await);
        assert_eq!(engine.queued_samples(), 0);
        assert_eq!(engine.state(), PlaybackState::Paused);
    }

    #[tokio::test]
    async fn marks_and_malformed_frames() {
        let (engine, _playback_rx) = PlaybackEngine::new();
        let engine = Arc::new(engine);
        let (router, _events, _out) = router(Arc::clone(&engine), None);

        // Corrupt frames are dropped without ending the stream.
        assert!(router.route("{truncated").await);
        assert!(router.route(r#"{"event":"media","media":{"payload":"!!"}}"#).await);
        assert_eq!(engine.queued_samples(), 0);

        assert!(router.route(r#"{"event":"mark","mark":{"name":"m1"}}"#).await);
        assert_eq!(engine.pending_marks(), 1);
    }

    #[tokio::test]
    async fn tool_call_produces_a_response_keyed_by_call_id() {
        struct Doubler;
        #[async_trait]
        impl WireToolHandler for Doubler {
            async fn invoke(&self, name: &str, arguments: serde_json::Value) -> serde_json::Value {
                assert_eq!(name, "double");
                json!(arguments["x"].as_i64().unwrap() * 2)
            }
        }

        let (engine, _playback_rx) = PlaybackEngine::new();
        let (router, _events, mut out) = router(Arc::new(engine), Some(Arc::new(Doubler)));

        let call = r#"{"event":"tools","tools":{"id":"call-7","name":"double","arguments":{"x":21}}}"#;
        assert!(router.route(call).await);

        match out.try_recv().unwrap() {
            WireMessage::ToolsResponse { tools_response } => {
                assert_eq!(tools_response.id, "call-7");
                assert_eq!(tools_response.result, json!(42));
            }
            other => panic!("unexpected outbound message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_frame_ends_the_stream_and_reports_stopped() {
        let (engine, _playback_rx) = PlaybackEngine::new();
        let (router, mut events, _out) = router(Arc::new(engine), None);

        assert!(!router.route(r#"{"event":"stop"}"#).await);
        assert!(matches!(events.try_recv(), Ok(WireEvent::Stopped)));
    }

    #[tokio::test]
    async fn content_frames_pass_through_as_events() {
        let (engine, _playback_rx) = PlaybackEngine::new();
        let (router, mut events, _out) = router(Arc::new(engine), None);

        let frame = r#"{"event":"transcription","transcription":{"text":"hello","final":true}}"#;
        assert!(router.route(frame).await);
        match events.try_recv().unwrap() {
            WireEvent::Transcription { text, is_final } => {
                assert_eq!(text, "hello");
                assert!(is_final);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert!(router.route(r#"{"event":"answer","answer":{"text":"hi"}}"#).await);
        assert!(matches!(
            events.try_recv().unwrap(),
            WireEvent::Answer { text } if text == "hi"
        ));
    }
}
