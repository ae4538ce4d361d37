//! Transport abstraction over the underlying real-time session engine
//!
//! The transport is a black-box capability provider: it owns the actual
//! media session (room, participants, tracks, RPC registration, quality
//! reporting) and surfaces everything Voxlink needs as a single ordered
//! event stream per session.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::VoxlinkError;

/// Which side of the conversation an audio observation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Party {
    /// The local user (microphone side)
    User,
    /// The remote agent (playback side)
    Agent,
}

/// Connection quality as reported by the transport engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportQuality {
    /// Excellent connection quality
    Excellent,
    /// Good connection quality
    Good,
    /// Poor connection quality
    Poor,
    /// Connection effectively lost
    Lost,
}

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

/// Descriptor for a subscribed remote track
#[derive(Debug, Clone)]
pub struct TrackInfo {
    /// Track ID
    pub id: String,
    /// Identity of the participant publishing the track
    pub participant: String,
    /// Kind of media on the track
    pub kind: TrackKind,
    /// Whether the track is currently muted
    pub muted: bool,
    /// When the subscription was established
    pub subscribed_at: chrono::DateTime<chrono::Utc>,
}

/// Inbound remote procedure call delivered by the transport
///
/// The responder must be completed exactly once; dropping it reports a
/// transport-level failure to the remote caller.
#[derive(Debug)]
pub struct RpcRequest {
    /// Method name the remote side invoked
    pub method: String,
    /// Raw argument payload (JSON text)
    pub payload: String,
    /// Channel used to deliver the serialized result
    pub responder: oneshot::Sender<String>,
}

/// Events emitted by a transport session
///
/// Events arrive as a single ordered stream per session; Voxlink trusts
/// the delivery order and does not reorder.
#[derive(Debug)]
pub enum TransportEvent {
    /// Session handshake completed
    Connected,
    /// Session ended or was lost
    Disconnected {
        /// Reason for disconnection
        reason: String,
    },
    /// Transport is attempting to re-establish the session
    Reconnecting {
        /// Attempt number within this reconnection episode
        attempt: u32,
    },
    /// Transport re-established the session
    Reconnected,
    /// A remote participant joined
    ParticipantConnected {
        /// Participant identity
        identity: String,
        /// Free-form participant metadata
        metadata: String,
    },
    /// A remote participant left
    ParticipantDisconnected {
        /// Participant identity
        identity: String,
    },
    /// A participant's attributes changed
    AttributesChanged {
        /// Participant identity
        identity: String,
        /// Changed attribute keys with their new values
        changed: HashMap<String, String>,
    },
    /// A remote track became available and was subscribed
    TrackSubscribed {
        /// Track descriptor
        track: TrackInfo,
    },
    /// A remote track was unsubscribed
    TrackUnsubscribed {
        /// Track ID
        track_id: String,
    },
    /// A track's mute state changed
    TrackMuteChanged {
        /// Track ID
        track_id: String,
        /// Whether the track is now muted
        muted: bool,
    },
    /// Connection quality changed
    QualityChanged {
        /// New quality as reported by the engine
        quality: TransportQuality,
    },
    /// Decoded agent audio ready for playback
    AgentAudio {
        /// Interleaved f32 PCM samples
        samples: Vec<f32>,
    },
    /// Audio level observation for one party (0.0 to 1.0)
    AudioLevel {
        /// Party the level belongs to
        party: Party,
        /// Measured level
        level: f32,
    },
    /// Structured data message from a remote participant
    DataReceived {
        /// Raw payload bytes
        payload: Vec<u8>,
        /// Sender identity
        sender: String,
    },
    /// Inbound remote procedure call
    Rpc(RpcRequest),
}

/// Capabilities Voxlink requires from a transport session engine
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the session handshake against the given endpoint
    async fn connect(&self, url: &str, token: &str) -> Result<(), VoxlinkError>;

    /// Tear down the session
    async fn disconnect(&self) -> Result<(), VoxlinkError>;

    /// Enable or disable the outbound microphone track
    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), VoxlinkError>;

    /// Send a structured data message to the remote side
    async fn send_data(&self, payload: Vec<u8>) -> Result<(), VoxlinkError>;

    /// Take ownership of the session event stream
    ///
    /// Returns `None` after the stream has already been taken; there is
    /// exactly one consumer per session.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;
}

/// In-process loopback transport for tests and examples
///
/// Events are injected with [`MockTransport::push_event`] and observed
/// through the normal [`Transport::take_events`] stream.
pub struct MockTransport {
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    connected: AtomicBool,
    mic_enabled: AtomicBool,
    connect_calls: AtomicU32,
    fail_connect: AtomicBool,
    fail_disconnect: AtomicBool,
    sent_data: Mutex<Vec<Vec<u8>>>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            connected: AtomicBool::new(false),
            mic_enabled: AtomicBool::new(true),
            connect_calls: AtomicU32::new(0),
            fail_connect: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
            sent_data: Mutex::new(Vec::new()),
        })
    }

    /// Inject a transport event into the session stream
    pub fn push_event(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Number of times `connect` was invoked
    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Whether the mock currently considers itself connected
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether the outbound microphone is enabled
    pub fn microphone_enabled(&self) -> bool {
        self.mic_enabled.load(Ordering::SeqCst)
    }

    /// Make the next `connect` call fail
    pub fn fail_next_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    /// Make `disconnect` calls fail
    pub fn fail_disconnect(&self) {
        self.fail_disconnect.store(true, Ordering::SeqCst);
    }

    /// Data payloads sent through this transport
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.sent_data.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &str, _token: &str) -> Result<(), VoxlinkError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.swap(false, Ordering::SeqCst) {
            return Err(VoxlinkError::Connection {
                reason: format!("mock handshake refused for {url}"),
            });
        }
        debug!("mock transport connected to {url}");
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), VoxlinkError> {
        self.connected.store(false, Ordering::SeqCst);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(VoxlinkError::Transport {
                reason: "mock teardown failure".to_string(),
            });
        }
        Ok(())
    }

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), VoxlinkError> {
        self.mic_enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    async fn send_data(&self, payload: Vec<u8>) -> Result<(), VoxlinkError> {
        self.sent_data.lock().push(payload);
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events_rx.lock().take()
    }
}
