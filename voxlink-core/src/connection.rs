//! Connection lifecycle management
//!
//! Owns the transport session: connection attempts, reconnection
//! sequencing, the participant roster and microphone pause state. All
//! state transitions are reported as [`ConnectionEvent`] values returned
//! to the caller, which forwards them to the application event stream.
//! The lifecycle methods themselves never fail; errors surface only as
//! events. Callers that prefer structured error handling use the
//! `try_*` variants instead.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::VoxlinkError;
use crate::transport::{Transport, TransportEvent};

/// Participant attribute key whose changes are translated into
/// [`ConnectionEvent::AgentStateChanged`]
pub const AGENT_STATE_ATTRIBUTE: &str = "agent.state";

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No active session
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Session established
    Connected,
    /// Transport is re-establishing a dropped session
    Reconnecting,
}

/// A remote participant known to the session
#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    /// Participant identity
    pub identity: String,
    /// Free-form metadata supplied by the transport
    pub metadata: String,
    /// When the participant joined
    pub connected_at: chrono::DateTime<chrono::Utc>,
}

/// Configuration for a connection session
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Endpoint URL for the transport handshake
    pub url: String,
    /// Access token for the session
    pub token: String,
    /// Attribute key carrying the agent's conversational state
    pub agent_state_key: String,
}

impl ConnectionConfig {
    /// Create a config for the given endpoint and token
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            agent_state_key: AGENT_STATE_ATTRIBUTE.to_string(),
        }
    }
}

/// Events produced by the connection lifecycle manager
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Session established; emitted exactly once per session
    Connected {
        /// Wall-clock duration of the handshake in milliseconds
        handshake_ms: u64,
    },
    /// Session ended
    Disconnected {
        /// Reason for disconnection
        reason: String,
    },
    /// Transport is attempting to recover the session
    Reconnecting {
        /// Attempt number within this episode
        attempt: u32,
    },
    /// Session recovered
    Reconnected,
    /// A participant joined the session
    ParticipantJoined {
        /// The participant that joined
        participant: ParticipantInfo,
    },
    /// A participant left the session
    ParticipantLeft {
        /// Identity of the participant that left
        identity: String,
    },
    /// The agent's conversational state changed (listening/thinking/speaking)
    AgentStateChanged {
        /// New state value, verbatim from the attribute
        state: String,
    },
    /// Outbound microphone was muted
    MicrophonePaused,
    /// Outbound microphone was unmuted
    MicrophoneResumed,
    /// A lifecycle operation failed
    Error {
        /// Descriptive error message
        message: String,
    },
}

/// Point-in-time view of the connection session counters
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    /// Current lifecycle state
    pub state: ConnectionState,
    /// Connection attempts made (failed attempts included)
    pub attempt_count: u32,
    /// Reconnection episodes observed
    pub reconnect_count: u32,
    /// Whether the microphone is paused
    pub is_paused: bool,
    /// Number of known remote participants
    pub participant_count: usize,
    /// Milliseconds since the session was first established, if connected
    pub call_duration_ms: Option<u64>,
    /// Duration of the most recent successful handshake in milliseconds
    pub handshake_ms: u64,
}

/// Manages one transport session per instance
///
/// Reconnection mutates the same session rather than creating a new one,
/// preserving the call start time.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    state: Mutex<ConnectionState>,
    participants: DashMap<String, ParticipantInfo>,
    paused: AtomicBool,
    connected_emitted: AtomicBool,
    attempt_count: AtomicU32,
    reconnect_count: AtomicU32,
    handshake_ms: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

impl ConnectionManager {
    /// Create a manager for the given transport and configuration
    pub fn new(transport: Arc<dyn Transport>, config: ConnectionConfig) -> Self {
        Self {
            transport,
            config,
            state: Mutex::new(ConnectionState::Disconnected),
            participants: DashMap::new(),
            paused: AtomicBool::new(false),
            connected_emitted: AtomicBool::new(false),
            attempt_count: AtomicU32::new(0),
            reconnect_count: AtomicU32::new(0),
            handshake_ms: AtomicU64::new(0),
            started_at: Mutex::new(None),
        }
    }

    /// Establish the session
    ///
    /// Never fails: handshake errors are reported as
    /// [`ConnectionEvent::Error`]. Calling while already connected or
    /// connecting is a no-op.
    pub async fn connect(&self) -> Vec<ConnectionEvent> {
        match self.try_connect().await {
            Ok(events) => events,
            Err(e) => {
                warn!("connection attempt failed: {e}");
                vec![ConnectionEvent::Error {
                    message: e.to_string(),
                }]
            }
        }
    }

    /// Establish the session, propagating handshake errors
    pub async fn try_connect(&self) -> Result<Vec<ConnectionEvent>, VoxlinkError> {
        {
            let mut state = self.state.lock();
            match *state {
                ConnectionState::Connected | ConnectionState::Connecting => {
                    debug!("connect ignored, already {:?}", *state);
                    return Ok(Vec::new());
                }
                _ => *state = ConnectionState::Connecting,
            }
        }

        // The attempt counts even if the handshake fails.
        self.attempt_count.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();

        match self
            .transport
            .connect(&self.config.url, &self.config.token)
            .await
        {
            Ok(()) => {
                let handshake_ms = started.elapsed().as_millis() as u64;
                self.handshake_ms.store(handshake_ms, Ordering::SeqCst);
                *self.state.lock() = ConnectionState::Connected;
                let mut started_at = self.started_at.lock();
                if started_at.is_none() {
                    *started_at = Some(Instant::now());
                }
                drop(started_at);
                info!("session established in {handshake_ms} ms");
                Ok(self.emit_connected_once(handshake_ms))
            }
            Err(e) => {
                *self.state.lock() = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Tear down the session
    ///
    /// Internal cleanup always runs, even when the transport-level
    /// teardown fails; the failure is reported as an event alongside the
    /// final `Disconnected`.
    pub async fn disconnect(&self) -> Vec<ConnectionEvent> {
        let teardown = self.transport.disconnect().await;
        let mut events = Vec::new();
        if let Err(e) = teardown {
            warn!("transport teardown failed: {e}");
            events.push(ConnectionEvent::Error {
                message: e.to_string(),
            });
        }
        self.reset();
        events.push(ConnectionEvent::Disconnected {
            reason: "client disconnect".to_string(),
        });
        events
    }

    /// Mute the outbound microphone without closing the session
    pub async fn pause(&self) -> Vec<ConnectionEvent> {
        match self.transport.set_microphone_enabled(false).await {
            Ok(()) => {
                self.paused.store(true, Ordering::SeqCst);
                vec![ConnectionEvent::MicrophonePaused]
            }
            Err(e) => vec![ConnectionEvent::Error {
                message: format!("failed to pause microphone: {e}"),
            }],
        }
    }

    /// Unmute the outbound microphone
    pub async fn resume(&self) -> Vec<ConnectionEvent> {
        match self.transport.set_microphone_enabled(true).await {
            Ok(()) => {
                self.paused.store(false, Ordering::SeqCst);
                vec![ConnectionEvent::MicrophoneResumed]
            }
            Err(e) => vec![ConnectionEvent::Error {
                message: format!("failed to resume microphone: {e}"),
            }],
        }
    }

    /// Translate a transport event into connection events
    ///
    /// Only connection, participant and attribute events are handled
    /// here; track, quality, audio and data events belong to other
    /// subsystems and yield nothing.
    pub fn handle_transport_event(&self, event: &TransportEvent) -> Vec<ConnectionEvent> {
        match event {
            TransportEvent::Connected => {
                *self.state.lock() = ConnectionState::Connected;
                let mut started_at = self.started_at.lock();
                if started_at.is_none() {
                    *started_at = Some(Instant::now());
                }
                drop(started_at);
                self.emit_connected_once(self.handshake_ms.load(Ordering::SeqCst))
            }
            TransportEvent::Disconnected { reason } => {
                self.reset();
                vec![ConnectionEvent::Disconnected {
                    reason: reason.clone(),
                }]
            }
            TransportEvent::Reconnecting { attempt } => {
                *self.state.lock() = ConnectionState::Reconnecting;
                self.reconnect_count.fetch_add(1, Ordering::SeqCst);
                vec![ConnectionEvent::Reconnecting { attempt: *attempt }]
            }
            TransportEvent::Reconnected => {
                *self.state.lock() = ConnectionState::Connected;
                vec![ConnectionEvent::Reconnected]
            }
            TransportEvent::ParticipantConnected { identity, metadata } => {
                let participant = ParticipantInfo {
                    identity: identity.clone(),
                    metadata: metadata.clone(),
                    connected_at: chrono::Utc::now(),
                };
                self.participants
                    .insert(identity.clone(), participant.clone());
                vec![ConnectionEvent::ParticipantJoined { participant }]
            }
            TransportEvent::ParticipantDisconnected { identity } => {
                self.participants.remove(identity);
                vec![ConnectionEvent::ParticipantLeft {
                    identity: identity.clone(),
                }]
            }
            TransportEvent::AttributesChanged { changed, .. } => {
                match changed.get(&self.config.agent_state_key) {
                    Some(state) => vec![ConnectionEvent::AgentStateChanged {
                        state: state.clone(),
                    }],
                    None => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Whether the microphone is currently paused
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Snapshot of the session counters
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            state: self.state(),
            attempt_count: self.attempt_count.load(Ordering::SeqCst),
            reconnect_count: self.reconnect_count.load(Ordering::SeqCst),
            is_paused: self.is_paused(),
            participant_count: self.participants.len(),
            call_duration_ms: self
                .started_at
                .lock()
                .map(|t| t.elapsed().as_millis() as u64),
            handshake_ms: self.handshake_ms.load(Ordering::SeqCst),
        }
    }

    /// Known remote participants
    pub fn participants(&self) -> Vec<ParticipantInfo> {
        self.participants
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn emit_connected_once(&self, handshake_ms: u64) -> Vec<ConnectionEvent> {
        // The transport's own connected callback may race the handshake
        // result; the flag guarantees a single Connected per session.
        if self.connected_emitted.swap(true, Ordering::SeqCst) {
            Vec::new()
        } else {
            vec![ConnectionEvent::Connected { handshake_ms }]
        }
    }

    fn reset(&self) {
        *self.state.lock() = ConnectionState::Disconnected;
        self.participants.clear();
        self.paused.store(false, Ordering::SeqCst);
        self.connected_emitted.store(false, Ordering::SeqCst);
        *self.started_at.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::collections::HashMap;

    fn manager(transport: Arc<MockTransport>) -> ConnectionManager {
        ConnectionManager::new(
            transport,
            ConnectionConfig::new("wss://example.test", "token"),
        )
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let transport = MockTransport::new();
        let mgr = manager(transport.clone());

        let first = mgr.connect().await;
        assert!(matches!(first[0], ConnectionEvent::Connected { .. }));

        let second = mgr.connect().await;
        assert!(second.is_empty());

        // Handshake ran exactly once and the second call did not count
        // as another attempt.
        assert_eq!(transport.connect_calls(), 1);
        assert_eq!(mgr.stats().attempt_count, 1);
    }

    #[tokio::test]
    async fn failed_connect_counts_attempt_and_emits_error() {
        let transport = MockTransport::new();
        transport.fail_next_connect();
        let mgr = manager(transport.clone());

        let events = mgr.connect().await;
        assert!(matches!(events[0], ConnectionEvent::Error { .. }));
        assert_eq!(mgr.stats().attempt_count, 1);
        assert_eq!(mgr.state(), ConnectionState::Disconnected);

        // A later attempt can still succeed and emits Connected.
        let events = mgr.connect().await;
        assert!(matches!(events[0], ConnectionEvent::Connected { .. }));
        assert_eq!(mgr.stats().attempt_count, 2);
    }

    #[tokio::test]
    async fn try_connect_propagates_handshake_errors() {
        let transport = MockTransport::new();
        transport.fail_next_connect();
        let mgr = manager(transport);

        let result = mgr.try_connect().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cleanup_runs_even_when_teardown_fails() {
        let transport = MockTransport::new();
        let mgr = manager(transport.clone());
        mgr.connect().await;
        mgr.handle_transport_event(&TransportEvent::ParticipantConnected {
            identity: "agent".to_string(),
            metadata: String::new(),
        });
        mgr.pause().await;
        transport.fail_disconnect();

        let events = mgr.disconnect().await;
        assert!(matches!(events[0], ConnectionEvent::Error { .. }));
        assert!(matches!(
            events.last().unwrap(),
            ConnectionEvent::Disconnected { .. }
        ));
        assert_eq!(mgr.stats().participant_count, 0);
        assert!(!mgr.is_paused());
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn duplicate_connected_callback_is_suppressed() {
        let transport = MockTransport::new();
        let mgr = manager(transport);

        let events = mgr.connect().await;
        assert_eq!(events.len(), 1);

        // Transport fires its own connected callback afterwards.
        let events = mgr.handle_transport_event(&TransportEvent::Connected);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn agent_state_attribute_is_translated() {
        let transport = MockTransport::new();
        let mgr = manager(transport);

        let mut changed = HashMap::new();
        changed.insert(AGENT_STATE_ATTRIBUTE.to_string(), "thinking".to_string());
        let events = mgr.handle_transport_event(&TransportEvent::AttributesChanged {
            identity: "agent".to_string(),
            changed,
        });
        assert!(
            matches!(&events[0], ConnectionEvent::AgentStateChanged { state } if state == "thinking")
        );

        // Unrelated attribute deltas yield nothing.
        let mut other = HashMap::new();
        other.insert("display_name".to_string(), "Agent".to_string());
        let events = mgr.handle_transport_event(&TransportEvent::AttributesChanged {
            identity: "agent".to_string(),
            changed: other,
        });
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn reconnects_use_a_separate_counter() {
        let transport = MockTransport::new();
        let mgr = manager(transport);
        mgr.connect().await;

        mgr.handle_transport_event(&TransportEvent::Reconnecting { attempt: 1 });
        mgr.handle_transport_event(&TransportEvent::Reconnected);

        let stats = mgr.stats();
        assert_eq!(stats.attempt_count, 1);
        assert_eq!(stats.reconnect_count, 1);
        assert_eq!(stats.state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn pause_failure_is_reported_as_event() {
        struct RejectingMute(Arc<MockTransport>);

        #[async_trait::async_trait]
        impl Transport for RejectingMute {
            async fn connect(&self, url: &str, token: &str) -> Result<(), VoxlinkError> {
                self.0.connect(url, token).await
            }
            async fn disconnect(&self) -> Result<(), VoxlinkError> {
                self.0.disconnect().await
            }
            async fn set_microphone_enabled(&self, _enabled: bool) -> Result<(), VoxlinkError> {
                Err(VoxlinkError::Transport {
                    reason: "no microphone track".to_string(),
                })
            }
            async fn send_data(&self, payload: Vec<u8>) -> Result<(), VoxlinkError> {
                self.0.send_data(payload).await
            }
            fn take_events(&self) -> Option<tokio::sync::mpsc::UnboundedReceiver<TransportEvent>> {
                self.0.take_events()
            }
        }

        let mgr = ConnectionManager::new(
            Arc::new(RejectingMute(MockTransport::new())),
            ConnectionConfig::new("wss://example.test", "token"),
        );
        let events = mgr.pause().await;
        assert!(matches!(events[0], ConnectionEvent::Error { .. }));
        assert!(!mgr.is_paused());
    }
}
