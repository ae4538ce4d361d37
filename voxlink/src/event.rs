//! Unified session event stream
//!
//! Every subsystem's events are re-emitted here under a single flat
//! namespace, so applications subscribe once. Event names across
//! subsystems are disjoint by construction.

use tokio::sync::mpsc;

use voxlink_analytics::{QualityLabel, VerifiedMetrics};
use voxlink_core::{ParticipantInfo, Party, TrackInfo};

/// Events emitted by a [`crate::Session`]
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Session established; emitted exactly once per session
    Connected {
        /// Handshake duration in milliseconds
        handshake_ms: u64,
    },
    /// Session ended; all internal state is already cleaned up when
    /// this is observed
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
    /// The agent's conversational state changed
    AgentStateChanged {
        /// New state value (listening/thinking/speaking)
        state: String,
    },
    /// A remote track was subscribed
    TrackSubscribed {
        /// The subscribed track
        track: TrackInfo,
    },
    /// A remote track was unsubscribed
    TrackUnsubscribed {
        /// Id of the removed track
        track_id: String,
    },
    /// A track's mute state changed
    TrackMuteChanged {
        /// Track id
        track_id: String,
        /// Whether the track is now muted
        muted: bool,
    },
    /// The agent started speaking
    Speaking,
    /// The agent stopped speaking
    Listening,
    /// Qualified voice activity began for a party
    VoiceActivity {
        /// Who is speaking
        party: Party,
    },
    /// An audio dropout was confirmed
    AudioDropout {
        /// Whose audio dropped
        party: Party,
        /// Measured silence duration in milliseconds
        duration_ms: u64,
    },
    /// The connection quality label changed
    QualityChanged {
        /// New quality label
        quality: QualityLabel,
    },
    /// Periodic metrics snapshot
    MetricsSnapshot {
        /// Metrics at the time of the snapshot
        metrics: VerifiedMetrics,
    },
    /// Outbound microphone was muted
    MicrophonePaused,
    /// Outbound microphone was unmuted
    MicrophoneResumed,
    /// A speech-to-text segment arrived
    Transcription {
        /// Segment text, always non-empty
        text: String,
        /// Whether the segment is final
        is_final: bool,
    },
    /// The agent produced answer text
    Answer {
        /// Answer text
        text: String,
    },
    /// A data message that is neither an answer nor a transcription
    Custom {
        /// Original payload, parsed
        payload: serde_json::Value,
        /// Identity of the sender
        sender: String,
    },
    /// A registered tool was invoked by the remote agent
    ToolInvoked {
        /// Name of the invoked tool
        name: String,
    },
    /// Agent playback drained to empty
    PlaybackFinished,
    /// Playback reached a named checkpoint
    PlaybackMark {
        /// Checkpoint name
        name: String,
    },
    /// A recoverable error occurred
    Error {
        /// Descriptive error message
        message: String,
    },
}

impl SessionEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::Connected { .. } => "connected",
            SessionEvent::Disconnected { .. } => "disconnected",
            SessionEvent::Reconnecting { .. } => "reconnecting",
            SessionEvent::Reconnected => "reconnected",
            SessionEvent::ParticipantJoined { .. } => "participant_joined",
            SessionEvent::ParticipantLeft { .. } => "participant_left",
            SessionEvent::AgentStateChanged { .. } => "agent_state_changed",
            SessionEvent::TrackSubscribed { .. } => "track_subscribed",
            SessionEvent::TrackUnsubscribed { .. } => "track_unsubscribed",
            SessionEvent::TrackMuteChanged { .. } => "track_mute_changed",
            SessionEvent::Speaking => "speaking",
            SessionEvent::Listening => "listening",
            SessionEvent::VoiceActivity { .. } => "voice_activity",
            SessionEvent::AudioDropout { .. } => "audio_dropout",
            SessionEvent::QualityChanged { .. } => "quality_changed",
            SessionEvent::MetricsSnapshot { .. } => "metrics_snapshot",
            SessionEvent::MicrophonePaused => "microphone_paused",
            SessionEvent::MicrophoneResumed => "microphone_resumed",
            SessionEvent::Transcription { .. } => "transcription",
            SessionEvent::Answer { .. } => "answer",
            SessionEvent::Custom { .. } => "custom",
            SessionEvent::ToolInvoked { .. } => "tool_invoked",
            SessionEvent::PlaybackFinished => "playback_finished",
            SessionEvent::PlaybackMark { .. } => "playback_mark",
            SessionEvent::Error { .. } => "error",
        }
    }

    /// Check if this is a connection lifecycle event
    pub fn is_connection_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::Connected { .. }
                | SessionEvent::Disconnected { .. }
                | SessionEvent::Reconnecting { .. }
                | SessionEvent::Reconnected
                | SessionEvent::QualityChanged { .. }
        )
    }

    /// Check if this is an audio activity or playback event
    pub fn is_audio_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::Speaking
                | SessionEvent::Listening
                | SessionEvent::VoiceActivity { .. }
                | SessionEvent::AudioDropout { .. }
                | SessionEvent::MicrophonePaused
                | SessionEvent::MicrophoneResumed
                | SessionEvent::PlaybackFinished
                | SessionEvent::PlaybackMark { .. }
        )
    }

    /// Check if this is a content or data event
    pub fn is_data_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::Transcription { .. }
                | SessionEvent::Answer { .. }
                | SessionEvent::Custom { .. }
                | SessionEvent::ToolInvoked { .. }
        )
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, SessionEvent::Error { .. })
    }
}

/// Stream of session events for async iteration
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<SessionEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Check if the event stream is closed
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}
