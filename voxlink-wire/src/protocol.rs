//! Legacy streaming protocol messages
//!
//! JSON text frames over a WebSocket, discriminated by an `event`
//! field. Payload-carrying frames nest their payload under a field of
//! the same name as the event, e.g.
//! `{"event":"media","media":{"payload":"<base64 PCM16>"}}`.

use serde::{Deserialize, Serialize};

/// Base64 PCM16 audio payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Base64-encoded little-endian PCM16 samples
    pub payload: String,
}

/// Named playback checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPayload {
    /// Checkpoint name, echoed back when playback reaches it
    pub name: String,
}

/// Text content carried by transcription and answer frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPayload {
    /// Segment text
    #[serde(default)]
    pub text: String,
    /// Whether this segment is final
    #[serde(default, rename = "final")]
    pub is_final: bool,
}

/// Inbound remote tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    /// Call id, echoed in the response for correlation
    pub id: String,
    /// Tool name to invoke
    pub name: String,
    /// Named arguments as a JSON object
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Response to a remote tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponsePayload {
    /// Call id from the matching [`ToolCallPayload`]
    pub id: String,
    /// Serialized tool result, or a `{"error": message}` object
    pub result: serde_json::Value,
}

/// One frame of the legacy streaming protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WireMessage {
    /// Session open
    Start {
        /// Stream identifier assigned by whichever side opens
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
    },
    /// Audio to play
    Media {
        /// The audio payload
        media: MediaPayload,
    },
    /// Flush playback immediately
    Clear,
    /// Checkpoint in the playback stream
    Mark {
        /// The checkpoint
        mark: MarkPayload,
    },
    /// Speech-to-text segment
    Transcription {
        /// The segment content
        transcription: ContentPayload,
    },
    /// Agent answer text
    Answer {
        /// The answer content
        answer: ContentPayload,
    },
    /// Informational pass-through
    Info {
        /// Arbitrary JSON carried verbatim
        info: serde_json::Value,
    },
    /// Remote tool invocation request
    Tools {
        /// The invocation
        tools: ToolCallPayload,
    },
    /// Remote tool invocation result
    ToolsResponse {
        /// The result, keyed by call id
        tools_response: ToolResponsePayload,
    },
    /// Graceful close
    Stop,
}

impl WireMessage {
    /// Serialize to a JSON text frame
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a JSON text frame
    pub fn from_frame(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
