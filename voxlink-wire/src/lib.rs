//! Legacy raw-WebSocket media streaming path for Voxlink
//!
//! JSON text frames discriminated by an `event` field carry base64
//! PCM16 audio, playback control, transcription text and tool calls.
//! The transport-native path supersedes this protocol; it is kept for
//! backends that have not migrated.

pub mod client;
pub mod protocol;

pub use client::{LegacyStreamClient, WireEvent, WireToolHandler};
pub use protocol::{
    ContentPayload, MarkPayload, MediaPayload, ToolCallPayload, ToolResponsePayload, WireMessage,
};
