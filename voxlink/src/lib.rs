//! # Voxlink - Voice Agent Client SDK
//!
//! Voxlink is a client SDK for real-time voice conversations with AI
//! agents. It orchestrates a transport session, realtime audio playback
//! and capture, call analytics and remote tool invocation behind a
//! single session object and one unified event stream.
//!
//! ## Key Features
//!
//! - **One event stream**: connection lifecycle, speaking/listening,
//!   transcription, tools and errors arrive on a single subscription
//! - **Never-failing lifecycle**: `start`/`end`/`pause`/`resume` report
//!   errors as events; strict `try_*` variants exist on the connection
//!   layer for structured error handling
//! - **Realtime-safe audio**: the playback queue never blocks the
//!   render callback; underrun degrades to silence
//! - **Verified metrics only**: the customer-facing snapshot carries
//!   measured values, estimates stay behind a separate accessor
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voxlink::{MockTransport, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = MockTransport::new();
//!     let config = SessionConfig::new("wss://voice.example.com", "token");
//!     let (session, mut events) = Session::new(transport, config);
//!
//!     session.start().await;
//!     while let Some(event) = events.next().await {
//!         println!("session event: {}", event.event_type());
//!     }
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use voxlink_core::{
    retry_with_backoff, CancellationFlag, ConnectionConfig, ConnectionEvent, ConnectionManager,
    ConnectionState, ConnectionStats, MockTransport, ParticipantInfo, Party, ProvisionedSession,
    RetryPolicy, RpcRequest, SessionProvisioner, TrackInfo, TrackKind, Transport, TransportEvent,
    TransportQuality, VoxlinkError, AGENT_STATE_ATTRIBUTE,
};

pub use voxlink_media::{
    CaptureConfig, CapturePipeline, CapturedFrame, MediaError, OutputConfig, PlaybackEngine,
    PlaybackEvent, PlaybackSink, PlaybackState, RawAudioEncoding, RawAudioPacket, RawAudioSource,
};

pub use voxlink_analytics::{
    AnalyticsConfig, AnalyticsEvent, DropoutConfig, EstimatedMetrics, QualityLabel, VadConfig,
    VerifiedMetrics,
};

#[cfg(feature = "legacy-wire")]
pub use voxlink_wire::{LegacyStreamClient, WireEvent, WireMessage};

// Public API modules
pub mod config;
pub mod event;
pub mod session;
pub mod tools;

// Re-export main API types
pub use config::SessionConfig;
pub use event::{EventStream, SessionEvent};
pub use session::Session;
pub use tools::{ToolDefinition, ToolHandler, ToolParameter, ToolRegistry};
