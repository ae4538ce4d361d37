//! Audio pipeline for Voxlink
//!
//! Playback side: a sample queue drained by a real-time render
//! callback, with pause/resume/clear/mark semantics, plus an optional
//! cpal speaker sink that owns that callback. Capture side: a cpal
//! microphone pipeline producing fixed-size frames. PCM conversion is
//! shared between the transport-native and legacy streaming paths.

pub mod capture;
pub mod error;
pub mod output;
pub mod pcm;
pub mod playback;
pub mod tap;

pub use capture::{CaptureConfig, CapturePipeline, CapturedFrame, FrameChunker};
pub use error::MediaError;
pub use output::{OutputConfig, PlaybackSink};
pub use playback::{PlaybackEngine, PlaybackEvent, PlaybackState};
pub use tap::{RawAudioEncoding, RawAudioPacket, RawAudioSource, RawAudioTap};
