//! Raw audio tap
//!
//! Optional forwarding of unprocessed audio to the host application,
//! selectable by source (agent playback, user capture, or both) and
//! output encoding. Codec containers are out of scope; the tap emits
//! plain PCM.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::pcm;
use voxlink_core::Party;

/// Which audio to forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawAudioSource {
    /// Only agent playback audio
    Agent,
    /// Only user microphone audio
    User,
    /// Both directions
    Both,
}

impl RawAudioSource {
    fn includes(self, party: Party) -> bool {
        matches!(
            (self, party),
            (RawAudioSource::Both, _)
                | (RawAudioSource::Agent, Party::Agent)
                | (RawAudioSource::User, Party::User)
        )
    }
}

/// Output encoding for forwarded audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawAudioEncoding {
    /// 32-bit float PCM, native byte order
    PcmF32,
    /// 16-bit signed integer PCM, little-endian
    Pcm16,
}

/// One packet of forwarded raw audio
#[derive(Debug, Clone)]
pub struct RawAudioPacket {
    /// Which party produced the audio
    pub party: Party,
    /// Encoding of the payload
    pub encoding: RawAudioEncoding,
    /// Encoded audio bytes
    pub payload: Vec<u8>,
}

struct TapState {
    source: RawAudioSource,
    encoding: RawAudioEncoding,
    sink: mpsc::UnboundedSender<RawAudioPacket>,
}

/// Forwards raw audio frames to an application-provided channel
#[derive(Default)]
pub struct RawAudioTap {
    state: Mutex<Option<TapState>>,
}

impl RawAudioTap {
    /// Create a disabled tap
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable forwarding; replaces any previous subscription
    pub fn enable(
        &self,
        source: RawAudioSource,
        encoding: RawAudioEncoding,
    ) -> mpsc::UnboundedReceiver<RawAudioPacket> {
        let (sink, receiver) = mpsc::unbounded_channel();
        *self.state.lock() = Some(TapState {
            source,
            encoding,
            sink,
        });
        debug!("raw audio tap enabled for {source:?} as {encoding:?}");
        receiver
    }

    /// Disable forwarding
    pub fn disable(&self) {
        *self.state.lock() = None;
    }

    /// Whether forwarding is currently enabled
    pub fn is_enabled(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Forward one frame of samples if the tap covers this party
    pub fn forward(&self, party: Party, samples: &[f32]) {
        let state = self.state.lock();
        let Some(state) = state.as_ref() else {
            return;
        };
        if !state.source.includes(party) {
            return;
        }
        let payload = match state.encoding {
            RawAudioEncoding::PcmF32 => samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            RawAudioEncoding::Pcm16 => pcm::encode_pcm16(samples),
        };
        let _ = state.sink.send(RawAudioPacket {
            party,
            encoding: state.encoding,
            payload,
        });
    }
}
