//! PCM sample conversion and wire payload encoding
//!
//! Shared by the legacy streaming path and the raw-audio tap, so there
//! is exactly one place that converts between f32 samples, little-endian
//! PCM16 bytes and base64 wire payloads.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::MediaError;

/// Convert an f32 sample in -1.0..=1.0 to a signed 16-bit sample
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Convert a signed 16-bit sample to f32 in -1.0..=1.0
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

/// Pack f32 samples into little-endian PCM16 bytes
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
    }
    bytes
}

/// Unpack little-endian PCM16 bytes into f32 samples
///
/// A trailing odd byte is rejected rather than silently dropped.
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>, MediaError> {
    if bytes.len() % 2 != 0 {
        return Err(MediaError::InvalidPayload {
            reason: format!("PCM16 payload has odd length {}", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}

/// Encode f32 samples as a base64 PCM16 wire payload
pub fn encode_payload(samples: &[f32]) -> String {
    BASE64.encode(encode_pcm16(samples))
}

/// Decode a base64 PCM16 wire payload into f32 samples
pub fn decode_payload(payload: &str) -> Result<Vec<f32>, MediaError> {
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| MediaError::InvalidPayload {
            reason: format!("invalid base64: {e}"),
        })?;
    decode_pcm16(&bytes)
}
