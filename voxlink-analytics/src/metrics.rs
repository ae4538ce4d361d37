//! Metric types and connection-quality mapping
//!
//! Verified and estimated metrics are distinct types so estimated
//! numbers cannot leak into the customer-facing snapshot: the snapshot
//! API only ever produces [`VerifiedMetrics`], while
//! [`EstimatedMetrics`] stays behind an internal accessor.

use serde::Serialize;
use voxlink_core::TransportQuality;

/// Human-facing connection quality label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLabel {
    /// No quality report received yet
    Unknown,
    /// Excellent connection quality
    Excellent,
    /// Good connection quality
    Good,
    /// Poor connection quality
    Poor,
    /// Connection effectively lost
    Lost,
}

impl QualityLabel {
    /// Label string as exposed to applications
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLabel::Unknown => "unknown",
            QualityLabel::Excellent => "excellent",
            QualityLabel::Good => "good",
            QualityLabel::Poor => "poor",
            QualityLabel::Lost => "lost",
        }
    }
}

impl From<TransportQuality> for QualityLabel {
    /// Anything the mapping does not recognize is "lost"; "unknown" is
    /// reserved for the uninitialized default.
    fn from(quality: TransportQuality) -> Self {
        match quality {
            TransportQuality::Excellent => QualityLabel::Excellent,
            TransportQuality::Good => QualityLabel::Good,
            TransportQuality::Poor => QualityLabel::Poor,
            _ => QualityLabel::Lost,
        }
    }
}

/// Externally verifiable call metrics
///
/// Every field here is either directly observed (counters, elapsed
/// durations) or a verbatim transport report (the quality label).
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedMetrics {
    /// Connection quality label
    pub connection_quality: QualityLabel,
    /// Connection attempts made, failed attempts included
    pub connect_attempts: u32,
    /// Reconnection episodes observed
    pub reconnect_count: u32,
    /// Milliseconds since the call was established, if connected
    pub call_duration_ms: Option<u64>,
    /// Agent speech start minus the most recent user speech start
    pub response_time_ms: Option<u64>,
    /// Accumulated user speaking time in milliseconds
    pub user_speaking_ms: u64,
    /// Accumulated agent speaking time in milliseconds
    pub agent_speaking_ms: u64,
    /// Confirmed audio dropouts
    pub dropout_count: u32,
    /// Qualified voice-activity runs observed
    pub vad_events: u32,
    /// Remote participants currently in the session
    pub participant_count: usize,
    /// Remote tracks currently subscribed
    pub track_count: usize,
}

/// Network metrics approximated from the quality label alone
///
/// These numbers are NOT measurements; they are coarse proxies derived
/// solely from [`QualityLabel`] and must never be presented as measured
/// values. They intentionally do not appear in [`VerifiedMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct EstimatedMetrics {
    /// Approximate round-trip latency in milliseconds
    pub latency_ms: u32,
    /// Approximate jitter in milliseconds
    pub jitter_ms: u32,
    /// Approximate available bandwidth in kbps
    pub bandwidth_kbps: u32,
    /// Approximate packet loss percentage
    pub packet_loss_pct: f32,
}

impl EstimatedMetrics {
    /// Derive proxy numbers for a quality label
    pub fn from_label(label: QualityLabel) -> Self {
        match label {
            QualityLabel::Excellent => Self {
                latency_ms: 30,
                jitter_ms: 5,
                bandwidth_kbps: 4000,
                packet_loss_pct: 0.1,
            },
            QualityLabel::Good => Self {
                latency_ms: 80,
                jitter_ms: 15,
                bandwidth_kbps: 1500,
                packet_loss_pct: 1.0,
            },
            QualityLabel::Poor => Self {
                latency_ms: 250,
                jitter_ms: 60,
                bandwidth_kbps: 400,
                packet_loss_pct: 5.0,
            },
            QualityLabel::Lost | QualityLabel::Unknown => Self {
                latency_ms: 0,
                jitter_ms: 0,
                bandwidth_kbps: 0,
                packet_loss_pct: 100.0,
            },
        }
    }
}
