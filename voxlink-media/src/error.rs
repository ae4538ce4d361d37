//! Error types for audio capture and playback

use thiserror::Error;

/// Errors that can occur in the media pipeline
///
/// Device acquisition failures are split into distinct kinds so the host
/// application can show targeted user guidance for each.
#[derive(Error, Debug)]
pub enum MediaError {
    /// The user denied microphone access
    #[error("Permission denied to access device")]
    PermissionDenied,

    /// Requested device does not exist
    #[error("Device not found: {device}")]
    DeviceNotFound {
        /// Device name that was not found
        device: String,
    },

    /// Device exists but is in use elsewhere
    #[error("Device is busy: {device}")]
    DeviceBusy {
        /// Device name that is busy
        device: String,
    },

    /// Acquisition was aborted before completing
    #[error("Device acquisition aborted")]
    Aborted,

    /// Requested configuration not supported by the device
    #[error("Configuration not supported: {reason}")]
    ConfigurationNotSupported {
        /// Reason why configuration is not supported
        reason: String,
    },

    /// Capture or playback stream error
    #[error("Stream error: {reason}")]
    StreamError {
        /// Reason for the stream error
        reason: String,
    },

    /// Malformed audio payload
    #[error("Invalid payload: {reason}")]
    InvalidPayload {
        /// Reason the payload was rejected
        reason: String,
    },

    /// Anything the platform did not classify further
    #[error("Device error: {reason}")]
    Unknown {
        /// Reason for the failure
        reason: String,
    },
}

impl MediaError {
    /// Classify a cpal stream build error into a distinguishable kind
    pub fn from_build_stream(err: cpal::BuildStreamError, device: &str) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => MediaError::DeviceBusy {
                device: device.to_string(),
            },
            cpal::BuildStreamError::StreamConfigNotSupported => {
                MediaError::ConfigurationNotSupported {
                    reason: format!("device {device} rejected the requested config"),
                }
            }
            cpal::BuildStreamError::InvalidArgument => MediaError::ConfigurationNotSupported {
                reason: "invalid stream argument".to_string(),
            },
            // cpal has no dedicated permission variant; hosts report a
            // user denial as a backend-specific error.
            cpal::BuildStreamError::BackendSpecific { err } => {
                let lowered = err.description.to_lowercase();
                if lowered.contains("permission")
                    || lowered.contains("denied")
                    || lowered.contains("not permitted")
                {
                    MediaError::PermissionDenied
                } else {
                    MediaError::Unknown {
                        reason: err.description,
                    }
                }
            }
            other => MediaError::Unknown {
                reason: other.to_string(),
            },
        }
    }
}
