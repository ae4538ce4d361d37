//! Error types for Voxlink

use std::time::Duration;
use thiserror::Error;

/// Main error type for Voxlink operations
#[derive(Error, Debug)]
pub enum VoxlinkError {
    /// Initialization error (token acquisition, conversation setup)
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
        /// Optional machine-readable key for localized user guidance
        i18n_key: Option<String>,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },

    /// Connection handshake or teardown error
    #[error("Connection failed: {reason}")]
    Connection {
        /// Reason for connection failure
        reason: String,
    },

    /// Transport error
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason for transport error
        reason: String,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Operation timed out error
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration after which timeout occurred
        duration: Duration,
    },

    /// Retry budget exhausted for a polled operation
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Operation that was retried
        operation: String,
        /// Number of attempts made
        attempts: u32,
        /// Last error observed before giving up
        last_error: String,
    },

    /// Operation was cancelled before it could complete
    #[error("Operation cancelled: {operation}")]
    Cancelled {
        /// Operation that was cancelled
        operation: String,
    },

    /// Remote procedure call error
    #[error("RPC error for method {method}: {reason}")]
    Rpc {
        /// RPC method name
        method: String,
        /// Reason for RPC failure
        reason: String,
    },

    /// Invalid data error
    #[error("Invalid data: {reason}")]
    InvalidData {
        /// Reason for invalid data
        reason: String,
    },
}

impl VoxlinkError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            VoxlinkError::Initialization { .. } => "INITIALIZATION_FAILED".to_string(),
            VoxlinkError::MissingConfiguration { .. } => "MISSING_CONFIGURATION".to_string(),
            VoxlinkError::Connection { .. } => "CONNECTION_FAILED".to_string(),
            VoxlinkError::Transport { .. } => "TRANSPORT_ERROR".to_string(),
            VoxlinkError::InvalidState { .. } => "INVALID_STATE".to_string(),
            VoxlinkError::Timeout { .. } => "TIMEOUT".to_string(),
            VoxlinkError::RetryExhausted { .. } => "RETRY_EXHAUSTED".to_string(),
            VoxlinkError::Cancelled { .. } => "CANCELLED".to_string(),
            VoxlinkError::Rpc { .. } => "RPC_ERROR".to_string(),
            VoxlinkError::InvalidData { .. } => "INVALID_DATA".to_string(),
        }
    }
}
