//! Core connection lifecycle and transport abstraction for Voxlink
//!
//! This crate owns the pieces every Voxlink session is built on: the
//! error taxonomy, the black-box [`Transport`] capability trait, the
//! [`ConnectionManager`] state machine and the retry policy used for
//! session provisioning polls.

pub mod connection;
pub mod error;
pub mod retry;
pub mod transport;

pub use connection::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStats,
    ParticipantInfo, AGENT_STATE_ATTRIBUTE,
};
pub use error::VoxlinkError;
pub use retry::{
    retry_with_backoff, CancellationFlag, ProvisionedSession, RetryPolicy, SessionProvisioner,
};
pub use transport::{
    MockTransport, Party, RpcRequest, TrackInfo, TrackKind, Transport, TransportEvent,
    TransportQuality,
};
