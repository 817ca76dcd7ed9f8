//! Device-side error types.

use acbridge_core::CommandError;
use std::net::SocketAddr;

/// Socket-level failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Could not bind or configure the discovery socket
    #[error("bind failed: {0}")]
    Bind(String),
    /// Could not open the status connection
    #[error("connect to {peer} failed: {reason}")]
    Connect {
        /// Status endpoint
        peer: SocketAddr,
        /// Underlying error
        reason: String,
    },
    /// Write failed
    #[error("send failed: {0}")]
    Send(String),
}

/// Errors surfaced by [`crate::Bridge`] operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// Set-request rejected; nothing was sent
    #[error(transparent)]
    Command(#[from] CommandError),
    /// Frame built but could not be written
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// No device has been discovered yet
    #[error("no device bound")]
    NotBound,
}
