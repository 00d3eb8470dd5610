//! Peer connection error types

use thiserror::Error;

/// Errors raised by the peer connection primitive
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("Failed to create peer connection: {0}")]
    Create(String),

    #[error("Failed to attach local stream: {0}")]
    AddStream(String),

    #[error("Failed to create offer: {0}")]
    CreateOffer(String),

    #[error("Failed to set local description: {0}")]
    LocalDescription(String),

    #[error("Failed to set remote description: {0}")]
    RemoteDescription(String),

    #[error("Local description is not available")]
    MissingLocalDescription,

    #[error("Peer connection closed")]
    Closed,
}
