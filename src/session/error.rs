//! Session error types

use thiserror::Error;

use crate::media::{DisplayError, MediaError};
use crate::peer::PeerError;
use crate::signaling::RpcError;

/// Errors surfaced by a session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Device acquisition failed: {0}")]
    DeviceAcquisition(#[from] MediaError),

    #[error("Negotiation failed: {0}")]
    Negotiation(#[from] PeerError),

    #[error("Signaling request failed: {0}")]
    SignalingRpc(#[from] RpcError),

    #[error("No local streams are available")]
    NoLocalStream,

    #[error("No remote streams are available")]
    NoRemoteStream,

    #[error("Display binding failed: {0}")]
    DisplayBinding(#[from] DisplayError),
}
