//! Peer connection module
//!
//! The capability-style peer connection primitive consumed by the session:
//! offer creation, description application, ICE candidate notifications,
//! stream enumeration and signaling state changes.

mod error;
#[cfg(feature = "webrtc-rs")]
pub mod webrtc;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::mpsc;

use crate::media::MediaStream;

pub use error::PeerError;

/// Default STUN server used when no ICE servers are configured
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// ICE server descriptor
///
/// Accepts `urls` as a string or a list, and the legacy single `url` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    #[serde(alias = "url", deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// The public STUN entry used by default
    pub fn default_stun() -> Self {
        Self::new(DEFAULT_STUN_SERVER)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}

/// Configuration used to create a peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub ice_servers: Vec<IceServer>,
}

/// Offer constraints: what the remote peer is asked to provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OfferConstraints {
    pub offer_to_receive_audio: bool,
    pub offer_to_receive_video: bool,
}

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Session description (SDP payload with its type)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Local ICE candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// Signaling state of a peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// Asynchronous notifications from a peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A gathered candidate; `None` marks the end of gathering
    IceCandidate(Option<IceCandidate>),
    /// The signaling state changed
    SignalingStateChange(SignalingState),
}

/// Sender used by peer connections to report events
pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

/// A peer connection
///
/// Implementations must report `SignalingState::Closed` through their event
/// sender once `close` has taken effect, exactly once.
pub trait PeerConnection: Send + Sync {
    /// Attach a local stream to be sent
    fn add_stream<'a>(&'a self, stream: &'a MediaStream) -> BoxFuture<'a, Result<(), PeerError>>;

    fn create_offer(
        &self,
        constraints: OfferConstraints,
    ) -> BoxFuture<'_, Result<SessionDescription, PeerError>>;

    fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> BoxFuture<'_, Result<(), PeerError>>;

    /// Current local description, candidates included once gathering ended
    fn local_description(&self) -> BoxFuture<'_, Option<SessionDescription>>;

    fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> BoxFuture<'_, Result<(), PeerError>>;

    fn local_streams(&self) -> Vec<MediaStream>;

    fn remote_streams(&self) -> Vec<MediaStream>;

    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Factory for peer connections
pub trait PeerConnector: Send + Sync {
    fn create(
        &self,
        config: PeerConfig,
        events: PeerEventSender,
    ) -> BoxFuture<'_, Result<Arc<dyn PeerConnection>, PeerError>>;
}
