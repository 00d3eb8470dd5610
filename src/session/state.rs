//! Per-session mutable state

use std::sync::Arc;

use tracing::warn;

use crate::peer::PeerConnection;

use super::error::SessionError;

/// Event polling state
///
/// ```text
/// NotStarted --> Polling: connected
/// NotStarted --> Stopped: terminate()
/// Polling --> Stopped: terminate()
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollState {
    #[default]
    NotStarted,
    Polling,
    Stopped,
}

/// Negotiation progress
///
/// ```text
/// Idle --> OfferCreated --> LocalDescriptionSet --> CandidatesGathering
///      --> OfferSent --> AnswerApplied --> Connected
/// any non-terminal state --> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    #[default]
    Idle,
    OfferCreated,
    LocalDescriptionSet,
    CandidatesGathering,
    OfferSent,
    AnswerApplied,
    Connected,
    Failed,
}

impl NegotiationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Connected | Self::Failed)
    }
}

/// State of the single negotiation attempt owned by a controller
#[derive(Default)]
pub struct Session {
    session_id: Option<String>,
    peer_connection: Option<Arc<dyn PeerConnection>>,
    pub(crate) poll_state: PollState,
    pub(crate) error_try_count: u32,
    last_error: Option<SessionError>,
    terminating: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Store the server assigned id; only the first assignment is kept
    pub fn assign_session_id(&mut self, session_id: String) -> bool {
        if let Some(existing) = &self.session_id {
            warn!(
                "Session id already assigned ({}), ignoring {}",
                existing, session_id
            );
            return false;
        }
        self.session_id = Some(session_id);
        true
    }

    pub fn peer_connection(&self) -> Option<&Arc<dyn PeerConnection>> {
        self.peer_connection.as_ref()
    }

    pub(crate) fn attach_peer_connection(&mut self, peer: Arc<dyn PeerConnection>) {
        self.peer_connection = Some(peer);
    }

    pub fn poll_state(&self) -> PollState {
        self.poll_state
    }

    pub fn error_try_count(&self) -> u32 {
        self.error_try_count
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    /// Record an error; the first one wins
    pub fn record_error(&mut self, error: SessionError) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        self.last_error = Some(error);
        true
    }

    pub(crate) fn take_error(&mut self) -> Option<SessionError> {
        self.last_error.take()
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating
    }

    /// Mark the session as terminating; false if it already was
    pub(crate) fn begin_termination(&mut self) -> bool {
        !std::mem::replace(&mut self.terminating, true)
    }
}
