//! Completions posted back to the session task

use crate::media::{MediaError, MediaStream};
use crate::peer::{PeerError, SessionDescription};
use crate::signaling::{PollResult, RpcError, StartResult};

use super::error::SessionError;

/// Work completed outside the session task
#[derive(Debug)]
pub(crate) enum SessionEvent {
    MediaAcquired(Result<MediaStream, MediaError>),
    OfferCreated(Result<SessionDescription, PeerError>),
    LocalDescriptionSet(Result<(), PeerError>),
    StartCompleted(Result<StartResult, SessionError>),
    RemoteDescriptionSet(Result<(), PeerError>),
    PollCompleted(Result<PollResult, RpcError>),
    PollDue,
    /// Stop waiting for a poll held past the peer close
    CloseGraceElapsed,
    Terminate,
}

impl SessionEvent {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::MediaAcquired(_) => "media-acquired",
            Self::OfferCreated(_) => "offer-created",
            Self::LocalDescriptionSet(_) => "local-description-set",
            Self::StartCompleted(_) => "start-completed",
            Self::RemoteDescriptionSet(_) => "remote-description-set",
            Self::PollCompleted(_) => "poll-completed",
            Self::PollDue => "poll-due",
            Self::CloseGraceElapsed => "close-grace-elapsed",
            Self::Terminate => "terminate",
        }
    }
}

pub(crate) type SessionEventSender = tokio::sync::mpsc::UnboundedSender<SessionEvent>;
