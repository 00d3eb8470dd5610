//! Offer/answer negotiation
//!
//! Every step is started by a named handler and completes by posting a
//! `SessionEvent` back to the session task, so a step never begins before its
//! predecessor's completion has been handled.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::media::{DisplaySink, MediaStream};
use crate::peer::{
    IceCandidate, OfferConstraints, PeerConfig, PeerConnection, PeerConnector, PeerError,
    PeerEventSender, SessionDescription,
};
use crate::signaling::{MediaConstraints, SignalingApi, StartParams, StartResult};

use super::config::SessionConfig;
use super::error::SessionError;
use super::events::{SessionEvent, SessionEventSender};
use super::notification::{Notification, Notifier};
use super::state::{NegotiationState, Session};

/// Drives the peer connection from creation to an applied answer
pub(crate) struct NegotiationEngine {
    state: NegotiationState,
    config: Arc<SessionConfig>,
    connector: Arc<dyn PeerConnector>,
    display: Arc<dyn DisplaySink>,
    api: SignalingApi,
    events: SessionEventSender,
    gathering_complete: bool,
    candidate_count: usize,
}

impl NegotiationEngine {
    pub(crate) fn new(
        config: Arc<SessionConfig>,
        connector: Arc<dyn PeerConnector>,
        display: Arc<dyn DisplaySink>,
        api: SignalingApi,
        events: SessionEventSender,
    ) -> Self {
        Self {
            state: NegotiationState::Idle,
            config,
            connector,
            display,
            api,
            events,
            gathering_complete: false,
            candidate_count: 0,
        }
    }

    pub(crate) fn state(&self) -> NegotiationState {
        self.state
    }

    /// Create the peer connection, attach the local stream and request an offer
    pub(crate) async fn begin(
        &mut self,
        session: &mut Session,
        local_stream: Option<MediaStream>,
        peer_events: PeerEventSender,
    ) -> Result<(), SessionError> {
        let peer_config = PeerConfig {
            ice_servers: self.config.ice_servers().to_vec(),
        };
        let peer = self.connector.create(peer_config, peer_events).await?;
        session.attach_peer_connection(peer.clone());
        info!(
            "Peer connection created ({} ICE server(s))",
            self.config.ice_servers().len()
        );

        if let Some(stream) = local_stream {
            if self.config.audio().local || self.config.video().local {
                peer.add_stream(&stream).await?;
                debug!("Local stream {} attached", stream.id());
            }
        }

        // Ask the remote peer for what we want to receive
        let constraints = OfferConstraints {
            offer_to_receive_audio: self.config.audio().remote,
            offer_to_receive_video: self.config.video().remote,
        };

        let events = self.events.clone();
        tokio::spawn(async move {
            let result = peer.create_offer(constraints).await;
            let _ = events.send(SessionEvent::OfferCreated(result));
        });

        Ok(())
    }

    pub(crate) fn on_offer_created(
        &mut self,
        session: &Session,
        result: Result<SessionDescription, PeerError>,
    ) -> Result<(), SessionError> {
        let offer = result?;
        self.transition(NegotiationState::OfferCreated);

        let peer = peer_of(session)?;
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = peer.set_local_description(offer).await;
            let _ = events.send(SessionEvent::LocalDescriptionSet(result));
        });

        Ok(())
    }

    pub(crate) fn on_local_description_set(
        &mut self,
        session: &Session,
        result: Result<(), PeerError>,
    ) -> Result<(), SessionError> {
        result?;
        info!("LocalDescription correctly set");
        self.transition(NegotiationState::LocalDescriptionSet);
        self.transition(NegotiationState::CandidatesGathering);

        if self.gathering_complete {
            self.send_offer(session)?;
        }
        Ok(())
    }

    /// Handle a gathered candidate or the end-of-candidates marker (`None`)
    pub(crate) fn on_ice_candidate(
        &mut self,
        session: &Session,
        candidate: Option<IceCandidate>,
    ) -> Result<(), SessionError> {
        let Some(candidate) = candidate else {
            if self.gathering_complete {
                return Ok(());
            }
            self.gathering_complete = true;
            info!(
                "ICE gathering complete ({} candidates)",
                self.candidate_count
            );

            if self.state == NegotiationState::CandidatesGathering {
                return self.send_offer(session);
            }
            debug!(
                "End of candidates received in state {:?}, offer deferred",
                self.state
            );
            return Ok(());
        };

        self.candidate_count += 1;
        trace!("Local ICE candidate: {}", candidate.candidate);
        Ok(())
    }

    pub(crate) fn on_start_completed(
        &mut self,
        session: &mut Session,
        result: Result<StartResult, SessionError>,
    ) -> Result<(), SessionError> {
        let result = result?;
        info!("Signaling server accepted session {}", result.session_id);
        session.assign_session_id(result.session_id);

        let peer = peer_of(session)?;
        let answer = SessionDescription::answer(result.sdp);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = peer.set_remote_description(answer).await;
            let _ = events.send(SessionEvent::RemoteDescriptionSet(result));
        });

        Ok(())
    }

    pub(crate) fn on_remote_description_set(
        &mut self,
        result: Result<(), PeerError>,
    ) -> Result<(), SessionError> {
        result?;
        self.transition(NegotiationState::AnswerApplied);
        self.transition(NegotiationState::Connected);
        Ok(())
    }

    /// Resolve the negotiated streams, bind them and notify the application
    ///
    /// Each expected direction must yield a stream. Notifications for streams
    /// resolved before a failure have already been emitted.
    pub(crate) fn resolve_streams(
        &self,
        session: &Session,
        notifier: &Notifier,
    ) -> Result<(), SessionError> {
        let peer = peer_of(session)?;

        if self.config.audio().local || self.config.video().local {
            let stream = peer
                .local_streams()
                .into_iter()
                .next()
                .ok_or(SessionError::NoLocalStream)?;

            // Display targets are video elements
            if self.config.video().local {
                if let Some(target) = self.config.local_video_tag() {
                    self.display.bind(target, &stream)?;
                }
            }
            notifier.emit(Notification::LocalStream(stream));
        }

        if self.config.audio().remote || self.config.video().remote {
            let stream = peer
                .remote_streams()
                .into_iter()
                .next()
                .ok_or(SessionError::NoRemoteStream)?;

            if self.config.video().remote {
                if let Some(target) = self.config.remote_video_tag() {
                    self.display.bind(target, &stream)?;
                }
            }
            notifier.emit(Notification::RemoteStream(stream));
        }

        Ok(())
    }

    /// Move to `Failed` unless negotiation already ended
    pub(crate) fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.transition(NegotiationState::Failed);
        }
    }

    fn send_offer(&mut self, session: &Session) -> Result<(), SessionError> {
        let peer = peer_of(session)?;
        self.transition(NegotiationState::OfferSent);

        let api = self.api.clone();
        let constraints = self.config.constraints();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = send_start(peer, api, constraints).await;
            let _ = events.send(SessionEvent::StartCompleted(result));
        });

        Ok(())
    }

    fn transition(&mut self, next: NegotiationState) {
        if self.state.is_terminal() {
            warn!(
                "Ignoring negotiation transition {:?} -> {:?}",
                self.state, next
            );
            return;
        }
        debug!("Negotiation: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

fn peer_of(session: &Session) -> Result<Arc<dyn PeerConnection>, SessionError> {
    session
        .peer_connection()
        .cloned()
        .ok_or(SessionError::Negotiation(PeerError::Closed))
}

/// Send the gathered local description as the `start` request
async fn send_start(
    peer: Arc<dyn PeerConnection>,
    api: SignalingApi,
    constraints: MediaConstraints,
) -> Result<StartResult, SessionError> {
    let description = peer
        .local_description()
        .await
        .ok_or(PeerError::MissingLocalDescription)?;

    let params = StartParams {
        sdp: description.sdp,
        constraints,
    };
    Ok(api.start(params).await?)
}
