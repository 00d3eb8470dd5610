//! Session controller
//!
//! Owns the `Session` and runs it on a single task: every I/O completion is
//! posted back as an event and handled one at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::media::{DisplaySink, MediaSource, MediaStream};
use crate::peer::{PeerConnector, PeerEvent, PeerEventSender, SignalingState};
use crate::signaling::{PollResult, RpcError, SignalingApi, SignalingChannel};

use super::config::{SessionConfig, SessionOptions};
use super::error::SessionError;
use super::events::{SessionEvent, SessionEventSender};
use super::negotiation::NegotiationEngine;
use super::notification::{Notification, NotificationCallback, Notifier};
use super::poller::EventPoller;
use super::state::Session;

/// Longest wait for an in-flight poll once the peer connection has closed
const POLL_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Collaborators supplied by the platform
#[derive(Clone)]
pub struct Platform {
    /// Request/response channel to the signaling server
    pub signaling: Arc<dyn SignalingChannel>,
    /// Peer connection factory
    pub peers: Arc<dyn PeerConnector>,
    /// Local capture
    pub media: Arc<dyn MediaSource>,
    /// Display targets
    pub display: Arc<dyn DisplaySink>,
}

/// Controller of one negotiation attempt
pub struct SessionController {
    config: Arc<SessionConfig>,
    platform: Platform,
    callback: Option<Arc<NotificationCallback>>,
}

impl SessionController {
    /// Validate the options; nothing is started yet
    pub fn new(
        endpoint: &str,
        options: SessionOptions,
        platform: Platform,
    ) -> Result<Self, SessionError> {
        let config = SessionConfig::new(endpoint, options)?;
        debug!(
            "Session configured for {} (audio: {}, video: {})",
            config.endpoint(),
            config.audio_mode(),
            config.video_mode()
        );

        Ok(Self {
            config: Arc::new(config),
            platform,
            callback: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Set the callback receiving every notification
    pub fn set_notification_callback<F>(&mut self, callback: F)
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(Box::new(callback)));
    }

    /// Spawn the session task
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> SessionHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let api = SignalingApi::new(self.platform.signaling.clone());

        let engine = NegotiationEngine::new(
            self.config.clone(),
            self.platform.peers.clone(),
            self.platform.display.clone(),
            api.clone(),
            events_tx.clone(),
        );
        let poller = EventPoller::new(self.config.poll_policy(), api.clone(), events_tx.clone());

        let task = SessionTask {
            config: self.config,
            media: self.platform.media,
            api,
            session: Session::new(),
            engine,
            poller,
            notifier: Notifier::new(self.callback),
            events: events_tx.clone(),
            peer_events: Some(peer_tx),
            peer_closed: false,
        };

        info!("Starting session with {}", task.config.endpoint());
        let task = tokio::spawn(task.run(events_rx, peer_rx));

        SessionHandle {
            events: events_tx,
            task,
        }
    }
}

/// Handle to a running session
pub struct SessionHandle {
    events: SessionEventSender,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Request termination
    ///
    /// The terminal notification follows once the peer connection closed.
    pub fn terminate(&self) {
        if self.events.send(SessionEvent::Terminate).is_err() {
            debug!("Session already closed");
        }
    }

    /// Wait until the session has delivered its terminal notification
    pub async fn closed(self) {
        if let Err(e) = self.task.await {
            warn!("Session task failed: {}", e);
        }
    }
}

enum Flow {
    Continue,
    Closed,
}

struct SessionTask {
    config: Arc<SessionConfig>,
    media: Arc<dyn MediaSource>,
    api: SignalingApi,
    session: Session,
    engine: NegotiationEngine,
    poller: EventPoller,
    notifier: Notifier,
    events: SessionEventSender,
    peer_events: Option<PeerEventSender>,
    /// The peer connection reported closed while a poll was in flight
    peer_closed: bool,
}

impl SessionTask {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        mut peer_events: mpsc::UnboundedReceiver<PeerEvent>,
    ) {
        if let Flow::Closed = self.startup().await {
            return;
        }

        loop {
            let flow = tokio::select! {
                Some(event) = events.recv() => self.handle_event(event).await,
                Some(event) = peer_events.recv() => self.handle_peer_event(event),
                else => break,
            };

            if let Flow::Closed = flow {
                break;
            }
        }

        debug!("Session task finished");
    }

    /// Acquire local media when sending, otherwise negotiate right away
    async fn startup(&mut self) -> Flow {
        let kinds = self.config.local_kinds();
        if kinds.is_empty() {
            return self.begin(None).await;
        }

        info!(
            "Requesting local media (audio: {}, video: {})",
            kinds.audio, kinds.video
        );
        let media = self.media.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = media.acquire(kinds).await;
            let _ = events.send(SessionEvent::MediaAcquired(result));
        });

        Flow::Continue
    }

    async fn begin(&mut self, local_stream: Option<MediaStream>) -> Flow {
        let Some(peer_events) = self.peer_events.take() else {
            warn!("Negotiation already started");
            return Flow::Continue;
        };

        match self
            .engine
            .begin(&mut self.session, local_stream, peer_events)
            .await
        {
            Ok(()) => Flow::Continue,
            Err(e) => self.fail(e),
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) -> Flow {
        match event {
            SessionEvent::Terminate => self.terminate(),
            SessionEvent::PollDue => {
                self.poller.on_due(&self.session);
                Flow::Continue
            }
            SessionEvent::PollCompleted(result) => self.on_poll_completed(result),
            SessionEvent::CloseGraceElapsed => {
                warn!("Pending poll did not complete within {:?}", POLL_CLOSE_GRACE);
                self.finish()
            }
            event if self.session.is_terminating() => {
                debug!("Ignoring {} after termination", event.name());
                Flow::Continue
            }
            SessionEvent::MediaAcquired(Ok(stream)) => {
                info!("User has granted access to local media");
                self.begin(Some(stream)).await
            }
            SessionEvent::MediaAcquired(Err(e)) => self.fail(e.into()),
            SessionEvent::OfferCreated(result) => {
                let result = self.engine.on_offer_created(&self.session, result);
                self.check(result)
            }
            SessionEvent::LocalDescriptionSet(result) => {
                let result = self.engine.on_local_description_set(&self.session, result);
                self.check(result)
            }
            SessionEvent::StartCompleted(result) => {
                let result = self.engine.on_start_completed(&mut self.session, result);
                self.check(result)
            }
            SessionEvent::RemoteDescriptionSet(result) => {
                match self.engine.on_remote_description_set(result) {
                    Ok(()) => self.on_connected(),
                    Err(e) => self.fail(e),
                }
            }
        }
    }

    fn handle_peer_event(&mut self, event: PeerEvent) -> Flow {
        match event {
            PeerEvent::SignalingStateChange(SignalingState::Closed) => {
                self.poller.stop(&mut self.session);
                if self.poller.in_flight() {
                    debug!("Peer connection closed, waiting for the pending poll");
                    self.peer_closed = true;
                    let events = self.events.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(POLL_CLOSE_GRACE).await;
                        let _ = events.send(SessionEvent::CloseGraceElapsed);
                    });
                    return Flow::Continue;
                }
                self.finish()
            }
            PeerEvent::SignalingStateChange(state) => {
                debug!("Signaling state changed to {:?}", state);
                Flow::Continue
            }
            PeerEvent::IceCandidate(_) if self.session.is_terminating() => Flow::Continue,
            PeerEvent::IceCandidate(candidate) => {
                let result = self.engine.on_ice_candidate(&self.session, candidate);
                self.check(result)
            }
        }
    }

    /// Late responses are still delivered but never reschedule
    fn on_poll_completed(&mut self, result: Result<PollResult, RpcError>) -> Flow {
        let flow = match result {
            Ok(result) => {
                self.poller
                    .on_success(&mut self.session, result, &self.notifier);
                Flow::Continue
            }
            Err(error) if self.session.is_terminating() => {
                self.poller.discard_failure(&error);
                Flow::Continue
            }
            Err(error) => match self.poller.on_failure(&mut self.session, error) {
                Ok(()) => Flow::Continue,
                Err(error) => self.fail(error.into()),
            },
        };

        match flow {
            Flow::Continue if self.peer_closed && !self.poller.in_flight() => self.finish(),
            flow => flow,
        }
    }

    fn on_connected(&mut self) -> Flow {
        info!(
            "Session {} connected",
            self.session.session_id().unwrap_or_default()
        );
        self.poller.start(&mut self.session);

        if let Err(e) = self.engine.resolve_streams(&self.session, &self.notifier) {
            return self.fail(e);
        }

        self.notifier.emit(Notification::Start);
        Flow::Continue
    }

    fn check(&mut self, result: Result<(), SessionError>) -> Flow {
        match result {
            Ok(()) => Flow::Continue,
            Err(e) => self.fail(e),
        }
    }

    /// Record the error (first one wins) and force termination
    fn fail(&mut self, error: SessionError) -> Flow {
        if self.session.record_error(error.clone()) {
            warn!("Session error: {}", error);
        } else {
            debug!("Subsequent session error ignored: {}", error);
        }
        self.engine.fail();
        self.terminate()
    }

    fn terminate(&mut self) -> Flow {
        if !self.session.begin_termination() {
            debug!("Termination already in progress");
            return Flow::Continue;
        }

        self.poller.stop(&mut self.session);

        if let Some(session_id) = self.session.session_id() {
            let api = self.api.clone();
            let session_id = session_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = api.terminate(&session_id).await {
                    debug!("Terminate request for {} failed: {}", session_id, e);
                }
            });
        }

        match self.session.peer_connection().cloned() {
            Some(peer) => {
                debug!("Closing peer connection");
                tokio::spawn(async move { peer.close().await });
                Flow::Continue
            }
            // Nothing will report a closed signaling state
            None => self.finish(),
        }
    }

    /// Emit the terminal notification
    fn finish(&mut self) -> Flow {
        self.poller.stop(&mut self.session);

        let notification = match self.session.take_error() {
            Some(error) => Notification::Error(error),
            None => Notification::Terminate,
        };
        info!(
            "Session closed ({}, negotiation {:?})",
            notification.name(),
            self.engine.state()
        );
        self.notifier.emit(notification);
        Flow::Closed
    }
}
