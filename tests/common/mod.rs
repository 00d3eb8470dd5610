//! Fake platform collaborators shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{self, BoxFuture};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

use webrtc_content::media::{DisplayRegistry, MediaError, MediaKinds, MediaSource, MediaStream};
use webrtc_content::peer::{
    IceCandidate, OfferConstraints, PeerConfig, PeerConnection, PeerConnector, PeerError,
    PeerEvent, PeerEventSender, SessionDescription, SignalingState,
};
use webrtc_content::signaling::{
    RpcError, SignalingChannel, METHOD_POLL, METHOD_START, METHOD_TERMINATE,
};
use webrtc_content::{Notification, Platform, SessionController, SessionHandle};

pub const ENDPOINT: &str = "ws://signaling.test/rpc";
pub const SESSION_ID: &str = "session-1";
pub const ANSWER_SDP: &str = "v=0 fake-answer";

/// Scripted signaling server
pub struct FakeSignaling {
    calls: Mutex<Vec<(String, Value)>>,
    start: Mutex<Result<Value, RpcError>>,
    polls: Mutex<VecDeque<Result<Value, RpcError>>>,
    poll_fallback: Mutex<Option<Result<Value, RpcError>>>,
    poll_delay: Mutex<Option<Duration>>,
    /// Held polls are answered once the session is terminated
    terminated: AtomicBool,
    released: Notify,
}

impl FakeSignaling {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            start: Mutex::new(Ok(json!({"sessionId": SESSION_ID, "sdp": ANSWER_SDP}))),
            polls: Mutex::new(VecDeque::new()),
            poll_fallback: Mutex::new(None),
            poll_delay: Mutex::new(None),
            terminated: AtomicBool::new(false),
            released: Notify::new(),
        }
    }

    pub fn set_start(&self, result: Result<Value, RpcError>) {
        *self.start.lock() = result;
    }

    /// Queue one poll result; an empty queue holds the poll until terminate
    pub fn push_poll(&self, result: Result<Value, RpcError>) {
        self.polls.lock().push_back(result);
    }

    /// Result returned once the queue is exhausted
    pub fn set_poll_fallback(&self, result: Result<Value, RpcError>) {
        *self.poll_fallback.lock() = Some(result);
    }

    /// Delay every poll response by `delay`
    pub fn set_poll_delay(&self, delay: Duration) {
        *self.poll_delay.lock() = Some(delay);
    }

    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(m, _)| m.clone()).collect()
    }
}

impl SignalingChannel for FakeSignaling {
    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Value,
    ) -> BoxFuture<'a, Result<Value, RpcError>> {
        self.calls.lock().push((method.to_string(), params));

        Box::pin(async move {
            match method {
                METHOD_START => self.start.lock().clone(),
                METHOD_POLL => {
                    let delay = *self.poll_delay.lock();
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    let next = self.polls.lock().pop_front();
                    let next = next.or_else(|| self.poll_fallback.lock().clone());
                    match next {
                        Some(result) => result,
                        None => {
                            let released = self.released.notified();
                            if !self.terminated.load(Ordering::SeqCst) {
                                released.await;
                            }
                            Ok(json!({}))
                        }
                    }
                }
                METHOD_TERMINATE => {
                    self.terminated.store(true, Ordering::SeqCst);
                    self.released.notify_waiters();
                    Ok(Value::Null)
                }
                _ => Ok(Value::Null),
            }
        })
    }
}

/// Behavior of the fake peer connections
#[derive(Clone)]
pub struct PeerBehavior {
    pub fail_create: Option<PeerError>,
    pub fail_create_offer: Option<PeerError>,
    pub fail_remote_description: Option<PeerError>,
    /// Report no local streams even when one was added
    pub hide_local_streams: bool,
    pub remote_streams: Vec<MediaStream>,
    pub candidates: usize,
    /// Report the end of gathering after the candidates
    pub end_of_candidates: bool,
}

impl Default for PeerBehavior {
    fn default() -> Self {
        Self {
            fail_create: None,
            fail_create_offer: None,
            fail_remote_description: None,
            hide_local_streams: false,
            remote_streams: vec![MediaStream::new("remote", MediaKinds::new(true, true))],
            candidates: 2,
            end_of_candidates: true,
        }
    }
}

pub struct FakeConnector {
    behavior: PeerBehavior,
    configs: Mutex<Vec<PeerConfig>>,
    peers: Mutex<Vec<Arc<FakePeer>>>,
}

impl FakeConnector {
    pub fn new(behavior: PeerBehavior) -> Self {
        Self {
            behavior,
            configs: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
        }
    }

    pub fn configs(&self) -> Vec<PeerConfig> {
        self.configs.lock().clone()
    }

    pub fn created(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn peer(&self) -> Option<Arc<FakePeer>> {
        self.peers.lock().first().cloned()
    }
}

impl PeerConnector for FakeConnector {
    fn create(
        &self,
        config: PeerConfig,
        events: PeerEventSender,
    ) -> BoxFuture<'_, Result<Arc<dyn PeerConnection>, PeerError>> {
        Box::pin(async move {
            self.configs.lock().push(config);
            if let Some(ref error) = self.behavior.fail_create {
                return Err(error.clone());
            }

            let peer = Arc::new(FakePeer {
                behavior: self.behavior.clone(),
                events,
                added: Mutex::new(Vec::new()),
                constraints: Mutex::new(None),
                local: Mutex::new(None),
                remote: Mutex::new(None),
                closed: AtomicBool::new(false),
                close_calls: AtomicUsize::new(0),
            });
            self.peers.lock().push(peer.clone());
            let peer: Arc<dyn PeerConnection> = peer;
            Ok(peer)
        })
    }
}

pub struct FakePeer {
    behavior: PeerBehavior,
    events: PeerEventSender,
    added: Mutex<Vec<MediaStream>>,
    constraints: Mutex<Option<OfferConstraints>>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl FakePeer {
    pub fn added_streams(&self) -> Vec<MediaStream> {
        self.added.lock().clone()
    }

    pub fn offer_constraints(&self) -> Option<OfferConstraints> {
        *self.constraints.lock()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl PeerConnection for FakePeer {
    fn add_stream<'a>(&'a self, stream: &'a MediaStream) -> BoxFuture<'a, Result<(), PeerError>> {
        Box::pin(async move {
            self.added.lock().push(stream.clone());
            Ok(())
        })
    }

    fn create_offer(
        &self,
        constraints: OfferConstraints,
    ) -> BoxFuture<'_, Result<SessionDescription, PeerError>> {
        Box::pin(async move {
            *self.constraints.lock() = Some(constraints);
            match self.behavior.fail_create_offer {
                Some(ref error) => Err(error.clone()),
                None => Ok(SessionDescription::offer("v=0 fake-offer")),
            }
        })
    }

    fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> BoxFuture<'_, Result<(), PeerError>> {
        Box::pin(async move {
            *self.local.lock() = Some(description);
            let _ = self.events.send(PeerEvent::SignalingStateChange(
                SignalingState::HaveLocalOffer,
            ));
            for index in 0..self.behavior.candidates {
                let _ = self.events.send(PeerEvent::IceCandidate(Some(IceCandidate {
                    candidate: format!("candidate:{} 1 udp 2122260223 10.0.0.1 5000{} typ host", index, index),
                    sdp_mid: Some("0".to_string()),
                    sdp_mline_index: Some(0),
                })));
            }
            if self.behavior.end_of_candidates {
                let _ = self.events.send(PeerEvent::IceCandidate(None));
            }
            Ok(())
        })
    }

    fn local_description(&self) -> BoxFuture<'_, Option<SessionDescription>> {
        Box::pin(async move { self.local.lock().clone() })
    }

    fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> BoxFuture<'_, Result<(), PeerError>> {
        Box::pin(async move {
            if let Some(ref error) = self.behavior.fail_remote_description {
                return Err(error.clone());
            }
            *self.remote.lock() = Some(description);
            let _ = self
                .events
                .send(PeerEvent::SignalingStateChange(SignalingState::Stable));
            Ok(())
        })
    }

    fn local_streams(&self) -> Vec<MediaStream> {
        if self.behavior.hide_local_streams {
            return Vec::new();
        }
        self.added.lock().clone()
    }

    fn remote_streams(&self) -> Vec<MediaStream> {
        self.behavior.remote_streams.clone()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            if !self.closed.swap(true, Ordering::SeqCst) {
                let _ = self
                    .events
                    .send(PeerEvent::SignalingStateChange(SignalingState::Closed));
            }
        })
    }
}

/// Local capture outcome
#[derive(Clone)]
pub enum MediaBehavior {
    Grant,
    Deny(MediaError),
    /// Never completes
    Hold,
}

pub struct FakeMediaSource {
    behavior: MediaBehavior,
    requests: Mutex<Vec<MediaKinds>>,
}

impl FakeMediaSource {
    pub fn new(behavior: MediaBehavior) -> Self {
        Self {
            behavior,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<MediaKinds> {
        self.requests.lock().clone()
    }
}

impl MediaSource for FakeMediaSource {
    fn acquire(&self, kinds: MediaKinds) -> BoxFuture<'_, Result<MediaStream, MediaError>> {
        self.requests.lock().push(kinds);
        Box::pin(async move {
            match self.behavior {
                MediaBehavior::Grant => Ok(MediaStream::new("local", kinds)),
                MediaBehavior::Deny(ref error) => Err(error.clone()),
                MediaBehavior::Hold => future::pending().await,
            }
        })
    }
}

/// All fakes of one test
pub struct Fakes {
    pub signaling: Arc<FakeSignaling>,
    pub peers: Arc<FakeConnector>,
    pub media: Arc<FakeMediaSource>,
    pub display: Arc<DisplayRegistry>,
}

impl Fakes {
    pub fn new() -> Self {
        Self::with(PeerBehavior::default(), MediaBehavior::Grant)
    }

    pub fn with(peer: PeerBehavior, media: MediaBehavior) -> Self {
        Self {
            signaling: Arc::new(FakeSignaling::new()),
            peers: Arc::new(FakeConnector::new(peer)),
            media: Arc::new(FakeMediaSource::new(media)),
            display: Arc::new(DisplayRegistry::with_targets(["local-video", "remote-video"])),
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            signaling: self.signaling.clone(),
            peers: self.peers.clone(),
            media: self.media.clone(),
            display: self.display.clone(),
        }
    }
}

/// Notifications received by a controller's callback
pub struct Notifications {
    rx: mpsc::UnboundedReceiver<Notification>,
    seen: Vec<Notification>,
}

impl Notifications {
    pub fn attach(controller: &mut SessionController) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        controller.set_notification_callback(move |notification| {
            let _ = tx.send(notification);
        });
        Self {
            rx,
            seen: Vec::new(),
        }
    }

    /// Wait for the next notification called `name`
    pub async fn wait_for(&mut self, name: &str) -> Notification {
        loop {
            let notification = tokio::time::timeout(Duration::from_secs(30), self.rx.recv())
                .await
                .unwrap_or_else(|_| panic!("Timed out waiting for {}", name))
                .unwrap_or_else(|| panic!("Session closed before {}", name));
            self.seen.push(notification.clone());
            if notification.name() == name {
                return notification;
            }
        }
    }

    /// Wait for the session to close and return every notification
    pub async fn finish(mut self, handle: SessionHandle) -> Vec<Notification> {
        tokio::time::timeout(Duration::from_secs(30), handle.closed())
            .await
            .expect("Session did not close");
        while let Ok(notification) = self.rx.try_recv() {
            self.seen.push(notification);
        }
        self.seen
    }
}

pub fn names(notifications: &[Notification]) -> Vec<&'static str> {
    notifications.iter().map(Notification::name).collect()
}

pub fn terminal_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| n.is_terminal()).count()
}
