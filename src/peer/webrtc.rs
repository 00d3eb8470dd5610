//! Peer connections backed by webrtc-rs
//!
//! Local streams come from `SilentMediaSource`, which creates sample tracks
//! that are negotiated but never fed. Remote streams are derived from the
//! applied answer so they are known as soon as the description is set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::media::{MediaError, MediaKinds, MediaSource, MediaStream, TrackKind};

use super::{
    IceCandidate, IceServer, OfferConstraints, PeerConfig, PeerConnection, PeerConnector,
    PeerError, PeerEvent, PeerEventSender, SdpType, SessionDescription, SignalingState,
};

type TrackStore = Arc<Mutex<HashMap<String, Vec<Arc<TrackLocalStaticSample>>>>>;

/// Media source and peer connector sharing the same local tracks
#[derive(Clone, Default)]
pub struct WebRtcPlatform {
    tracks: TrackStore,
}

impl WebRtcPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn media_source(&self) -> Arc<SilentMediaSource> {
        Arc::new(SilentMediaSource {
            tracks: self.tracks.clone(),
        })
    }

    pub fn connector(&self) -> Arc<WebRtcConnector> {
        Arc::new(WebRtcConnector {
            tracks: self.tracks.clone(),
        })
    }
}

/// Local source producing negotiated but silent tracks
pub struct SilentMediaSource {
    tracks: TrackStore,
}

impl MediaSource for SilentMediaSource {
    fn acquire(&self, kinds: MediaKinds) -> BoxFuture<'_, Result<MediaStream, MediaError>> {
        Box::pin(async move {
            if kinds.is_empty() {
                return Err(MediaError::Unavailable("No media kinds requested".to_string()));
            }

            let stream = MediaStream::generate(kinds);
            let mut tracks = Vec::new();
            if kinds.audio {
                tracks.push(local_track(TrackKind::Audio, stream.id()));
            }
            if kinds.video {
                tracks.push(local_track(TrackKind::Video, stream.id()));
            }

            debug!("Created {} silent track(s) for stream {}", tracks.len(), stream.id());
            self.tracks.lock().insert(stream.id().to_string(), tracks);
            Ok(stream)
        })
    }
}

fn local_track(kind: TrackKind, stream_id: &str) -> Arc<TrackLocalStaticSample> {
    let codec = match kind {
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
    };

    Arc::new(TrackLocalStaticSample::new(
        codec,
        kind.as_str().to_owned(),
        stream_id.to_owned(),
    ))
}

/// Creates webrtc-rs peer connections
pub struct WebRtcConnector {
    tracks: TrackStore,
}

impl PeerConnector for WebRtcConnector {
    fn create(
        &self,
        config: PeerConfig,
        events: PeerEventSender,
    ) -> BoxFuture<'_, Result<Arc<dyn PeerConnection>, PeerError>> {
        Box::pin(async move {
            let mut media_engine = MediaEngine::default();
            media_engine
                .register_default_codecs()
                .map_err(|e| PeerError::Create(e.to_string()))?;
            let registry = register_default_interceptors(Registry::new(), &mut media_engine)
                .map_err(|e| PeerError::Create(e.to_string()))?;
            let api = APIBuilder::new()
                .with_media_engine(media_engine)
                .with_interceptor_registry(registry)
                .build();

            let rtc_config = RTCConfiguration {
                ice_servers: config.ice_servers.iter().map(rtc_ice_server).collect(),
                ..Default::default()
            };
            let pc = Arc::new(
                api.new_peer_connection(rtc_config)
                    .await
                    .map_err(|e| PeerError::Create(e.to_string()))?,
            );

            let candidate_events = events.clone();
            pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let event = match candidate {
                    // End of gathering
                    None => Some(PeerEvent::IceCandidate(None)),
                    Some(candidate) => match candidate.to_json() {
                        Ok(init) => Some(PeerEvent::IceCandidate(Some(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                        }))),
                        Err(e) => {
                            warn!("Failed to serialize ICE candidate: {}", e);
                            None
                        }
                    },
                };
                if let Some(event) = event {
                    let _ = candidate_events.send(event);
                }
                Box::pin(async {})
            }));

            let state_events = events.clone();
            pc.on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
                if let Some(state) = signaling_state(state) {
                    let _ = state_events.send(PeerEvent::SignalingStateChange(state));
                }
                Box::pin(async {})
            }));

            let peer: Arc<dyn PeerConnection> = Arc::new(WebRtcPeer {
                pc,
                tracks: self.tracks.clone(),
                events,
                local_streams: Mutex::new(Vec::new()),
                remote_streams: Mutex::new(Vec::new()),
                sending: Mutex::new(MediaKinds::default()),
                closed: AtomicBool::new(false),
            });
            Ok(peer)
        })
    }
}

fn rtc_ice_server(server: &IceServer) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
    }
}

/// Closed is reported by `WebRtcPeer::close` itself
fn signaling_state(state: RTCSignalingState) -> Option<SignalingState> {
    match state {
        RTCSignalingState::Stable => Some(SignalingState::Stable),
        RTCSignalingState::HaveLocalOffer => Some(SignalingState::HaveLocalOffer),
        RTCSignalingState::HaveRemoteOffer => Some(SignalingState::HaveRemoteOffer),
        RTCSignalingState::HaveLocalPranswer => Some(SignalingState::HaveLocalPranswer),
        RTCSignalingState::HaveRemotePranswer => Some(SignalingState::HaveRemotePranswer),
        _ => None,
    }
}

/// A webrtc-rs peer connection
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    tracks: TrackStore,
    events: PeerEventSender,
    local_streams: Mutex<Vec<MediaStream>>,
    remote_streams: Mutex<Vec<MediaStream>>,
    sending: Mutex<MediaKinds>,
    closed: AtomicBool,
}

impl WebRtcPeer {
    async fn add_receiver(&self, kind: RTPCodecType) -> Result<(), PeerError> {
        let init = RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Recvonly,
            send_encodings: vec![],
        };
        self.pc
            .add_transceiver_from_kind(kind, Some(init))
            .await
            .map_err(|e| PeerError::CreateOffer(e.to_string()))?;
        Ok(())
    }
}

impl PeerConnection for WebRtcPeer {
    fn add_stream<'a>(&'a self, stream: &'a MediaStream) -> BoxFuture<'a, Result<(), PeerError>> {
        Box::pin(async move {
            let tracks = self
                .tracks
                .lock()
                .get(stream.id())
                .cloned()
                .ok_or_else(|| PeerError::AddStream(format!("Unknown stream {}", stream.id())))?;

            for track in tracks {
                let track: Arc<dyn TrackLocal + Send + Sync> = track;
                self.pc
                    .add_track(track)
                    .await
                    .map_err(|e| PeerError::AddStream(e.to_string()))?;
            }

            {
                let kinds = stream.kinds();
                let mut sending = self.sending.lock();
                sending.audio |= kinds.audio;
                sending.video |= kinds.video;
            }
            self.local_streams.lock().push(stream.clone());
            Ok(())
        })
    }

    fn create_offer(
        &self,
        constraints: OfferConstraints,
    ) -> BoxFuture<'_, Result<SessionDescription, PeerError>> {
        Box::pin(async move {
            let sending = *self.sending.lock();

            // Sending tracks already receive; the rest need a receive-only transceiver
            if constraints.offer_to_receive_audio && !sending.audio {
                self.add_receiver(RTPCodecType::Audio).await?;
            }
            if constraints.offer_to_receive_video && !sending.video {
                self.add_receiver(RTPCodecType::Video).await?;
            }

            let offer = self
                .pc
                .create_offer(None)
                .await
                .map_err(|e| PeerError::CreateOffer(e.to_string()))?;
            Ok(SessionDescription::offer(offer.sdp))
        })
    }

    fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> BoxFuture<'_, Result<(), PeerError>> {
        Box::pin(async move {
            let description =
                rtc_description(description).map_err(PeerError::LocalDescription)?;
            self.pc
                .set_local_description(description)
                .await
                .map_err(|e| PeerError::LocalDescription(e.to_string()))
        })
    }

    fn local_description(&self) -> BoxFuture<'_, Option<SessionDescription>> {
        Box::pin(async move {
            self.pc
                .local_description()
                .await
                .map(|description| SessionDescription {
                    sdp_type: match description.sdp_type {
                        RTCSdpType::Answer => SdpType::Answer,
                        _ => SdpType::Offer,
                    },
                    sdp: description.sdp,
                })
        })
    }

    fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> BoxFuture<'_, Result<(), PeerError>> {
        Box::pin(async move {
            let streams = remote_streams_from_sdp(&description.sdp);
            let description =
                rtc_description(description).map_err(PeerError::RemoteDescription)?;
            self.pc
                .set_remote_description(description)
                .await
                .map_err(|e| PeerError::RemoteDescription(e.to_string()))?;

            info!("Remote description applied ({} stream(s))", streams.len());
            *self.remote_streams.lock() = streams;
            Ok(())
        })
    }

    fn local_streams(&self) -> Vec<MediaStream> {
        self.local_streams.lock().clone()
    }

    fn remote_streams(&self) -> Vec<MediaStream> {
        self.remote_streams.lock().clone()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Err(e) = self.pc.close().await {
                warn!("Error while closing peer connection: {}", e);
            }
            // webrtc-rs does not run the signaling state handler on close
            let _ = self
                .events
                .send(PeerEvent::SignalingStateChange(SignalingState::Closed));
        })
    }
}

fn rtc_description(description: SessionDescription) -> Result<RTCSessionDescription, String> {
    let result = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
    };
    result.map_err(|e| e.to_string())
}

/// Streams the remote side sends, grouped by `a=msid` stream id
fn remote_streams_from_sdp(sdp: &str) -> Vec<MediaStream> {
    struct Section {
        kind: Option<TrackKind>,
        sends: bool,
        rejected: bool,
        stream_id: Option<String>,
    }

    let mut sections: Vec<Section> = Vec::new();
    for line in sdp.lines().map(str::trim) {
        if let Some(media) = line.strip_prefix("m=") {
            let mut fields = media.split_whitespace();
            let kind = match fields.next() {
                Some("audio") => Some(TrackKind::Audio),
                Some("video") => Some(TrackKind::Video),
                _ => None,
            };
            let rejected = fields.next() == Some("0");
            sections.push(Section {
                kind,
                sends: true,
                rejected,
                stream_id: None,
            });
            continue;
        }

        let Some(section) = sections.last_mut() else {
            continue;
        };
        match line {
            "a=recvonly" | "a=inactive" => section.sends = false,
            "a=sendonly" | "a=sendrecv" => section.sends = true,
            _ => {
                if let Some(msid) = line.strip_prefix("a=msid:") {
                    if let Some(stream_id) = msid.split_whitespace().next() {
                        section.stream_id = Some(stream_id.to_string());
                    }
                }
            }
        }
    }

    let mut streams: Vec<(String, MediaKinds)> = Vec::new();
    for section in sections {
        let Some(kind) = section.kind else {
            continue;
        };
        if section.rejected || !section.sends {
            continue;
        }

        let stream_id = section.stream_id.unwrap_or_else(|| "default".to_string());
        let index = match streams.iter().position(|(id, _)| *id == stream_id) {
            Some(index) => index,
            None => {
                streams.push((stream_id, MediaKinds::default()));
                streams.len() - 1
            }
        };
        match kind {
            TrackKind::Audio => streams[index].1.audio = true,
            TrackKind::Video => streams[index].1.video = true,
        }
    }

    streams
        .into_iter()
        .map(|(id, kinds)| MediaStream::new(id, kinds))
        .collect()
}
