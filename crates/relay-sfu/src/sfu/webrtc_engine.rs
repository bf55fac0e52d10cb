//! webrtc-rs backed connectivity engine

use async_trait::async_trait;
use std::sync::{Arc, Weak};

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_H264, MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaEngine};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use super::engine::{
    ApiChannel, ConnectivityEngine, EngineHandler, MessageHandler, NegotiatedSection,
    NegotiationHandler, TrackHandler,
};
use super::router::Router;
use super::session::Session;
use super::track_router::TrackRouter;
use super::transport::Transport;
use crate::config::SfuConfig;
use crate::error::{Result, TransportError};

#[derive(Clone)]
pub struct WebRtcEngine {
    pc: Arc<RTCPeerConnection>,
}

impl WebRtcEngine {
    pub fn new(pc: Arc<RTCPeerConnection>) -> Self {
        Self { pc }
    }

    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

impl NegotiatedSection for Arc<RTCRtpTransceiver> {
    fn mid(&self) -> Option<String> {
        RTCRtpTransceiver::mid(self).map(|mid| mid.to_string())
    }
}

#[async_trait]
impl ApiChannel for Arc<RTCDataChannel> {
    type Handle = Weak<RTCDataChannel>;

    fn downgrade(&self) -> Weak<RTCDataChannel> {
        Arc::downgrade(self)
    }

    fn upgrade(handle: &Weak<RTCDataChannel>) -> Option<Self> {
        handle.upgrade()
    }

    fn label(&self) -> String {
        RTCDataChannel::label(self).to_owned()
    }

    fn on_message(&self, mut handler: MessageHandler) {
        RTCDataChannel::on_message(
            self,
            Box::new(move |msg: DataChannelMessage| handler(msg.data)),
        );
    }

    async fn send_text(&self, text: String) -> std::result::Result<(), webrtc::Error> {
        RTCDataChannel::send_text(self, text).await.map(|_| ())
    }
}

#[async_trait]
impl ConnectivityEngine for WebRtcEngine {
    type Track = Arc<TrackRemote>;
    type Receiver = Arc<RTCRtpReceiver>;
    type Transceiver = Arc<RTCRtpTransceiver>;
    type DataChannel = Arc<RTCDataChannel>;

    async fn create_offer(&self) -> std::result::Result<RTCSessionDescription, webrtc::Error> {
        self.pc.create_offer(None).await
    }

    async fn create_answer(&self) -> std::result::Result<RTCSessionDescription, webrtc::Error> {
        self.pc.create_answer(None).await
    }

    async fn set_local_description(
        &self,
        desc: RTCSessionDescription,
    ) -> std::result::Result<(), webrtc::Error> {
        self.pc.set_local_description(desc).await
    }

    async fn set_remote_description(
        &self,
        desc: RTCSessionDescription,
    ) -> std::result::Result<(), webrtc::Error> {
        self.pc.set_remote_description(desc).await
    }

    async fn add_ice_candidate(
        &self,
        candidate: RTCIceCandidateInit,
    ) -> std::result::Result<(), webrtc::Error> {
        self.pc.add_ice_candidate(candidate).await
    }

    async fn local_description(&self) -> Option<RTCSessionDescription> {
        self.pc.local_description().await
    }

    async fn remote_description(&self) -> Option<RTCSessionDescription> {
        self.pc.remote_description().await
    }

    fn signaling_state(&self) -> RTCSignalingState {
        self.pc.signaling_state()
    }

    async fn add_transceiver_from_kind(
        &self,
        kind: RTPCodecType,
        init: Option<RTCRtpTransceiverInit>,
    ) -> std::result::Result<Arc<RTCRtpTransceiver>, webrtc::Error> {
        self.pc.add_transceiver_from_kind(kind, init).await
    }

    async fn close(&self) -> std::result::Result<(), webrtc::Error> {
        self.pc.close().await
    }

    fn on_track(&self, mut handler: TrackHandler<Self::Track, Self::Receiver>) {
        self.pc
            .on_track(Box::new(move |track, receiver, _transceiver| {
                handler(track, receiver)
            }));
    }

    fn on_ice_candidate(&self, handler: EngineHandler<Option<RTCIceCandidate>>) {
        self.pc.on_ice_candidate(handler);
    }

    fn on_ice_connection_state_change(&self, handler: EngineHandler<RTCIceConnectionState>) {
        self.pc.on_ice_connection_state_change(handler);
    }

    fn on_peer_connection_state_change(&self, handler: EngineHandler<RTCPeerConnectionState>) {
        self.pc.on_peer_connection_state_change(handler);
    }

    fn on_data_channel(&self, handler: EngineHandler<Self::DataChannel>) {
        self.pc.on_data_channel(handler);
    }

    fn on_negotiation_needed(&self, handler: NegotiationHandler) {
        self.pc.on_negotiation_needed(handler);
    }
}

/// Builds peer connections sharing one webrtc-rs API instance
pub struct WebRtcEngineFactory {
    api: API,
    ice_servers: Vec<RTCIceServer>,
    config: SfuConfig,
}

impl WebRtcEngineFactory {
    pub fn new(config: &SfuConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();

        // H.264 baseline, packetization-mode=1 for hardware encoders on clients
        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_H264.to_string(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line:
                        "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
                            .to_string(),
                    rtcp_feedback: vec![],
                },
                payload_type: 102,
                ..Default::default()
            },
            RTPCodecType::Video,
        )?;

        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_string(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                payload_type: 96,
                ..Default::default()
            },
            RTPCodecType::Video,
        )?;

        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_string(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
                    rtcp_feedback: vec![],
                },
                payload_type: 111,
                ..Default::default()
            },
            RTPCodecType::Audio,
        )?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(SettingEngine::default())
            .build();

        let mut ice_servers = vec![];

        for stun_url in &config.stun_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![stun_url.clone()],
                ..Default::default()
            });
        }

        for turn in &config.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        Ok(Self {
            api,
            ice_servers,
            config: config.clone(),
        })
    }

    pub async fn new_engine(&self) -> Result<WebRtcEngine> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };

        let pc = self.api.new_peer_connection(config).await.map_err(|e| {
            tracing::error!("New peer connection error: {}", e);
            TransportError::PeerConnectionInit(e)
        })?;

        Ok(WebRtcEngine::new(Arc::new(pc)))
    }

    /// Create a participant's transport, router included, and join it to `session`
    pub async fn new_transport(
        &self,
        session: &Arc<Session<WebRtcEngine>>,
    ) -> Result<Arc<Transport<WebRtcEngine>>> {
        let engine = self.new_engine().await?;
        let router_config = self.config.router.clone();

        let transport = Transport::new(session, engine, self.config.transport(), move |id| {
            Arc::new(TrackRouter::new(id, router_config)) as Arc<dyn Router<WebRtcEngine>>
        })
        .await;

        Ok(transport)
    }
}
