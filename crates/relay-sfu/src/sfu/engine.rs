//! Connectivity engine seam
//!
//! The transport never talks to ICE/DTLS/SRTP directly. Everything it needs
//! from a peer connection goes through [`ConnectivityEngine`], which
//! [`WebRtcEngine`](super::WebRtcEngine) implements over webrtc-rs.

use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Event handler registered on an engine; one slot per event kind
pub type EngineHandler<T> = Box<dyn FnMut(T) -> HandlerFuture + Send + Sync>;

pub type TrackHandler<T, R> = Box<dyn FnMut(T, R) -> HandlerFuture + Send + Sync>;

pub type NegotiationHandler = Box<dyn FnMut() -> HandlerFuture + Send + Sync>;

pub type MessageHandler = Box<dyn FnMut(Bytes) -> HandlerFuture + Send + Sync>;

/// A negotiated media section, identified by its mid once an answer confirms it
pub trait NegotiatedSection {
    fn mid(&self) -> Option<String>;
}

/// Data channel as seen by the transport
#[async_trait]
pub trait ApiChannel: Send + Sync + Sized {
    /// Non-owning reference; a channel's own message handler must not keep it alive
    type Handle: Send + Sync + 'static;

    fn downgrade(&self) -> Self::Handle;

    fn upgrade(handle: &Self::Handle) -> Option<Self>;

    fn label(&self) -> String;

    fn on_message(&self, handler: MessageHandler);

    async fn send_text(&self, text: String) -> Result<(), webrtc::Error>;
}

#[async_trait]
pub trait ConnectivityEngine: Send + Sync + 'static {
    type Track: Clone + Send + Sync + 'static;
    type Receiver: Clone + Send + Sync + 'static;
    type Transceiver: NegotiatedSection + Clone + Send + Sync + 'static;
    type DataChannel: ApiChannel + Clone + 'static;

    async fn create_offer(&self) -> Result<RTCSessionDescription, webrtc::Error>;

    async fn create_answer(&self) -> Result<RTCSessionDescription, webrtc::Error>;

    async fn set_local_description(&self, desc: RTCSessionDescription) -> Result<(), webrtc::Error>;

    async fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<(), webrtc::Error>;

    async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<(), webrtc::Error>;

    async fn local_description(&self) -> Option<RTCSessionDescription>;

    async fn remote_description(&self) -> Option<RTCSessionDescription>;

    fn signaling_state(&self) -> RTCSignalingState;

    async fn add_transceiver_from_kind(
        &self,
        kind: RTPCodecType,
        init: Option<RTCRtpTransceiverInit>,
    ) -> Result<Self::Transceiver, webrtc::Error>;

    async fn close(&self) -> Result<(), webrtc::Error>;

    fn on_track(&self, handler: TrackHandler<Self::Track, Self::Receiver>);

    fn on_ice_candidate(&self, handler: EngineHandler<Option<RTCIceCandidate>>);

    fn on_ice_connection_state_change(&self, handler: EngineHandler<RTCIceConnectionState>);

    fn on_peer_connection_state_change(&self, handler: EngineHandler<RTCPeerConnectionState>);

    fn on_data_channel(&self, handler: EngineHandler<Self::DataChannel>);

    fn on_negotiation_needed(&self, handler: NegotiationHandler);
}
