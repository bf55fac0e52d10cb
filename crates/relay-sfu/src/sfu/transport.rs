//! Per-participant transport
//!
//! A [`Transport`] owns one participant's peer connection. It sequences
//! offer/answer rounds against ICE candidates that may arrive early, starts
//! queued senders once an answer confirms their media section, and subscribes
//! the participant to every other transport in the session the first time ICE
//! connects.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::sdp::description::session::SessionDescription;

use super::api;
use super::debounce::Debouncer;
use super::engine::{ApiChannel, ConnectivityEngine, HandlerFuture, NegotiatedSection};
use super::router::{Router, Sender};
use super::sdp;
use super::session::Session;
use crate::config::TransportConfig;
use crate::error::Result;

/// Single-subscriber callback slot
pub type Callback<T> = Arc<dyn Fn(T) -> HandlerFuture + Send + Sync>;

pub type TrackCallback<E> = Arc<
    dyn Fn(<E as ConnectivityEngine>::Track, <E as ConnectivityEngine>::Receiver) -> HandlerFuture
        + Send
        + Sync,
>;

/// A sender waiting for an answer to confirm its transceiver's mid
struct PendingSender<E: ConnectivityEngine> {
    transceiver: E::Transceiver,
    sender: Arc<dyn Sender>,
}

/// Candidates received before the first remote description
#[derive(Default)]
struct CandidateBuffer {
    remote_description_set: bool,
    candidates: Vec<RTCIceCandidateInit>,
}

pub struct Transport<E: ConnectivityEngine> {
    id: Uuid,
    engine: E,
    router: Arc<dyn Router<E>>,
    session: Weak<Session<E>>,
    scope: CancellationToken,
    config: TransportConfig,
    /// Serializes remote descriptions with candidate application
    negotiation: Mutex<CandidateBuffer>,
    senders: RwLock<HashMap<String, Vec<Arc<dyn Sender>>>>,
    pending_senders: Mutex<VecDeque<PendingSender<E>>>,
    on_track_handler: RwLock<Option<TrackCallback<E>>>,
    on_ice_candidate_handler: RwLock<Option<Callback<Option<RTCIceCandidate>>>>,
    on_connection_state_handler: RwLock<Option<Callback<RTCPeerConnectionState>>>,
    on_data_channel_handler: RwLock<Option<Callback<E::DataChannel>>>,
    negotiation_debounce: Debouncer,
    subscribed: AtomicBool,
    /// Set by the first `close`; every later call returns immediately
    closing: AtomicBool,
}

impl<E: ConnectivityEngine> Transport<E> {
    /// Create a transport around an initialized engine and join it to `session`.
    ///
    /// `router` builds the transport's router from the freshly assigned id.
    pub async fn new<F>(
        session: &Arc<Session<E>>,
        engine: E,
        config: TransportConfig,
        router: F,
    ) -> Arc<Self>
    where
        F: FnOnce(Uuid) -> Arc<dyn Router<E>>,
    {
        let id = Uuid::new_v4();
        let scope = session.scope().child_token();
        let negotiation_debounce = Debouncer::new(config.negotiation_debounce, scope.clone());

        let transport = Arc::new(Self {
            id,
            engine,
            router: router(id),
            session: Arc::downgrade(session),
            scope,
            config,
            negotiation: Mutex::new(CandidateBuffer::default()),
            senders: RwLock::new(HashMap::new()),
            pending_senders: Mutex::new(VecDeque::with_capacity(2)),
            on_track_handler: RwLock::new(None),
            on_ice_candidate_handler: RwLock::new(None),
            on_connection_state_handler: RwLock::new(None),
            on_data_channel_handler: RwLock::new(None),
            negotiation_debounce,
            subscribed: AtomicBool::new(false),
            closing: AtomicBool::new(false),
        });

        session.add_transport(transport.clone()).await;
        transport.register_engine_handlers();

        tracing::info!("Created transport {} in session {}", id, session.id());

        transport
    }

    fn register_engine_handlers(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.engine.on_track(Box::new(move |track, receiver| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(transport) = weak.upgrade() {
                    transport.handle_track(track, receiver).await;
                }
            })
        }));

        let weak = Arc::downgrade(self);
        self.engine.on_ice_candidate(Box::new(move |candidate| {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(transport) = weak.upgrade() else {
                    return;
                };
                let handler = transport.on_ice_candidate_handler.read().await.clone();
                if let Some(handler) = handler {
                    handler(candidate).await;
                }
            })
        }));

        let weak = Arc::downgrade(self);
        self.engine
            .on_ice_connection_state_change(Box::new(move |state| {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(transport) = weak.upgrade() {
                        transport.handle_ice_connection_state(state).await;
                    }
                })
            }));

        let weak = Arc::downgrade(self);
        self.engine
            .on_peer_connection_state_change(Box::new(move |state| {
                let weak = weak.clone();
                Box::pin(async move {
                    let Some(transport) = weak.upgrade() else {
                        return;
                    };
                    tracing::debug!("Transport {} connection state: {}", transport.id, state);
                    let handler = transport.on_connection_state_handler.read().await.clone();
                    if let Some(handler) = handler {
                        handler(state).await;
                    }
                })
            }));

        let weak = Arc::downgrade(self);
        self.engine.on_data_channel(Box::new(move |channel| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(transport) = weak.upgrade() {
                    transport.handle_data_channel(channel).await;
                }
            })
        }));
    }

    async fn handle_track(self: &Arc<Self>, track: E::Track, receiver: E::Receiver) {
        if self.is_closed() {
            return;
        }

        tracing::debug!("Transport {} got remote track", self.id);

        let route = self
            .router
            .add_receiver(self.scope.clone(), track.clone(), receiver.clone())
            .await;

        if let Some(route) = route {
            if let Some(session) = self.session.upgrade() {
                let router = self.router.clone();
                tokio::spawn(async move {
                    session.add_router(router, route).await;
                });
            }
        }

        let handler = self.on_track_handler.read().await.clone();
        if let Some(handler) = handler {
            handler(track, receiver).await;
        }
    }

    async fn handle_ice_connection_state(self: &Arc<Self>, state: RTCIceConnectionState) {
        tracing::debug!("Transport {} ICE connection state: {}", self.id, state);

        if self.is_closed() {
            return;
        }

        match state {
            RTCIceConnectionState::Connected => self.subscribe_to_session().await,
            RTCIceConnectionState::Disconnected => {
                tracing::debug!("Transport {} ICE disconnected", self.id);
            }
            RTCIceConnectionState::Failed | RTCIceConnectionState::Closed => {
                tracing::debug!("Transport {} ICE closed", self.id);
                if let Err(e) = self.close().await {
                    tracing::error!("Transport {} close error: {}", self.id, e);
                }
            }
            _ => {}
        }
    }

    /// Ask every other transport's router for a sender toward this one.
    /// Runs at most once per transport.
    async fn subscribe_to_session(self: &Arc<Self>) {
        if self.subscribed.swap(true, Ordering::AcqRel) {
            return;
        }

        let Some(session) = self.session.upgrade() else {
            return;
        };

        for peer in session.transports().await {
            if peer.id == self.id {
                continue;
            }
            if let Err(e) = peer.router.add_sender(self.clone(), None).await {
                tracing::error!(
                    "Transport {} subscribing to router {} failed: {}",
                    self.id,
                    peer.id,
                    e
                );
                continue;
            }
        }
    }

    async fn handle_data_channel(self: &Arc<Self>, channel: E::DataChannel) {
        let label = channel.label();
        tracing::debug!("Transport {} new data channel {}", self.id, label);

        if label == self.config.api_channel_label {
            api::handle_api_channel(self, channel);
            return;
        }

        let handler = self.on_data_channel_handler.read().await.clone();
        if let Some(handler) = handler {
            handler(channel).await;
        }
    }

    pub async fn create_offer(&self) -> Result<RTCSessionDescription> {
        Ok(self.engine.create_offer().await?)
    }

    pub async fn create_answer(&self) -> Result<RTCSessionDescription> {
        self.engine.create_answer().await.map_err(|e| {
            tracing::error!("Transport {} create answer error: {}", self.id, e);
            e.into()
        })
    }

    pub async fn set_local_description(&self, desc: RTCSessionDescription) -> Result<()> {
        Ok(self.engine.set_local_description(desc).await?)
    }

    /// Apply the remote peer's description and advance negotiation.
    ///
    /// Candidates buffered before the first remote description are applied
    /// in arrival order. An answer starts every pending sender whose mid it
    /// confirms; an offer registers its TWCC markers with the router.
    pub async fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<()> {
        let parsed = desc.unmarshal().map_err(|e| {
            tracing::error!("Transport {} set remote description error: {}", self.id, e);
            e
        })?;
        let sdp_type = desc.sdp_type;

        let mut negotiation = self.negotiation.lock().await;

        if let Err(e) = self.engine.set_remote_description(desc).await {
            tracing::error!("Transport {} set remote description error: {}", self.id, e);
            return Err(e.into());
        }
        negotiation.remote_description_set = true;

        for candidate in negotiation.candidates.drain(..) {
            if let Err(e) = self.engine.add_ice_candidate(candidate).await {
                tracing::error!("Transport {} error adding ICE candidate: {}", self.id, e);
            }
        }

        match sdp_type {
            RTCSdpType::Answer => self.activate_pending_senders(&parsed).await,
            RTCSdpType::Offer => self.register_twcc_markers(&parsed),
            _ => {}
        }

        Ok(())
    }

    async fn activate_pending_senders(&self, answer: &SessionDescription) {
        let mids = sdp::confirmed_mids(answer);
        if mids.is_empty() {
            return;
        }

        let ready: Vec<Arc<dyn Sender>> = {
            let mut pending = self.pending_senders.lock().await;
            let (ready, waiting): (VecDeque<_>, VecDeque<_>) =
                pending.drain(..).partition(|entry| {
                    entry
                        .transceiver
                        .mid()
                        .is_some_and(|mid| mids.contains(&mid))
                });
            *pending = waiting;
            ready.into_iter().map(|entry| entry.sender).collect()
        };

        for sender in ready {
            tracing::debug!("Transport {} starting sender {}", self.id, sender.id());
            sender.start();
        }
    }

    fn register_twcc_markers(&self, offer: &SessionDescription) {
        for marker in sdp::twcc_markers(offer) {
            self.router.add_twcc_ext(&marker.stream_id, marker.ext_id);
        }
    }

    pub async fn local_description(&self) -> Option<RTCSessionDescription> {
        self.engine.local_description().await
    }

    pub async fn remote_description(&self) -> Option<RTCSessionDescription> {
        self.engine.remote_description().await
    }

    pub fn signaling_state(&self) -> RTCSignalingState {
        self.engine.signaling_state()
    }

    /// Apply a remote candidate, or hold it until a remote description exists
    pub async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        let mut negotiation = self.negotiation.lock().await;
        if !negotiation.remote_description_set {
            negotiation.candidates.push(candidate);
            return Ok(());
        }

        self.engine.add_ice_candidate(candidate).await.map_err(|e| {
            tracing::error!("Transport {} error adding ICE candidate: {}", self.id, e);
            e.into()
        })
    }

    pub async fn add_transceiver_from_kind(
        &self,
        kind: RTPCodecType,
        init: Option<RTCRtpTransceiverInit>,
    ) -> Result<E::Transceiver> {
        Ok(self.engine.add_transceiver_from_kind(kind, init).await?)
    }

    /// Queue `sender` until an answer confirms `transceiver`'s mid
    pub async fn add_pending_sender(&self, transceiver: E::Transceiver, sender: Arc<dyn Sender>) {
        self.pending_senders
            .lock()
            .await
            .push_back(PendingSender { transceiver, sender });
    }

    pub async fn pending_sender_ids(&self) -> Vec<String> {
        self.pending_senders
            .lock()
            .await
            .iter()
            .map(|pending| pending.sender.id())
            .collect()
    }

    pub async fn buffered_candidate_count(&self) -> usize {
        self.negotiation.lock().await.candidates.len()
    }

    pub async fn add_sender(&self, stream_id: &str, sender: Arc<dyn Sender>) {
        self.senders
            .write()
            .await
            .entry(stream_id.to_owned())
            .or_default()
            .push(sender);
    }

    pub async fn get_senders(&self, stream_id: &str) -> Vec<Arc<dyn Sender>> {
        self.senders
            .read()
            .await
            .get(stream_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Debounced negotiation-needed notification
    pub fn on_negotiation_needed<F>(&self, f: F)
    where
        F: Fn() -> HandlerFuture + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let debouncer = self.negotiation_debounce.clone();
        self.engine.on_negotiation_needed(Box::new(move || {
            let f = f.clone();
            debouncer.trigger(move || f());
            Box::pin(async {})
        }));
    }

    pub async fn on_track<F>(&self, f: F)
    where
        F: Fn(E::Track, E::Receiver) -> HandlerFuture + Send + Sync + 'static,
    {
        *self.on_track_handler.write().await = Some(Arc::new(f));
    }

    pub async fn on_ice_candidate<F>(&self, f: F)
    where
        F: Fn(Option<RTCIceCandidate>) -> HandlerFuture + Send + Sync + 'static,
    {
        *self.on_ice_candidate_handler.write().await = Some(Arc::new(f));
    }

    pub async fn on_connection_state_change<F>(&self, f: F)
    where
        F: Fn(RTCPeerConnectionState) -> HandlerFuture + Send + Sync + 'static,
    {
        *self.on_connection_state_handler.write().await = Some(Arc::new(f));
    }

    pub async fn on_data_channel<F>(&self, f: F)
    where
        F: Fn(E::DataChannel) -> HandlerFuture + Send + Sync + 'static,
    {
        *self.on_data_channel_handler.write().await = Some(Arc::new(f));
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn router(&self) -> &Arc<dyn Router<E>> {
        &self.router
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Cancelled once the transport closes
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire) || self.scope.is_cancelled()
    }

    /// Leave the session and tear down the peer connection.
    ///
    /// Only the first call does any work; later and concurrent calls return
    /// `Ok(())`. The engine's close error is returned as is.
    pub async fn close(&self) -> Result<()> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(session) = self.session.upgrade() {
            session.remove_transport(self.id).await;
        }
        self.scope.cancel();
        self.pending_senders.lock().await.clear();

        let result = self.engine.close().await;
        self.router.stop().await;

        tracing::info!("Closed transport {}", self.id);
        Ok(result?)
    }
}
