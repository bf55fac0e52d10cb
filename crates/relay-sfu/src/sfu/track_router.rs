//! Track Router for RTP forwarding
//!
//! Routes RTP packets from a publisher's tracks to the transports subscribed
//! to them. Uses TrackLocalStaticRTP for direct RTP forwarding so codec
//! packetization is preserved.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

use relay_protocol::MediaKind;

use super::engine::ConnectivityEngine;
use super::router::{RouteRecord, Router, Sender, SenderOptions};
use super::transport::Transport;
use super::webrtc_engine::WebRtcEngine;
use crate::config::RouterConfig;
use crate::error::RouterError;

/// One subscriber's end of a forwarder
struct Subscriber {
    track: Arc<TrackLocalStaticRTP>,
    muted: Arc<AtomicBool>,
    /// Scope of the subscribing transport
    closed: CancellationToken,
}

/// Reads one published track and fans its packets out to subscribers
pub struct TrackForwarder {
    source: Arc<TrackRemote>,
    track_id: String,
    stream_id: String,
    kind: MediaKind,
    subscribers: RwLock<HashMap<String, Subscriber>>,
}

impl TrackForwarder {
    fn new(source: Arc<TrackRemote>, kind: MediaKind) -> Self {
        Self {
            track_id: source.id(),
            stream_id: source.stream_id(),
            source,
            kind,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    async fn add_subscriber(&self, sender_id: String, subscriber: Subscriber) {
        self.subscribers.write().await.insert(sender_id.clone(), subscriber);
        tracing::info!("Added subscriber {} to track {}", sender_id, self.track_id);
    }

    /// Forwarding loop; ends when `scope` or `stopped` is cancelled or the source closes
    async fn run(
        self: Arc<Self>,
        scope: CancellationToken,
        stopped: CancellationToken,
        config: RouterConfig,
    ) {
        tracing::info!("Starting RTP forwarding for track {}", self.track_id);

        let read_timeout = Duration::from_millis(config.read_timeout_ms);
        let mut error_count = 0u32;
        let mut packet_count = 0u64;

        loop {
            let read_result = tokio::select! {
                _ = scope.cancelled() => break,
                _ = stopped.cancelled() => break,
                result = tokio::time::timeout(read_timeout, self.source.read_rtp()) => result,
            };

            match read_result {
                Ok(Ok((rtp_packet, _attributes))) => {
                    error_count = 0;
                    packet_count += 1;
                    self.forward_packet(&rtp_packet, packet_count).await;
                }
                Ok(Err(e)) => {
                    if e.to_string().contains("closed") {
                        tracing::info!("Source track closed for {}", self.track_id);
                        break;
                    }

                    error_count += 1;
                    if error_count > config.max_read_errors {
                        tracing::error!(
                            "Track {} giving up after {} read errors: {}",
                            self.track_id,
                            error_count,
                            e
                        );
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(_) => {
                    // No packet within the timeout; the publisher may be muted
                    error_count += 1;
                    if error_count == 1 || error_count % 5 == 0 {
                        tracing::warn!(
                            "Track {} read_rtp timeout (attempt {})",
                            self.track_id,
                            error_count
                        );
                    }
                    if error_count > config.max_read_errors {
                        tracing::error!("Track {} never received packets", self.track_id);
                        break;
                    }
                }
            }
        }

        self.subscribers.write().await.clear();
        tracing::info!(
            "Track forwarder {} stopped after {} packets",
            self.track_id,
            packet_count
        );
    }

    async fn forward_packet(&self, rtp_packet: &webrtc::rtp::packet::Packet, packet_count: u64) {
        let mut has_closed = false;

        {
            let subscribers = self.subscribers.read().await;
            for (sender_id, subscriber) in subscribers.iter() {
                if subscriber.closed.is_cancelled() {
                    has_closed = true;
                    continue;
                }
                if subscriber.muted.load(Ordering::Relaxed) {
                    continue;
                }
                if let Err(e) = subscriber.track.write_rtp(rtp_packet).await {
                    tracing::warn!("Failed to forward RTP to sender {}: {}", sender_id, e);
                }
            }

            if packet_count % 100 == 1 {
                tracing::debug!(
                    "Forwarded packet {} of track {} to {} subscribers",
                    packet_count,
                    self.track_id,
                    subscribers.len()
                );
            }
        }

        if has_closed {
            self.subscribers
                .write()
                .await
                .retain(|_, subscriber| !subscriber.closed.is_cancelled());
        }
    }
}

/// Sender forwarding one track to one subscribing transport
pub struct ForwardSender {
    id: String,
    kind: MediaKind,
    track: Arc<TrackLocalStaticRTP>,
    forwarder: Arc<TrackForwarder>,
    target_scope: CancellationToken,
    muted: Arc<AtomicBool>,
    started: AtomicBool,
}

impl Sender for ForwardSender {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }

        let forwarder = self.forwarder.clone();
        let subscriber = Subscriber {
            track: self.track.clone(),
            muted: self.muted.clone(),
            closed: self.target_scope.clone(),
        };
        let id = self.id.clone();
        tokio::spawn(async move {
            forwarder.add_subscriber(id, subscriber).await;
        });
    }

    fn mute(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }
}

/// Per-transport router backed by webrtc-rs tracks
pub struct TrackRouter {
    id: Uuid,
    config: RouterConfig,
    forwarders: RwLock<HashMap<String, Arc<TrackForwarder>>>,
    /// (track id, target transport) pairs that already have a sender
    subscriptions: Mutex<HashSet<(String, Uuid)>>,
    twcc_exts: Mutex<HashMap<String, u8>>,
    stopped: CancellationToken,
}

impl TrackRouter {
    pub fn new(id: Uuid, config: RouterConfig) -> Self {
        Self {
            id,
            config,
            forwarders: RwLock::new(HashMap::new()),
            subscriptions: Mutex::new(HashSet::new()),
            twcc_exts: Mutex::new(HashMap::new()),
            stopped: CancellationToken::new(),
        }
    }

    /// TWCC extension id recorded for `stream_id`
    pub fn twcc_ext(&self, stream_id: &str) -> Option<u8> {
        match self.twcc_exts.lock() {
            Ok(exts) => exts.get(stream_id).copied(),
            Err(poisoned) => poisoned.into_inner().get(stream_id).copied(),
        }
    }

    pub async fn forwarder_count(&self) -> usize {
        self.forwarders.read().await.len()
    }

    fn subscriptions(&self) -> std::sync::MutexGuard<'_, HashSet<(String, Uuid)>> {
        match self.subscriptions.lock() {
            Ok(subscriptions) => subscriptions,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Reserve the (track, target) pair; false when it is already subscribed
    fn claim_subscription(&self, track_id: &str, target: Uuid) -> bool {
        self.subscriptions().insert((track_id.to_owned(), target))
    }

    fn release_subscription(&self, track_id: &str, target: Uuid) {
        self.subscriptions().remove(&(track_id.to_owned(), target));
    }

    async fn add_forward_sender(
        &self,
        target: &Arc<Transport<WebRtcEngine>>,
        forwarder: &Arc<TrackForwarder>,
    ) -> Result<(), RouterError> {
        if !self.claim_subscription(&forwarder.track_id, target.id()) {
            tracing::debug!(
                "Router {} track {} already forwarded to transport {}",
                self.id,
                forwarder.track_id,
                target.id()
            );
            return Ok(());
        }

        let result = self.bind_forward_sender(target, forwarder).await;
        if result.is_err() {
            self.release_subscription(&forwarder.track_id, target.id());
        }
        result
    }

    async fn bind_forward_sender(
        &self,
        target: &Arc<Transport<WebRtcEngine>>,
        forwarder: &Arc<TrackForwarder>,
    ) -> Result<(), RouterError> {
        let kind = match forwarder.kind {
            MediaKind::Audio => RTPCodecType::Audio,
            MediaKind::Video => RTPCodecType::Video,
        };

        let transceiver = target
            .engine()
            .add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Sendonly,
                    send_encodings: vec![],
                }),
            )
            .await?;

        let local_track = Arc::new(TrackLocalStaticRTP::new(
            forwarder.source.codec().capability,
            forwarder.track_id.clone(),
            forwarder.stream_id.clone(),
        ));

        transceiver
            .sender()
            .await
            .replace_track(Some(local_track.clone() as Arc<dyn TrackLocal + Send + Sync>))
            .await?;

        let sender = Arc::new(ForwardSender {
            id: format!("{}-{}", forwarder.track_id, target.id()),
            kind: forwarder.kind,
            track: local_track,
            forwarder: forwarder.clone(),
            target_scope: target.scope().clone(),
            muted: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
        });

        target.add_sender(&forwarder.stream_id, sender.clone()).await;
        target.add_pending_sender(transceiver, sender).await;

        tracing::info!(
            "Router {} added sender for track {} toward transport {}",
            self.id,
            forwarder.track_id,
            target.id()
        );

        Ok(())
    }
}

#[async_trait]
impl Router<WebRtcEngine> for TrackRouter {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn add_receiver(
        &self,
        scope: CancellationToken,
        track: Arc<TrackRemote>,
        _receiver: Arc<RTCRtpReceiver>,
    ) -> Option<RouteRecord> {
        let kind = match track.kind() {
            RTPCodecType::Audio => MediaKind::Audio,
            RTPCodecType::Video => MediaKind::Video,
            _ => {
                tracing::warn!("Router {} ignoring track of unknown kind", self.id);
                return None;
            }
        };

        let forwarder = {
            let mut forwarders = self.forwarders.write().await;
            // Simulcast layers share a track id; only the first opens a route
            if forwarders.contains_key(&track.id()) {
                return None;
            }
            let forwarder = Arc::new(TrackForwarder::new(track, kind));
            forwarders.insert(forwarder.track_id.clone(), forwarder.clone());
            forwarder
        };

        let route = RouteRecord {
            track_id: forwarder.track_id.clone(),
            stream_id: forwarder.stream_id.clone(),
            kind,
        };

        tokio::spawn(forwarder.run(scope, self.stopped.clone(), self.config.clone()));

        Some(route)
    }

    async fn add_sender(
        &self,
        target: Arc<Transport<WebRtcEngine>>,
        options: Option<SenderOptions>,
    ) -> Result<(), RouterError> {
        if target.is_closed() {
            return Err(RouterError::TransportClosed(target.id()));
        }
        if target.id() == self.id {
            return Ok(());
        }

        let forwarders: Vec<Arc<TrackForwarder>> = {
            let forwarders = self.forwarders.read().await;
            match options.and_then(|options| options.track_id) {
                Some(track_id) => match forwarders.get(&track_id) {
                    Some(forwarder) => vec![forwarder.clone()],
                    None => return Err(RouterError::UnknownTrack(track_id)),
                },
                None => forwarders.values().cloned().collect(),
            }
        };

        for forwarder in &forwarders {
            self.add_forward_sender(&target, forwarder).await?;
        }

        Ok(())
    }

    fn add_twcc_ext(&self, stream_id: &str, ext_id: u8) {
        tracing::debug!("Router {} stream {} TWCC ext {}", self.id, stream_id, ext_id);
        let mut exts = match self.twcc_exts.lock() {
            Ok(exts) => exts,
            Err(poisoned) => poisoned.into_inner(),
        };
        exts.insert(stream_id.to_owned(), ext_id);
    }

    async fn stop(&self) {
        self.stopped.cancel();
        self.forwarders.write().await.clear();
        self.subscriptions().clear();
        tracing::info!("Router {} stopped", self.id);
    }
}
