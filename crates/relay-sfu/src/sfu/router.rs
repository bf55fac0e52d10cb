//! Router and sender seams
//!
//! Every transport owns one [`Router`]. The router turns the tracks its
//! transport publishes into routable streams and creates [`Sender`]s that
//! forward those streams to other transports.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use relay_protocol::MediaKind;

use super::engine::ConnectivityEngine;
use super::transport::Transport;
use crate::error::RouterError;

/// A stream that became routable after a track arrived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub track_id: String,
    pub stream_id: String,
    pub kind: MediaKind,
}

/// Restricts a sender request to a subset of the router's streams
#[derive(Debug, Clone, Default)]
pub struct SenderOptions {
    /// Only forward this track; all tracks when unset
    pub track_id: Option<String>,
}

impl SenderOptions {
    pub fn for_route(record: &RouteRecord) -> Self {
        Self {
            track_id: Some(record.track_id.clone()),
        }
    }
}

#[async_trait]
pub trait Router<E: ConnectivityEngine>: Send + Sync {
    /// Id of the transport owning this router
    fn id(&self) -> Uuid;

    /// Register an incoming track. Returns a record when the track opened a
    /// new route that other transports should subscribe to.
    async fn add_receiver(
        &self,
        scope: CancellationToken,
        track: E::Track,
        receiver: E::Receiver,
    ) -> Option<RouteRecord>;

    /// Create senders forwarding this router's streams to `target`
    async fn add_sender(
        &self,
        target: Arc<Transport<E>>,
        options: Option<SenderOptions>,
    ) -> Result<(), RouterError>;

    /// Record the transport-wide congestion control extension id of a stream
    fn add_twcc_ext(&self, stream_id: &str, ext_id: u8);

    async fn stop(&self);
}

pub trait Sender: Send + Sync {
    fn id(&self) -> String;

    fn kind(&self) -> MediaKind;

    /// Begin forwarding; called once the sender's media section is confirmed
    fn start(&self);

    fn mute(&self, muted: bool);

    fn switch_spatial_layer(&self, layer: u8) {
        tracing::debug!(
            "Sender {} does not support simulcast, ignoring switch to layer {}",
            self.id(),
            layer
        );
    }
}
