//! Session registry
//!
//! A session is the set of transports taking part in one call. Transports
//! join on creation and leave on close; routers use it to find who should
//! receive a newly published stream.

use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::engine::ConnectivityEngine;
use super::router::{RouteRecord, Router, SenderOptions};
use super::transport::Transport;

pub struct Session<E: ConnectivityEngine> {
    id: String,
    /// Transports in join order
    transports: RwLock<Vec<Arc<Transport<E>>>>,
    scope: CancellationToken,
}

impl<E: ConnectivityEngine> Session<E> {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            transports: RwLock::new(Vec::new()),
            scope: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parent of every member transport's execution scope
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    pub async fn add_transport(&self, transport: Arc<Transport<E>>) {
        let mut transports = self.transports.write().await;
        transports.retain(|t| t.id() != transport.id());
        transports.push(transport);
    }

    pub async fn remove_transport(&self, id: uuid::Uuid) -> Option<Arc<Transport<E>>> {
        let mut transports = self.transports.write().await;
        let index = transports.iter().position(|t| t.id() == id)?;
        let removed = transports.remove(index);

        tracing::info!("Removed transport {} from session {}", id, self.id);
        Some(removed)
    }

    /// Point-in-time snapshot of the member transports
    pub async fn transports(&self) -> Vec<Arc<Transport<E>>> {
        self.transports.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.transports.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transports.read().await.is_empty()
    }

    /// Subscribe every other transport to a route that just opened on `router`
    pub async fn add_router(&self, router: Arc<dyn Router<E>>, route: RouteRecord) {
        for transport in self.transports().await {
            if transport.id() == router.id() {
                continue;
            }

            let options = SenderOptions::for_route(&route);
            if let Err(e) = router.add_sender(transport.clone(), Some(options)).await {
                tracing::warn!(
                    "Failed to forward track {} to transport {}: {}",
                    route.track_id,
                    transport.id(),
                    e
                );
            }
        }

        tracing::debug!(
            "Track {} of stream {} routed in session {}",
            route.track_id,
            route.stream_id,
            self.id
        );
    }
}
