//! SFU (Selective Forwarding Unit) transport layer
//!
//! One [`Transport`] per participant drives that participant's peer
//! connection. Transports of the same call share a [`Session`]; each owns a
//! [`Router`] that makes its published tracks available to the others.

mod api;
mod debounce;
mod engine;
mod router;
mod sdp;
mod session;
mod track_router;
mod transport;
mod webrtc_engine;

pub use api::apply_command;
pub use debounce::Debouncer;
pub use engine::{
    ApiChannel, ConnectivityEngine, EngineHandler, HandlerFuture, MessageHandler,
    NegotiatedSection, NegotiationHandler, TrackHandler,
};
pub use router::{RouteRecord, Router, Sender, SenderOptions};
pub use sdp::{TwccMarker, confirmed_mids, twcc_markers};
pub use session::Session;
pub use track_router::{ForwardSender, TrackForwarder, TrackRouter};
pub use transport::{Callback, TrackCallback, Transport};
pub use webrtc_engine::{WebRtcEngine, WebRtcEngineFactory};
