//! Relay SFU
//!
//! Per-participant transport controller of a selective forwarding unit:
//! negotiation, ICE candidate sequencing and subscription bootstrap on top of
//! webrtc-rs.

pub mod config;
pub mod error;
pub mod sfu;

pub use config::{RouterConfig, SfuConfig, TransportConfig};
pub use error::{Result, RouterError, TransportError};
pub use sfu::{Router, Sender, Session, Transport, WebRtcEngine, WebRtcEngineFactory};
