use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to initialize peer connection: {0}")]
    PeerConnectionInit(#[source] webrtc::Error),

    #[error(transparent)]
    WebRtc(#[from] webrtc::Error),

    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] config::ConfigError),
}

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Transport {0} is closed")]
    TransportClosed(uuid::Uuid),

    #[error("Unknown track: {0}")]
    UnknownTrack(String),

    #[error(transparent)]
    WebRtc(#[from] webrtc::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
