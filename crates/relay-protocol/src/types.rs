use serde::{Deserialize, Serialize};

/// Spatial layer a subscriber asks for on a video stream
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoLayer {
    #[default]
    High,
    Medium,
    Low,
    /// Stop forwarding video entirely
    None,
}

impl VideoLayer {
    /// Spatial layer index for simulcast switching, `None` when video is muted
    pub fn spatial_layer(self) -> Option<u8> {
        match self {
            VideoLayer::High => Some(2),
            VideoLayer::Medium => Some(1),
            VideoLayer::Low => Some(0),
            VideoLayer::None => None,
        }
    }
}

impl std::fmt::Display for VideoLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoLayer::High => write!(f, "high"),
            VideoLayer::Medium => write!(f, "medium"),
            VideoLayer::Low => write!(f, "low"),
            VideoLayer::None => write!(f, "none"),
        }
    }
}

/// Kind of media carried by a routed track
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}
