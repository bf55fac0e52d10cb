use serde::{Deserialize, Serialize};

use crate::types::VideoLayer;

/// Command sent by a client over the reserved API data channel
///
/// Adjusts what the SFU forwards to this client for one remote stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiCommand {
    /// Stream the command applies to
    pub stream_id: String,
    /// Requested video layer
    #[serde(default)]
    pub video: VideoLayer,
    /// Whether audio should keep flowing
    #[serde(default = "default_audio")]
    pub audio: bool,
}

fn default_audio() -> bool {
    true
}

/// Reply sent back over the API data channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ApiReply {
    /// Command applied to this many senders
    Applied { stream_id: String, senders: usize },

    /// Command could not be understood
    Error { message: String },
}
