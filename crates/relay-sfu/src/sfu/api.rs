//! In-band API over the reserved data channel

use std::sync::Arc;

use relay_protocol::{ApiCommand, ApiReply, MediaKind};

use super::engine::{ApiChannel, ConnectivityEngine};
use super::transport::Transport;

/// Serve API commands arriving on `channel` for `transport`
pub(crate) fn handle_api_channel<E: ConnectivityEngine>(
    transport: &Arc<Transport<E>>,
    channel: E::DataChannel,
) {
    tracing::debug!("Transport {} API channel open", transport.id());

    let weak = Arc::downgrade(transport);
    let reply_channel = channel.downgrade();
    channel.on_message(Box::new(move |data| {
        let weak = weak.clone();
        let channel = <E::DataChannel as ApiChannel>::upgrade(&reply_channel);
        Box::pin(async move {
            let (Some(transport), Some(channel)) = (weak.upgrade(), channel) else {
                return;
            };

            let reply = match relay_protocol::parse_command(&data) {
                Ok(command) => {
                    let senders = apply_command(&transport, &command).await;
                    ApiReply::Applied {
                        stream_id: command.stream_id,
                        senders,
                    }
                }
                Err(e) => {
                    tracing::warn!("Transport {} bad API command: {}", transport.id(), e);
                    ApiReply::Error {
                        message: e.to_string(),
                    }
                }
            };

            match serde_json::to_string(&reply) {
                Ok(text) => {
                    if let Err(e) = channel.send_text(text).await {
                        tracing::warn!("Transport {} API reply failed: {}", transport.id(), e);
                    }
                }
                Err(e) => tracing::error!("Failed to serialize API reply: {}", e),
            }
        })
    }));
}

/// Apply `command` to every sender of its stream, returning how many were touched
pub async fn apply_command<E: ConnectivityEngine>(
    transport: &Transport<E>,
    command: &ApiCommand,
) -> usize {
    let senders = transport.get_senders(&command.stream_id).await;

    for sender in &senders {
        match sender.kind() {
            MediaKind::Video => match command.video.spatial_layer() {
                Some(layer) => {
                    sender.mute(false);
                    sender.switch_spatial_layer(layer);
                }
                None => sender.mute(true),
            },
            MediaKind::Audio => sender.mute(!command.audio),
        }
    }

    tracing::debug!(
        "Transport {} applied video={} audio={} to {} senders of {}",
        transport.id(),
        command.video,
        command.audio,
        senders.len(),
        command.stream_id
    );

    senders.len()
}
