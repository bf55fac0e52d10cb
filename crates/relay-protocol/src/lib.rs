//! Wire types for the relay SFU
//!
//! Clients talk to their transport over a reserved data channel using the
//! JSON messages defined here.

pub mod messages;
pub mod types;

pub use messages::*;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed API command: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("API command is missing a stream id")]
    MissingStreamId,
}

/// Parse a raw API channel frame into a command
pub fn parse_command(data: &[u8]) -> Result<ApiCommand, ProtocolError> {
    let command: ApiCommand = serde_json::from_slice(data)?;
    if command.stream_id.is_empty() {
        return Err(ProtocolError::MissingStreamId);
    }
    Ok(command)
}
