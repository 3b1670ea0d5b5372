//! Realtime channel error types.

use thiserror::Error;

/// Errors raised by realtime channel transports.
///
/// None of these end a session: the controller holds its last known state
/// and waits for the server to catch up after a reconnect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel not connected")]
    NotConnected,

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Failed to send: {0}")]
    Send(String),

    #[error("Failed to encode frame: {0}")]
    Encode(String),

    #[error("Failed to decode frame: {0}")]
    Decode(String),
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;
