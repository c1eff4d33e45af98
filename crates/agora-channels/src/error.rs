use agora_protocol::FrameError;
use thiserror::Error;

/// Errors surfaced by the channel manager and its transports.
///
/// None of these are fatal to the manager: connectivity faults are recovered
/// by reconnecting, and the variants returned from `send` only tell the
/// caller that one outbound frame was dropped.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The underlying transport could not be established or broke mid-stream.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The channel is not open; the outbound frame was dropped.
    #[error("Channel is not open")]
    NotConnected,

    /// A frame could not be handed to the transport.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// An outbound envelope could not be encoded.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] FrameError),

    /// An operation exceeded its allowed time budget.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The endpoint or transport settings are invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The manager was created outside a Tokio runtime.
    #[error("No Tokio runtime available")]
    NoRuntime,
}

impl From<ChannelError> for agora_core::AgoraError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Timeout { ms } => agora_core::AgoraError::Timeout { ms },
            other => agora_core::AgoraError::Channel {
                channel: "realtime".to_string(),
                reason: other.to_string(),
            },
        }
    }
}
