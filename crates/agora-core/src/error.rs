use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgoraError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error ({channel}): {reason}")]
    Channel { channel: String, reason: String },

    #[error("Timed out after {ms}ms")]
    Timeout { ms: u64 },
}

impl AgoraError {
    /// Short, stable error code for logs and CLI exit messages.
    pub fn code(&self) -> &'static str {
        match self {
            AgoraError::Config(_) => "CONFIG_ERROR",
            AgoraError::Channel { .. } => "CHANNEL_ERROR",
            AgoraError::Timeout { .. } => "TIMEOUT",
        }
    }
}

pub type Result<T> = std::result::Result<T, AgoraError>;
