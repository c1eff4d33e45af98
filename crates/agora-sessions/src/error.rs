use agora_channels::ChannelError;
use thiserror::Error;

/// Errors returned by session-scoped consumers.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Outbound chat text was empty after trimming; nothing was sent.
    #[error("message is empty")]
    EmptyMessage,

    /// No signed-in user id was supplied or configured.
    #[error("no signed-in user configured (set session.user_id or pass --user)")]
    MissingUser,

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
