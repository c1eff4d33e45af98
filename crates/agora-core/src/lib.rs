//! Shared building blocks for the Agora realtime client: configuration,
//! the common error type and the id newtypes every other crate speaks.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AgoraConfig, RealtimeConfig, ReconnectConfig, ReconnectStrategy, SessionConfig};
pub use error::{AgoraError, Result};
pub use types::{ConnId, GroupId, MessageId, NotificationId, PostId, UserId};
