//! Session-scoped realtime state: the signed-in user, the one shared
//! channel manager, and the consumers that turn pushed events into state.

pub mod chat;
pub mod error;
pub mod group_chat;
pub mod likes;
pub mod notifications;
pub mod presence;
pub mod session;
pub mod typing;

pub use chat::Conversation;
pub use error::{Result, SessionError};
pub use group_chat::GroupRoom;
pub use likes::{LikeState, LikeTracker};
pub use notifications::NotificationFeed;
pub use presence::PresenceTracker;
pub use session::Session;
pub use typing::TypingNotifier;
