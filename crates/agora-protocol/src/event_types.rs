// Well-known event type discriminators, as emitted and accepted by the server.

// direct chat
pub const CHAT: &str = "chat";
pub const TYPING: &str = "typing";

// presence
pub const USER_STATUS: &str = "user_status";
/// Older presence name still pushed to the chat list.
pub const ONLINE_STATUS: &str = "online_status";

// feed
pub const NOTIFICATION: &str = "notification";
pub const LIKE: &str = "like";

// groups
pub const GROUP_CHAT: &str = "groupChat";

// keepalive
pub const PING: &str = "ping";
pub const PONG: &str = "pong";
