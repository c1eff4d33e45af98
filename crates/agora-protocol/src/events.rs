//! Typed payloads for every event type the server is known to push or accept.
//!
//! Each struct models the envelope *body* (everything except `type`). Inbound
//! shapes are decoded leniently: optional server fields default, and the two
//! spellings the server uses for the same flag are both accepted.

use agora_core::{GroupId, MessageId, NotificationId, PostId, UserId};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::event_types;

/// A payload bound to one event type discriminator.
pub trait Event: Serialize + DeserializeOwned + Send + 'static {
    const TYPE: &'static str;
}

/// Direct message as echoed to sender and recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Event for ChatMessage {
    const TYPE: &'static str = event_types::CHAT;
}

/// Direct message as submitted by the client; the server fills in the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingChat {
    pub recipient_id: UserId,
    pub content: String,
}

impl Event for OutgoingChat {
    const TYPE: &'static str = event_types::CHAT;
}

/// Typing indicator. Clients send `recipient_id`; the server forwards with
/// `sender_id` and, depending on endpoint, spells the flag `is_typing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<UserId>,
    #[serde(alias = "is_typing")]
    pub typing: bool,
}

impl TypingStatus {
    pub fn to(recipient_id: UserId, typing: bool) -> Self {
        Self {
            sender_id: None,
            recipient_id: Some(recipient_id),
            typing,
        }
    }
}

impl Event for TypingStatus {
    const TYPE: &'static str = event_types::TYPING;
}

/// Presence change broadcast when a user's socket opens or closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStatus {
    pub user_id: UserId,
    #[serde(alias = "online")]
    pub is_online: bool,
}

impl Event for UserStatus {
    const TYPE: &'static str = event_types::USER_STATUS;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FollowRequest,
    FollowAccept,
    FollowReject,
    NotificationEvent,
    #[default]
    #[serde(other)]
    Other,
}

/// Stored notification record, as carried in the `data` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub to_user_id: UserId,
    pub from_user_id: UserId,
    pub content: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
}

/// Wire: `{ "type": "notification", "data": { ...Notification } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub data: Notification,
}

impl Event for NotificationEvent {
    const TYPE: &'static str = event_types::NOTIFICATION;
}

/// Like count change for one post, broadcast to every feed viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeUpdate {
    pub post_id: PostId,
    pub like_count: u64,
    /// The user whose action produced this update.
    pub user_id: UserId,
    /// Whether `user_id` now likes the post.
    pub user_liked: bool,
}

impl Event for LikeUpdate {
    const TYPE: &'static str = event_types::LIKE;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupChatBody {
    pub group_id: GroupId,
    pub message: String,
}

/// The server flattens group messages (`content` is the text, `group_id` is
/// top-level) while clients nest them; both shapes are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupChatContent {
    Text(String),
    Addressed(GroupChatBody),
}

/// Group message as fanned out to online members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    pub content: GroupChatContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    pub sender_id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl GroupChatMessage {
    pub fn group_id(&self) -> Option<GroupId> {
        match &self.content {
            GroupChatContent::Addressed(body) => Some(body.group_id),
            GroupChatContent::Text(_) => self.group_id,
        }
    }

    pub fn text(&self) -> &str {
        match &self.content {
            GroupChatContent::Text(text) => text,
            GroupChatContent::Addressed(body) => &body.message,
        }
    }
}

impl Event for GroupChatMessage {
    const TYPE: &'static str = event_types::GROUP_CHAT;
}

/// Wire: `{ "type": "groupChat", "content": { "group_id": 4, "message": "hello" } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingGroupChat {
    pub content: GroupChatBody,
}

impl OutgoingGroupChat {
    pub fn new(group_id: GroupId, message: impl Into<String>) -> Self {
        Self {
            content: GroupChatBody {
                group_id,
                message: message.into(),
            },
        }
    }
}

impl Event for OutgoingGroupChat {
    const TYPE: &'static str = event_types::GROUP_CHAT;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {}

impl Event for Ping {
    const TYPE: &'static str = event_types::PING;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {}

impl Event for Pong {
    const TYPE: &'static str = event_types::PONG;
}
