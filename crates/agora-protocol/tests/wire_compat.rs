// Verify wire format matches what the social-network server emits and accepts.
// Sample frames are copied from the server's JSON shapes.

use agora_core::{GroupId, PostId, UserId};
use agora_protocol::events::{
    ChatMessage, GroupChatContent, GroupChatMessage, LikeUpdate, NotificationEvent,
    NotificationKind, OutgoingChat, OutgoingGroupChat, TypingStatus, UserStatus,
};
use agora_protocol::{event_types, parse_frame, Envelope, Event};

#[test]
fn chat_echo_decodes() {
    let json = r#"{"type":"chat","id":12,"sender_id":1,"recipient_id":2,"content":"hi","created_at":"2024-11-02T10:15:00.123456+01:00"}"#;
    let env = parse_frame(json, None).unwrap();
    assert_eq!(env.event_type, ChatMessage::TYPE);

    let msg: ChatMessage = env.decode().unwrap();
    assert_eq!(msg.sender_id, UserId(1));
    assert_eq!(msg.recipient_id, UserId(2));
    assert_eq!(msg.content, "hi");
    assert!(msg.created_at.is_some());
}

#[test]
fn outgoing_chat_serialization() {
    let env = Envelope::new(
        OutgoingChat::TYPE,
        OutgoingChat {
            recipient_id: UserId(9),
            content: "hello 👋".into(),
        },
    )
    .unwrap();
    let json = env.to_json().unwrap();

    assert!(json.contains(r#""type":"chat""#));
    assert!(json.contains(r#""recipient_id":9"#));
    assert!(json.contains("hello 👋"));
}

#[test]
fn typing_accepts_both_flag_spellings() {
    let general = parse_frame(r#"{"type":"typing","recipient_id":3,"typing":true}"#, None).unwrap();
    let status: TypingStatus = general.decode().unwrap();
    assert!(status.typing);
    assert_eq!(status.sender_id, None);

    let chat = parse_frame(
        r#"{"type":"typing","sender_id":4,"recipient_id":3,"is_typing":false}"#,
        None,
    )
    .unwrap();
    let status: TypingStatus = chat.decode().unwrap();
    assert!(!status.typing);
    assert_eq!(status.sender_id, Some(UserId(4)));
}

#[test]
fn outgoing_typing_omits_sender() {
    let env = Envelope::new(TypingStatus::TYPE, TypingStatus::to(UserId(5), true)).unwrap();
    let json = env.to_json().unwrap();
    assert!(json.contains(r#""typing":true"#));
    assert!(!json.contains("sender_id"));
}

#[test]
fn user_status_and_legacy_online_status() {
    let env = parse_frame(r#"{"type":"user_status","user_id":8,"is_online":true}"#, None).unwrap();
    let status: UserStatus = env.decode().unwrap();
    assert!(status.is_online);

    let legacy = parse_frame(r#"{"type":"online_status","user_id":8,"online":false}"#, None).unwrap();
    assert_eq!(legacy.event_type, event_types::ONLINE_STATUS);
    let status: UserStatus = legacy.decode().unwrap();
    assert!(!status.is_online);
}

#[test]
fn notification_payload_nested_in_data() {
    let json = r#"{"type":"notification","data":{"id":5,"to_user_id":2,"content":"alice wants to follow you","from_user_id":1,"read":false,"created_at":"2024-11-02T10:15:00Z","type":"follow_request"}}"#;
    let env = parse_frame(json, None).unwrap();
    let ev: NotificationEvent = env.decode().unwrap();
    assert_eq!(ev.data.kind, NotificationKind::FollowRequest);
    assert_eq!(ev.data.group_id, None);
    assert!(!ev.data.read);
}

#[test]
fn unknown_notification_kind_is_other() {
    let json = r#"{"type":"notification","data":{"id":6,"to_user_id":2,"content":"x","from_user_id":1,"type":"group_invite"}}"#;
    let ev: NotificationEvent = parse_frame(json, None).unwrap().decode().unwrap();
    assert_eq!(ev.data.kind, NotificationKind::Other);
}

#[test]
fn bare_like_update_from_likes_endpoint() {
    let json = r#"{"post_id":31,"like_count":4,"user_liked":true,"user_id":2}"#;
    let env = parse_frame(json, Some(event_types::LIKE)).unwrap();
    let like: LikeUpdate = env.decode().unwrap();
    assert_eq!(like.post_id, PostId(31));
    assert_eq!(like.like_count, 4);
    assert!(like.user_liked);
}

#[test]
fn group_chat_server_shape() {
    let json = r#"{"type":"groupChat","id":77,"content":"see you there","group_id":4,"sender_id":2,"username":"bob","created_at":"2024-11-02T10:15:00Z"}"#;
    let msg: GroupChatMessage = parse_frame(json, None).unwrap().decode().unwrap();
    assert_eq!(msg.group_id(), Some(GroupId(4)));
    assert_eq!(msg.text(), "see you there");
    assert_eq!(msg.username, "bob");
}

#[test]
fn group_chat_client_shape() {
    let json = r#"{"type":"groupChat","content":{"group_id":4,"message":"hello"},"sender_id":2,"username":"bob"}"#;
    let msg: GroupChatMessage = parse_frame(json, None).unwrap().decode().unwrap();
    assert!(matches!(msg.content, GroupChatContent::Addressed(_)));
    assert_eq!(msg.group_id(), Some(GroupId(4)));
    assert_eq!(msg.text(), "hello");
}

#[test]
fn outgoing_group_chat_nests_content() {
    let env = Envelope::new(
        OutgoingGroupChat::TYPE,
        OutgoingGroupChat::new(GroupId(4), "hello"),
    )
    .unwrap();
    let json = env.to_json().unwrap();
    assert!(json.contains(r#""type":"groupChat""#));
    assert!(json.contains(r#""content":{"group_id":4,"message":"hello"}"#));
}

#[test]
fn ping_is_bare() {
    let env = Envelope::new("ping", agora_protocol::events::Ping {}).unwrap();
    assert_eq!(env.to_json().unwrap(), r#"{"type":"ping"}"#);
}
