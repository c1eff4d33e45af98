use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agora_channels::{ChannelManager, Subscription};
use agora_core::UserId;
use agora_protocol::events::{ChatMessage, OutgoingChat, TypingStatus};
use tracing::{debug, instrument};

use crate::error::{Result, SessionError};

/// Direct chat between the session user and one peer.
///
/// Messages are kept in delivery order. Sent messages show up once the
/// server echoes them back, never optimistically.
pub struct Conversation {
    me: UserId,
    peer: UserId,
    channel: ChannelManager,
    state: Arc<Mutex<ConversationState>>,
    _subscriptions: [Subscription; 2],
}

#[derive(Default)]
struct ConversationState {
    messages: Vec<ChatMessage>,
    peer_typing: bool,
}

impl Conversation {
    pub fn new(channel: &ChannelManager, me: UserId, peer: UserId) -> Self {
        let state = Arc::new(Mutex::new(ConversationState::default()));

        let messages = Arc::clone(&state);
        let on_chat = channel.subscribe_to::<ChatMessage, _>(move |msg| {
            if msg.sender_id != peer && msg.recipient_id != peer {
                return;
            }
            let mut state = lock(&messages);
            if msg.sender_id == peer {
                state.peer_typing = false;
            }
            state.messages.push(msg);
        });

        let typing = Arc::clone(&state);
        let on_typing = channel.subscribe_to::<TypingStatus, _>(move |status| {
            if status.sender_id == Some(peer) {
                debug!(peer = %peer, typing = status.typing, "peer typing");
                lock(&typing).peer_typing = status.typing;
            }
        });

        Self {
            me,
            peer,
            channel: channel.clone(),
            state,
            _subscriptions: [on_chat, on_typing],
        }
    }

    pub fn peer(&self) -> UserId {
        self.peer
    }

    /// Send `text` to the peer. Surrounding whitespace is trimmed and empty
    /// text is rejected without touching the channel.
    #[instrument(skip(self, text), fields(me = %self.me, peer = %self.peer))]
    pub fn send(&self, text: &str) -> Result<()> {
        let content = text.trim();
        if content.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        self.channel.send_event(&OutgoingChat {
            recipient_id: self.peer,
            content: content.to_string(),
        })?;
        Ok(())
    }

    /// Prepend fetched history. Messages already present (by id) are skipped.
    pub fn seed(&self, history: impl IntoIterator<Item = ChatMessage>) {
        let mut state = lock(&self.state);
        let known: Vec<_> = state.messages.iter().filter_map(|m| m.id).collect();
        let mut older: Vec<ChatMessage> = history
            .into_iter()
            .filter(|m| m.id.map_or(true, |id| !known.contains(&id)))
            .collect();
        older.append(&mut state.messages);
        state.messages = older;
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.state).messages.clone()
    }

    pub fn peer_typing(&self) -> bool {
        lock(&self.state).peer_typing
    }
}

fn lock(state: &Mutex<ConversationState>) -> MutexGuard<'_, ConversationState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
