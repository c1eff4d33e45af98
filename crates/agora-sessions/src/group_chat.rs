use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agora_channels::{ChannelManager, Subscription};
use agora_core::GroupId;
use agora_protocol::events::{GroupChatMessage, OutgoingGroupChat};
use tracing::{debug, instrument};

use crate::error::{Result, SessionError};

/// Chat room of one group. Messages for other groups, or without a
/// resolvable group id, are ignored.
pub struct GroupRoom {
    group: GroupId,
    channel: ChannelManager,
    messages: Arc<Mutex<Vec<GroupChatMessage>>>,
    _subscription: Subscription,
}

impl GroupRoom {
    pub fn new(channel: &ChannelManager, group: GroupId) -> Self {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&messages);
        let subscription = channel.subscribe_to::<GroupChatMessage, _>(move |msg| {
            if msg.group_id() != Some(group) {
                return;
            }
            debug!(group = %group, sender = %msg.sender_id, "group message");
            lock(&sink).push(msg);
        });

        Self {
            group,
            channel: channel.clone(),
            messages,
            _subscription: subscription,
        }
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    #[instrument(skip(self, text), fields(group = %self.group))]
    pub fn send(&self, text: &str) -> Result<()> {
        let message = text.trim();
        if message.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        self.channel
            .send_event(&OutgoingGroupChat::new(self.group, message))?;
        Ok(())
    }

    pub fn messages(&self) -> Vec<GroupChatMessage> {
        lock(&self.messages).clone()
    }
}

fn lock(messages: &Mutex<Vec<GroupChatMessage>>) -> MutexGuard<'_, Vec<GroupChatMessage>> {
    messages.lock().unwrap_or_else(PoisonError::into_inner)
}
