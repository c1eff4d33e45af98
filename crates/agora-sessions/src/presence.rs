use std::sync::Arc;

use agora_channels::{ChannelManager, Subscription};
use agora_core::UserId;
use agora_protocol::{event_types, events::UserStatus};
use dashmap::DashMap;
use tracing::debug;

/// Online/offline state of other users, kept current from presence events.
///
/// Listens to both `user_status` and the older `online_status` name.
/// Users never reported are considered offline.
pub struct PresenceTracker {
    online: Arc<DashMap<UserId, bool>>,
    _subscriptions: [Subscription; 2],
}

impl PresenceTracker {
    pub fn new(channel: &ChannelManager) -> Self {
        let online = Arc::new(DashMap::new());
        let subscriptions = [event_types::USER_STATUS, event_types::ONLINE_STATUS].map(|name| {
            let online = Arc::clone(&online);
            channel.subscribe_typed::<UserStatus, _>(name, move |status| {
                debug!(user = %status.user_id, online = status.is_online, "presence update");
                online.insert(status.user_id, status.is_online);
            })
        });

        Self {
            online,
            _subscriptions: subscriptions,
        }
    }

    /// Load a snapshot, e.g. from the followers list. Later events win.
    pub fn seed(&self, snapshot: impl IntoIterator<Item = (UserId, bool)>) {
        for (user, is_online) in snapshot {
            self.online.insert(user, is_online);
        }
    }

    pub fn is_online(&self, user: UserId) -> bool {
        self.online.get(&user).is_some_and(|entry| *entry)
    }

    /// Users currently online, sorted by id.
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .online
            .iter()
            .filter(|entry| *entry.value())
            .map(|entry| *entry.key())
            .collect();
        users.sort();
        users
    }
}
