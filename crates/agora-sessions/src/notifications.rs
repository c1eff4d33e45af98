use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agora_channels::{ChannelManager, Subscription};
use agora_core::NotificationId;
use agora_protocol::events::{Notification, NotificationEvent};
use tracing::debug;

/// Bounded, arrival-ordered list of pushed notifications.
pub struct NotificationFeed {
    items: Arc<Mutex<Items>>,
    _subscription: Subscription,
}

struct Items {
    list: VecDeque<Notification>,
    capacity: usize,
}

impl Items {
    fn new(capacity: usize) -> Self {
        Self {
            list: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append, or replace in place when the id is already known.
    fn push(&mut self, notification: Notification) {
        if let Some(existing) = self.list.iter_mut().find(|n| n.id == notification.id) {
            *existing = notification;
            return;
        }
        self.list.push_back(notification);
        while self.list.len() > self.capacity {
            self.list.pop_front();
        }
    }
}

impl NotificationFeed {
    /// Keeps at most `capacity` notifications; the oldest are evicted first.
    pub fn new(channel: &ChannelManager, capacity: usize) -> Self {
        let items = Arc::new(Mutex::new(Items::new(capacity)));
        let sink = Arc::clone(&items);
        let subscription = channel.subscribe_to::<NotificationEvent, _>(move |event| {
            debug!(id = %event.data.id, kind = ?event.data.kind, "notification received");
            lock(&sink).push(event.data);
        });

        Self {
            items,
            _subscription: subscription,
        }
    }

    /// Replace the contents with a fetched snapshot (oldest first).
    pub fn seed(&self, snapshot: impl IntoIterator<Item = Notification>) {
        let mut items = lock(&self.items);
        items.list.clear();
        for notification in snapshot {
            items.push(notification);
        }
    }

    /// Oldest first.
    pub fn items(&self) -> Vec<Notification> {
        lock(&self.items).list.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).list.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).list.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        lock(&self.items).list.iter().filter(|n| !n.read).count()
    }

    /// Returns `false` when no notification has that id.
    pub fn mark_read(&self, id: NotificationId) -> bool {
        match lock(&self.items).list.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&self) {
        for n in lock(&self.items).list.iter_mut() {
            n.read = true;
        }
    }

    pub fn remove(&self, id: NotificationId) -> Option<Notification> {
        let mut items = lock(&self.items);
        let index = items.list.iter().position(|n| n.id == id)?;
        items.list.remove(index)
    }

    pub fn clear(&self) {
        lock(&self.items).list.clear();
    }
}

fn lock(items: &Mutex<Items>) -> MutexGuard<'_, Items> {
    items.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::UserId;
    use agora_protocol::events::NotificationKind;

    fn notification(id: u64) -> Notification {
        Notification {
            id: NotificationId(id),
            to_user_id: UserId(1),
            from_user_id: UserId(2),
            content: format!("notification {id}"),
            read: false,
            group_id: None,
            created_at: None,
            kind: NotificationKind::FollowRequest,
        }
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut items = Items::new(2);
        for id in 1..=3 {
            items.push(notification(id));
        }
        let ids: Vec<u64> = items.list.iter().map(|n| n.id.get()).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn repeated_id_replaces_in_place() {
        let mut items = Items::new(10);
        items.push(notification(1));
        items.push(notification(2));
        let mut updated = notification(1);
        updated.read = true;
        items.push(updated);

        assert_eq!(items.list.len(), 2);
        assert_eq!(items.list[0].id, NotificationId(1));
        assert!(items.list[0].read);
    }

    #[test]
    fn zero_capacity_still_keeps_latest() {
        let mut items = Items::new(0);
        items.push(notification(1));
        items.push(notification(2));
        assert_eq!(items.list.len(), 1);
        assert_eq!(items.list[0].id, NotificationId(2));
    }
}
