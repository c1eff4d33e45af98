use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

/// Callback invoked with the body of every envelope of one event type.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Slot written by `on_event`: one per type, last registration wins.
const PRIMARY: HandlerId = HandlerId(0);

/// Event type → handlers.
///
/// Each type has at most one primary handler plus any number of
/// subscriptions. Dispatch order is primary first, then subscriptions in
/// registration order.
pub struct HandlerRegistry {
    slots: DashMap<String, Vec<(HandlerId, Handler)>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            next_id: AtomicU64::new(PRIMARY.0 + 1),
        }
    }

    /// Install the primary handler for `event_type`. Returns `true` when a
    /// previous primary handler was replaced.
    pub fn set_primary(&self, event_type: &str, handler: Handler) -> bool {
        let mut slot = self.slots.entry(event_type.to_string()).or_default();
        match slot.iter_mut().find(|(id, _)| *id == PRIMARY) {
            Some(existing) => {
                existing.1 = handler;
                true
            }
            None => {
                slot.insert(0, (PRIMARY, handler));
                false
            }
        }
    }

    pub fn remove_primary(&self, event_type: &str) -> bool {
        self.remove(event_type, PRIMARY)
    }

    /// Add a subscription for `event_type`.
    pub fn add(&self, event_type: &str, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.slots
            .entry(event_type.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    pub fn remove(&self, event_type: &str, id: HandlerId) -> bool {
        let removed = match self.slots.get_mut(event_type) {
            Some(mut slot) => {
                let before = slot.len();
                slot.retain(|(h, _)| *h != id);
                slot.len() != before
            }
            None => false,
        };
        self.slots.remove_if(event_type, |_, slot| slot.is_empty());
        removed
    }

    /// Snapshot of the handlers for `event_type`, in dispatch order.
    ///
    /// Handlers are cloned out so no map lock is held while they run.
    pub fn handlers_for(&self, event_type: &str) -> Vec<Handler> {
        self.slots
            .get(event_type)
            .map(|slot| slot.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        self.slots.contains_key(event_type)
    }

    /// Registered event types, sorted.
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration guard returned by `subscribe`. Dropping it (or calling
/// [`cancel`](Self::cancel)) removes the handler.
#[must_use = "dropping a Subscription deregisters its handler immediately"]
pub struct Subscription {
    registry: Weak<HandlerRegistry>,
    event_type: String,
    id: HandlerId,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(registry: &Arc<HandlerRegistry>, event_type: &str, id: HandlerId) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            event_type: event_type.to_string(),
            id,
            active: true,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.event_type, self.id);
            debug!(event_type = %self.event_type, "subscription released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event_type", &self.event_type)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
