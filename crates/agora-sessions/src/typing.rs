//! Outbound typing indicator with an idle timeout.
//!
//! The first keystroke sends `typing: true`; `typing: false` follows once no
//! keystroke arrived for the idle period. Each keystroke restarts the timer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use agora_channels::{ChannelError, ChannelManager};
use agora_core::UserId;
use agora_protocol::events::TypingStatus;
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::debug;

use crate::error::Result;

pub struct TypingNotifier {
    recipient: UserId,
    idle: Duration,
    shared: Arc<Mutex<TypingState>>,
    channel: ChannelManager,
    runtime: Handle,
}

#[derive(Default)]
struct TypingState {
    active: bool,
    stop_timer: Option<JoinHandle<()>>,
    /// Bumped on every keystroke; a timer only acts on its own generation.
    generation: u64,
}

impl TypingNotifier {
    pub fn new(channel: ChannelManager, recipient: UserId, idle: Duration) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| ChannelError::NoRuntime)?;
        Ok(Self {
            recipient,
            idle,
            shared: Arc::new(Mutex::new(TypingState::default())),
            channel,
            runtime,
        })
    }

    /// Record a keystroke.
    pub fn keystroke(&self) {
        let mut state = lock(&self.shared);

        if !state.active {
            if let Err(e) = self.channel.send_event(&TypingStatus::to(self.recipient, true)) {
                debug!(error = %e, "typing start not sent");
                return;
            }
            state.active = true;
        }

        if let Some(timer) = state.stop_timer.take() {
            timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        let shared = Arc::downgrade(&self.shared);
        let channel = self.channel.clone();
        let recipient = self.recipient;
        let idle = self.idle;
        state.stop_timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(idle).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut state = lock(&shared);
            if state.generation != generation || !state.active {
                return;
            }
            state.active = false;
            state.stop_timer = None;
            if let Err(e) = channel.send_event(&TypingStatus::to(recipient, false)) {
                debug!(error = %e, "typing stop not sent");
            }
        }));
    }

    /// Send `typing: false` now, e.g. when the message is submitted.
    pub fn stop(&self) {
        let mut state = lock(&self.shared);
        if let Some(timer) = state.stop_timer.take() {
            timer.abort();
        }
        state.generation += 1;
        if std::mem::take(&mut state.active) {
            if let Err(e) = self.channel.send_event(&TypingStatus::to(self.recipient, false)) {
                debug!(error = %e, "typing stop not sent");
            }
        }
    }

    pub fn is_typing(&self) -> bool {
        lock(&self.shared).active
    }

    pub fn has_pending_stop(&self) -> bool {
        lock(&self.shared).stop_timer.is_some()
    }
}

impl Drop for TypingNotifier {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(state: &Mutex<TypingState>) -> MutexGuard<'_, TypingState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
