use std::time::Duration;

use agora_channels::ChannelManager;
use agora_core::{AgoraConfig, GroupId, SessionConfig, UserId};
use tracing::{info, instrument};

use crate::{
    chat::Conversation,
    error::{Result, SessionError},
    group_chat::GroupRoom,
    likes::LikeTracker,
    notifications::NotificationFeed,
    presence::PresenceTracker,
    typing::TypingNotifier,
};

/// One signed-in user and the single realtime channel shared by every
/// consumer of that user's session.
///
/// The channel is closed when the session ends, explicitly or on drop.
pub struct Session {
    user: UserId,
    settings: SessionConfig,
    channel: ChannelManager,
}

impl Session {
    /// Open the WebSocket channel for `user` and start connecting.
    #[instrument(skip(config), fields(url = %config.realtime.url))]
    pub fn start(config: &AgoraConfig, user: UserId) -> Result<Self> {
        let channel = ChannelManager::websocket(config.realtime.clone())?;
        Ok(Self::with_manager(user, channel).with_settings(config.session.clone()))
    }

    /// [`start`](Self::start) with the user id taken from `session.user_id`.
    pub fn from_config(config: &AgoraConfig) -> Result<Self> {
        let user = config.session.user_id.ok_or(SessionError::MissingUser)?;
        Self::start(config, UserId(user))
    }

    /// Session over an already built manager (any transport).
    pub fn with_manager(user: UserId, channel: ChannelManager) -> Self {
        channel.connect();
        info!(user = %user, url = channel.url(), "session started");
        Self {
            user,
            settings: SessionConfig::default(),
            channel,
        }
    }

    pub fn with_settings(mut self, settings: SessionConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn user_id(&self) -> UserId {
        self.user
    }

    pub fn channel(&self) -> &ChannelManager {
        &self.channel
    }

    /// Close the channel. Consumers stay valid but receive nothing more.
    pub fn end(&self) {
        self.channel.close();
    }

    pub fn presence(&self) -> PresenceTracker {
        PresenceTracker::new(&self.channel)
    }

    pub fn notifications(&self) -> NotificationFeed {
        NotificationFeed::new(&self.channel, self.settings.notification_capacity)
    }

    pub fn likes(&self) -> LikeTracker {
        LikeTracker::new(&self.channel, self.user)
    }

    pub fn conversation(&self, peer: UserId) -> Conversation {
        Conversation::new(&self.channel, self.user, peer)
    }

    pub fn typing_notifier(&self, peer: UserId) -> Result<TypingNotifier> {
        TypingNotifier::new(
            self.channel.clone(),
            peer,
            Duration::from_millis(self.settings.typing_idle_ms),
        )
    }

    pub fn group_room(&self, group: GroupId) -> GroupRoom {
        GroupRoom::new(&self.channel, group)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end();
        info!(user = %self.user, "session ended");
    }
}
