use std::sync::Arc;

use agora_channels::{ChannelManager, Subscription};
use agora_core::{PostId, UserId};
use agora_protocol::events::LikeUpdate;
use dashmap::DashMap;
use tracing::debug;

/// What the feed shows for one post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikeState {
    pub like_count: u64,
    /// Whether the session user likes the post.
    pub user_liked: bool,
}

/// Live like counts per post.
///
/// Updates are broadcast to every viewer, so the count always follows the
/// latest update while `user_liked` only follows updates caused by the
/// session user.
pub struct LikeTracker {
    posts: Arc<DashMap<PostId, LikeState>>,
    _subscription: Subscription,
}

impl LikeTracker {
    pub fn new(channel: &ChannelManager, me: UserId) -> Self {
        let posts = Arc::new(DashMap::new());
        let sink = Arc::clone(&posts);
        let subscription = channel.subscribe_to::<LikeUpdate, _>(move |update| {
            apply(&sink, me, &update);
        });

        Self {
            posts,
            _subscription: subscription,
        }
    }

    /// Record the state fetched with the post itself.
    pub fn seed(&self, post: PostId, state: LikeState) {
        self.posts.insert(post, state);
    }

    pub fn get(&self, post: PostId) -> Option<LikeState> {
        self.posts.get(&post).map(|entry| *entry)
    }

    pub fn forget(&self, post: PostId) {
        self.posts.remove(&post);
    }
}

fn apply(posts: &DashMap<PostId, LikeState>, me: UserId, update: &LikeUpdate) {
    let mut state = posts.entry(update.post_id).or_default();
    state.like_count = update.like_count;
    if update.user_id == me {
        state.user_liked = update.user_liked;
    }
    debug!(post = %update.post_id, count = update.like_count, "like update applied");
}
