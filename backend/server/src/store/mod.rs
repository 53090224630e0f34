//! # Store
//!
//! Everything the board persists lives in a hosted relational backend. This
//! module is the boundary to it.
//!
//! ## Tables
//! - `posts`: board and channel posts, `channel_id` null for the main board
//! - `replies`: append-only, `parent_id` null for top-level replies
//! - `polls`: one per post at most, options fixed at creation
//! - `poll_votes`: raw vote log, one row per vote
//! - `channels`: name, description and a member counter
//! - `reports`: moderation queue
//!
//! ## RPC
//! - `increment_member_count(channel_id)`
//! - `decrement_member_count(channel_id)`
//!
//! Member counters go through RPC so the backend applies them atomically.
//! Nothing here retries; a failed call surfaces as a [`StoreError`].
use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Channel, ChannelId, NewChannel, NewPoll, NewPost, NewReply, NewReport, Poll, PollId, Post,
    PostId, Reply, ReplyId, Report, Vote,
};

pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("malformed row: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("backend returned no row for {0}")]
    Missing(&'static str),
}

/// One page of the main board, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    pub fn has_more(&self, total: u64) -> bool {
        total > self.offset() + u64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Posts outside any channel, most reacted first, newest first on ties.
    async fn list_posts(&self, page: Page) -> Result<PostPage, StoreError>;

    async fn get_post(&self, id: PostId) -> Result<Option<Post>, StoreError>;

    async fn insert_post(&self, post: NewPost) -> Result<Post, StoreError>;

    /// Returns the new count, or `None` if the post does not exist.
    async fn increment_reactions(&self, id: PostId) -> Result<Option<i64>, StoreError>;

    /// Replies of one post in creation order.
    async fn list_replies(&self, post_id: PostId) -> Result<Vec<Reply>, StoreError>;

    async fn get_reply(&self, id: ReplyId) -> Result<Option<Reply>, StoreError>;

    async fn insert_reply(&self, reply: NewReply) -> Result<Reply, StoreError>;

    async fn poll_for_post(&self, post_id: PostId) -> Result<Option<Poll>, StoreError>;

    async fn insert_poll(&self, poll: NewPoll) -> Result<Poll, StoreError>;

    async fn list_votes(&self, poll_id: PollId) -> Result<Vec<Vote>, StoreError>;

    async fn insert_vote(&self, vote: Vote) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_channels(&self) -> Result<Vec<Channel>, StoreError>;

    async fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>, StoreError>;

    async fn insert_channel(&self, channel: NewChannel) -> Result<Channel, StoreError>;

    /// `delta` is applied through the backend's increment/decrement RPC.
    async fn adjust_member_count(&self, id: ChannelId, delta: i64) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_channel_posts(&self, channel_id: ChannelId) -> Result<Vec<Post>, StoreError>;

    async fn insert_report(&self, report: NewReport) -> Result<Report, StoreError>;
}
