use std::cmp::Reverse;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{Page, PostPage, Store, StoreError};
use crate::models::{
    Channel, ChannelId, NewChannel, NewPoll, NewPost, NewReply, NewReport, Poll, PollId, Post,
    PostId, Reply, ReplyId, Report, Vote,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    posts: Vec<Post>,
    replies: Vec<Reply>,
    polls: Vec<Poll>,
    votes: Vec<Vote>,
    channels: Vec<Channel>,
    reports: Vec<Report>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store used when no backend is configured, and by tests.
///
/// Ids come from one shared counter, so they also order rows by insertion.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reports(&self) -> Vec<Report> {
        self.tables.lock().await.reports.clone()
    }
}

fn newest_first(posts: &mut [Post]) {
    posts.sort_by_key(|post| Reverse((post.created_at, post.id)));
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_posts(&self, page: Page) -> Result<PostPage, StoreError> {
        let tables = self.tables.lock().await;

        let mut posts: Vec<Post> = tables
            .posts
            .iter()
            .filter(|post| post.channel_id.is_none())
            .cloned()
            .collect();
        posts.sort_by_key(|post| Reverse((post.reactions, post.created_at, post.id)));

        let total = posts.len() as u64;
        let posts = posts
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();

        Ok(PostPage { posts, total })
    }

    async fn get_post(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        let tables = self.tables.lock().await;

        Ok(tables.posts.iter().find(|post| post.id == id).cloned())
    }

    async fn insert_post(&self, post: NewPost) -> Result<Post, StoreError> {
        let mut tables = self.tables.lock().await;

        let post = Post {
            id: tables.next_id(),
            title: post.title,
            description: post.description,
            author: post.author,
            has_image: post.has_image,
            has_poll: post.has_poll,
            image: post.image,
            reactions: post.reactions,
            channel_id: post.channel_id,
            created_at: Utc::now(),
        };
        tables.posts.push(post.clone());

        Ok(post)
    }

    async fn increment_reactions(&self, id: PostId) -> Result<Option<i64>, StoreError> {
        let mut tables = self.tables.lock().await;

        Ok(tables
            .posts
            .iter_mut()
            .find(|post| post.id == id)
            .map(|post| {
                post.reactions += 1;
                post.reactions
            }))
    }

    async fn list_replies(&self, post_id: PostId) -> Result<Vec<Reply>, StoreError> {
        let tables = self.tables.lock().await;

        let mut replies: Vec<Reply> = tables
            .replies
            .iter()
            .filter(|reply| reply.post_id == post_id)
            .cloned()
            .collect();
        replies.sort_by_key(|reply| (reply.created_at, reply.id));

        Ok(replies)
    }

    async fn get_reply(&self, id: ReplyId) -> Result<Option<Reply>, StoreError> {
        let tables = self.tables.lock().await;

        Ok(tables.replies.iter().find(|reply| reply.id == id).cloned())
    }

    async fn insert_reply(&self, reply: NewReply) -> Result<Reply, StoreError> {
        let mut tables = self.tables.lock().await;

        let reply = Reply {
            id: tables.next_id(),
            post_id: reply.post_id,
            content: reply.content,
            author: reply.author,
            parent_id: reply.parent_id,
            created_at: Utc::now(),
        };
        tables.replies.push(reply.clone());

        Ok(reply)
    }

    async fn poll_for_post(&self, post_id: PostId) -> Result<Option<Poll>, StoreError> {
        let tables = self.tables.lock().await;

        Ok(tables.polls.iter().find(|poll| poll.post_id == post_id).cloned())
    }

    async fn insert_poll(&self, poll: NewPoll) -> Result<Poll, StoreError> {
        let mut tables = self.tables.lock().await;

        let poll = Poll {
            id: tables.next_id(),
            post_id: poll.post_id,
            question: poll.question,
            options: poll.options,
        };
        tables.polls.push(poll.clone());

        Ok(poll)
    }

    async fn list_votes(&self, poll_id: PollId) -> Result<Vec<Vote>, StoreError> {
        let tables = self.tables.lock().await;

        Ok(tables
            .votes
            .iter()
            .filter(|vote| vote.poll_id == poll_id)
            .copied()
            .collect())
    }

    async fn insert_vote(&self, vote: Vote) -> Result<(), StoreError> {
        self.tables.lock().await.votes.push(vote);

        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, StoreError> {
        let tables = self.tables.lock().await;

        let mut channels = tables.channels.clone();
        channels.sort_by_key(|channel| Reverse((channel.created_at, channel.id)));

        Ok(channels)
    }

    async fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>, StoreError> {
        let tables = self.tables.lock().await;

        Ok(tables.channels.iter().find(|channel| channel.id == id).cloned())
    }

    async fn insert_channel(&self, channel: NewChannel) -> Result<Channel, StoreError> {
        let mut tables = self.tables.lock().await;

        let channel = Channel {
            id: tables.next_id(),
            name: channel.name,
            description: channel.description,
            member_count: channel.member_count,
            created_at: Utc::now(),
        };
        tables.channels.push(channel.clone());

        Ok(channel)
    }

    async fn adjust_member_count(&self, id: ChannelId, delta: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;

        if let Some(channel) = tables.channels.iter_mut().find(|channel| channel.id == id) {
            channel.member_count = (channel.member_count + delta).max(0);
        }

        Ok(())
    }

    async fn list_channel_posts(&self, channel_id: ChannelId) -> Result<Vec<Post>, StoreError> {
        let tables = self.tables.lock().await;

        let mut posts: Vec<Post> = tables
            .posts
            .iter()
            .filter(|post| post.channel_id == Some(channel_id))
            .cloned()
            .collect();
        newest_first(&mut posts);

        Ok(posts)
    }

    async fn insert_report(&self, report: NewReport) -> Result<Report, StoreError> {
        let mut tables = self.tables.lock().await;

        let report = Report {
            id: tables.next_id(),
            post_id: report.post_id,
            post_title: report.post_title,
            post_author: report.post_author,
            category: report.category,
            reason: report.reason,
            status: report.status,
            created_at: report.created_at,
        };
        tables.reports.push(report.clone());

        Ok(report)
    }
}
