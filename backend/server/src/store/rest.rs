//! REST row interface of the hosted backend.
//!
//! Tables are addressed as `/rest/v1/<table>` with filter query parameters
//! (`id=eq.7`, `channel_id=is.null`), ordering (`order=a.desc,b.desc`) and
//! `limit`/`offset`. Writes ask for `Prefer: return=representation` so the
//! stored row comes back in the response. Totals come from the
//! `Content-Range` header when `Prefer: count=exact` is set.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, Method, RequestBuilder, Response,
    header::{AUTHORIZATION, CONTENT_RANGE},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, instrument};

use super::{Page, PostPage, Store, StoreError};
use crate::models::{
    Channel, ChannelId, NewChannel, NewPoll, NewPost, NewReply, NewReport, Poll, PollId, Post,
    PostId, Reply, ReplyId, Report, Vote,
};

const POSTS: &str = "posts";
const REPLIES: &str = "replies";
const POLLS: &str = "polls";
const POLL_VOTES: &str = "poll_votes";
const CHANNELS: &str = "channels";
const REPORTS: &str = "reports";

const INCREMENT_MEMBERS: &str = "increment_member_count";
const DECREMENT_MEMBERS: &str = "decrement_member_count";

const PREFER: &str = "Prefer";

type Query = Vec<(&'static str, String)>;

pub struct RestStore {
    client: Client,
    base_url: String,
    service_key: String,
}

impl RestStore {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{path}", self.base_url))
            .header("apikey", &self.service_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.service_key))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: Query) -> Result<Vec<T>, StoreError> {
        let response = self.request(Method::GET, table).query(&query).send().await?;

        decode(check(response).await?).await
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        mut query: Query,
    ) -> Result<Option<T>, StoreError> {
        query.push(("limit", "1".to_string()));

        Ok(self.select(table, query).await?.into_iter().next())
    }

    async fn insert<B, T>(&self, table: &'static str, body: &B) -> Result<T, StoreError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, table)
            .header(PREFER, "return=representation")
            .json(body)
            .send()
            .await?;

        let rows: Vec<T> = decode(check(response).await?).await?;
        rows.into_iter().next().ok_or(StoreError::Missing(table))
    }

    async fn rpc(&self, function: &str, channel_id: ChannelId) -> Result<(), StoreError> {
        let response = self
            .request(Method::POST, &format!("rpc/{function}"))
            .json(&json!({ "channel_id": channel_id }))
            .send()
            .await?;

        check(response).await.map(|_| ())
    }
}

fn eq(value: i64) -> String {
    format!("eq.{value}")
}

async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Backend {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    let bytes = response.bytes().await?;

    Ok(serde_json::from_slice(&bytes)?)
}

/// `Content-Range: 0-7/42` or `*/0`. Anything unreadable counts as zero.
fn total_from_range(header: Option<&str>) -> u64 {
    header
        .and_then(|range| range.rsplit_once('/'))
        .and_then(|(_, total)| total.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl Store for RestStore {
    #[instrument(skip(self))]
    async fn list_posts(&self, page: Page) -> Result<PostPage, StoreError> {
        let query: Query = vec![
            ("select", "*".to_string()),
            ("channel_id", "is.null".to_string()),
            ("order", "reactions.desc,created_at.desc".to_string()),
            ("limit", page.limit.to_string()),
            ("offset", page.offset().to_string()),
        ];

        let response = self
            .request(Method::GET, POSTS)
            .header(PREFER, "count=exact")
            .query(&query)
            .send()
            .await?;
        let response = check(response).await?;

        let total = total_from_range(
            response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|value| value.to_str().ok()),
        );
        let posts = decode(response).await?;

        Ok(PostPage { posts, total })
    }

    async fn get_post(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        self.select_one(POSTS, vec![("select", "*".to_string()), ("id", eq(id))])
            .await
    }

    async fn insert_post(&self, post: NewPost) -> Result<Post, StoreError> {
        self.insert(POSTS, &post).await
    }

    async fn increment_reactions(&self, id: PostId) -> Result<Option<i64>, StoreError> {
        let Some(post) = self.get_post(id).await? else {
            return Ok(None);
        };

        let reactions = post.reactions + 1;
        debug!("Post {id} reactions -> {reactions}");

        let response = self
            .request(Method::PATCH, POSTS)
            .header(PREFER, "return=representation")
            .query(&[("id", eq(id))])
            .json(&json!({ "reactions": reactions }))
            .send()
            .await?;

        let rows: Vec<Post> = decode(check(response).await?).await?;
        Ok(rows.into_iter().next().map(|post| post.reactions))
    }

    async fn list_replies(&self, post_id: PostId) -> Result<Vec<Reply>, StoreError> {
        self.select(
            REPLIES,
            vec![
                ("select", "*".to_string()),
                ("post_id", eq(post_id)),
                ("order", "created_at.asc,id.asc".to_string()),
            ],
        )
        .await
    }

    async fn get_reply(&self, id: ReplyId) -> Result<Option<Reply>, StoreError> {
        self.select_one(REPLIES, vec![("select", "*".to_string()), ("id", eq(id))])
            .await
    }

    async fn insert_reply(&self, reply: NewReply) -> Result<Reply, StoreError> {
        self.insert(REPLIES, &reply).await
    }

    async fn poll_for_post(&self, post_id: PostId) -> Result<Option<Poll>, StoreError> {
        self.select_one(
            POLLS,
            vec![("select", "*".to_string()), ("post_id", eq(post_id))],
        )
        .await
    }

    async fn insert_poll(&self, poll: NewPoll) -> Result<Poll, StoreError> {
        self.insert(POLLS, &poll).await
    }

    async fn list_votes(&self, poll_id: PollId) -> Result<Vec<Vote>, StoreError> {
        self.select(
            POLL_VOTES,
            vec![
                ("select", "poll_id,option_index".to_string()),
                ("poll_id", eq(poll_id)),
            ],
        )
        .await
    }

    async fn insert_vote(&self, vote: Vote) -> Result<(), StoreError> {
        let response = self
            .request(Method::POST, POLL_VOTES)
            .header(PREFER, "return=minimal")
            .json(&vote)
            .send()
            .await?;

        check(response).await.map(|_| ())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, StoreError> {
        self.select(
            CHANNELS,
            vec![
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>, StoreError> {
        self.select_one(CHANNELS, vec![("select", "*".to_string()), ("id", eq(id))])
            .await
    }

    async fn insert_channel(&self, channel: NewChannel) -> Result<Channel, StoreError> {
        self.insert(CHANNELS, &channel).await
    }

    #[instrument(skip(self))]
    async fn adjust_member_count(&self, id: ChannelId, delta: i64) -> Result<(), StoreError> {
        let function = if delta >= 0 {
            INCREMENT_MEMBERS
        } else {
            DECREMENT_MEMBERS
        };

        for _ in 0..delta.unsigned_abs() {
            self.rpc(function, id).await?;
        }

        Ok(())
    }

    async fn list_channel_posts(&self, channel_id: ChannelId) -> Result<Vec<Post>, StoreError> {
        self.select(
            POSTS,
            vec![
                ("select", "*".to_string()),
                ("channel_id", eq(channel_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn insert_report(&self, report: NewReport) -> Result<Report, StoreError> {
        self.insert(REPORTS, &report).await
    }
}
