//! # Records
//!
//! Typed rows exchanged with the hosted backend, plus the request payloads
//! accepted by the routes.
//!
//! Rows are parsed once on ingress. Anything that does not fit these shapes
//! is a store error, so the rest of the crate never handles loose JSON.
//!
//! Column names follow the backend tables, which is why `hasImage` and
//! `hasPoll` keep their camel case while everything else is snake case.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub type PostId = i64;
pub type ReplyId = i64;
pub type PollId = i64;
pub type ChannelId = i64;

pub const MIN_POLL_OPTIONS: usize = 2;
pub const REPORT_PENDING: &str = "pending";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub description: String,
    pub author: String,
    #[serde(rename = "hasImage", default)]
    pub has_image: bool,
    #[serde(rename = "hasPoll", default)]
    pub has_poll: bool,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub reactions: i64,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPost {
    pub title: String,
    pub description: String,
    pub author: String,
    #[serde(rename = "hasImage")]
    pub has_image: bool,
    #[serde(rename = "hasPoll")]
    pub has_poll: bool,
    pub image: Option<String>,
    pub reactions: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub id: ReplyId,
    pub post_id: PostId,
    pub content: String,
    pub author: String,
    #[serde(default)]
    pub parent_id: Option<ReplyId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewReply {
    pub post_id: PostId,
    pub content: String,
    pub author: String,
    pub parent_id: Option<ReplyId>,
}

/// A fixed-option question attached to a post.
///
/// Rows with fewer than [`MIN_POLL_OPTIONS`] options are rejected while
/// deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PollRow")]
pub struct Poll {
    pub id: PollId,
    pub post_id: PostId,
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Deserialize)]
struct PollRow {
    id: PollId,
    post_id: PostId,
    question: String,
    options: Vec<String>,
}

impl TryFrom<PollRow> for Poll {
    type Error = String;

    fn try_from(row: PollRow) -> Result<Self, Self::Error> {
        if row.options.len() < MIN_POLL_OPTIONS {
            return Err(format!(
                "poll {} has {} options, need at least {MIN_POLL_OPTIONS}",
                row.id,
                row.options.len()
            ));
        }

        Ok(Self {
            id: row.id,
            post_id: row.post_id,
            question: row.question,
            options: row.options,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPoll {
    pub post_id: PostId,
    pub question: String,
    pub options: Vec<String>,
}

/// One row of the vote log. The index is signed so that a bad row decodes
/// and gets skipped by the tally instead of failing the whole poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub poll_id: PollId,
    pub option_index: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewChannel {
    pub name: String,
    pub description: String,
    pub member_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub post_id: PostId,
    pub post_title: String,
    pub post_author: String,
    pub category: String,
    pub reason: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewReport {
    pub post_id: PostId,
    pub post_title: String,
    pub post_author: String,
    pub category: String,
    pub reason: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Trims `value` and rejects it when nothing is left.
pub fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct CreateReplyRequest {
    pub content: Option<String>,
    pub author: Option<String>,
    pub parent_id: Option<ReplyId>,
}

impl CreateReplyRequest {
    pub fn validate(self, post_id: PostId) -> Result<NewReply, AppError> {
        match (required(self.content), required(self.author)) {
            (Some(content), Some(author)) => Ok(NewReply {
                post_id,
                content,
                author,
                parent_id: self.parent_id,
            }),
            _ => Err(AppError::BadRequest(
                "Content and author are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    #[serde(rename = "optionIndex")]
    pub option_index: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl CreateChannelRequest {
    pub fn validate(self) -> Result<NewChannel, AppError> {
        match (required(self.name), required(self.description)) {
            (Some(name), Some(description)) => Ok(NewChannel {
                name,
                description,
                member_count: 1,
            }),
            _ => Err(AppError::BadRequest(
                "Name and description are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    pub post_id: Option<PostId>,
    pub post_title: Option<String>,
    pub post_author: Option<String>,
    pub category: Option<String>,
    pub reason: Option<String>,
}

impl CreateReportRequest {
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewReport, AppError> {
        let fields = (
            self.post_id,
            required(self.post_title),
            required(self.post_author),
            required(self.category),
            required(self.reason),
        );

        match fields {
            (Some(post_id), Some(post_title), Some(post_author), Some(category), Some(reason)) => {
                Ok(NewReport {
                    post_id,
                    post_title,
                    post_author,
                    category,
                    reason,
                    status: REPORT_PENDING.to_string(),
                    created_at: now,
                })
            }
            _ => Err(AppError::BadRequest("Missing required fields".to_string())),
        }
    }
}
