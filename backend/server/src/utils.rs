use axum::{
    extract::{Multipart, multipart::Field},
    http::HeaderMap,
};
use serde::Deserialize;
use tracing::warn;

use crate::{
    error::AppError,
    membership::valid_client_id,
    models::{ChannelId, MIN_POLL_OPTIONS, NewPost, PostId, required},
    store::Page,
};

pub const CLIENT_ID_HEADER: &str = "x-client-id";

pub fn parse_post_id(raw: &str) -> Result<PostId, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid post ID".to_string()))
}

pub fn parse_channel_id(raw: &str) -> Result<ChannelId, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid channel ID".to_string()))
}

/// The caller's `X-Client-Id`, if present and well formed.
pub fn client_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CLIENT_ID_HEADER)?.to_str().ok()?;

    if valid_client_id(value) {
        Some(value.to_string())
    } else {
        warn!("Ignoring malformed client id");
        None
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PaginationQuery {
    /// Unparseable or zero values fall back to the first page and the
    /// default limit. The limit is capped at `max_limit`.
    pub fn to_page(&self, default_limit: u32, max_limit: u32) -> Page {
        let parse = |value: &Option<String>| {
            value
                .as_deref()
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|&v| v > 0)
        };

        Page {
            page: parse(&self.page).unwrap_or(1),
            limit: parse(&self.limit)
                .unwrap_or(default_limit)
                .min(max_limit.max(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Multipart body of a new post, before validation.
#[derive(Debug, Default)]
pub struct PostForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub has_image: bool,
    pub has_poll: bool,
    pub poll_question: Option<String>,
    pub poll_options: Option<String>,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub description: String,
    pub author: String,
    pub has_poll: bool,
    pub poll: Option<(String, Vec<String>)>,
}

impl PostDraft {
    pub fn into_new_post(self, channel_id: Option<ChannelId>, image: Option<String>) -> NewPost {
        NewPost {
            title: self.title,
            description: self.description,
            author: self.author,
            has_image: image.is_some(),
            has_poll: self.has_poll,
            image,
            reactions: 0,
            channel_id,
        }
    }
}

impl PostForm {
    /// Checks the required text fields and, when `allow_poll` is set, the
    /// poll question and options. Takes the image out of the form.
    pub fn validate(&mut self, allow_poll: bool) -> Result<(PostDraft, Option<ImageUpload>), AppError> {
        let (Some(title), Some(description), Some(author)) = (
            required(self.title.take()),
            required(self.description.take()),
            required(self.author.take()),
        ) else {
            return Err(AppError::BadRequest(
                "Title, description, and author are required".to_string(),
            ));
        };

        let has_poll = allow_poll && self.has_poll;
        let poll = if has_poll {
            Some(self.poll()?)
        } else {
            None
        };

        let image = self
            .image
            .take()
            .filter(|image| self.has_image && !image.bytes.is_empty());

        Ok((
            PostDraft {
                title,
                description,
                author,
                has_poll,
                poll,
            },
            image,
        ))
    }

    fn poll(&mut self) -> Result<(String, Vec<String>), AppError> {
        let invalid = || {
            AppError::BadRequest(format!(
                "Poll needs a question and at least {MIN_POLL_OPTIONS} options"
            ))
        };

        let question = required(self.poll_question.take()).ok_or_else(invalid)?;
        let raw = self.poll_options.take().ok_or_else(invalid)?;

        let options: Vec<String> = serde_json::from_str::<Vec<String>>(&raw)
            .map_err(|_| invalid())?
            .into_iter()
            .filter_map(|option| required(Some(option)))
            .collect();

        if options.len() < MIN_POLL_OPTIONS {
            return Err(invalid());
        }

        Ok((question, options))
    }
}

fn flag(value: &str) -> bool {
    value.trim() == "true"
}

async fn text(field: Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed form field: {e}")))
}

pub async fn read_post_form(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<PostForm, AppError> {
    let mut form = PostForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed form: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "title" => form.title = Some(text(field).await?),
            "description" => form.description = Some(text(field).await?),
            "author" => form.author = Some(text(field).await?),
            "hasImage" => form.has_image = flag(&text(field).await?),
            "hasPoll" => form.has_poll = flag(&text(field).await?),
            "pollQuestion" => form.poll_question = Some(text(field).await?),
            "pollOptions" => form.poll_options = Some(text(field).await?),
            "image" => {
                let file_name = field.file_name().unwrap_or("image").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Malformed image: {e}")))?;

                if bytes.len() > max_upload_bytes {
                    return Err(AppError::BadRequest("Image too large".to_string()));
                }

                form.image = Some(ImageUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    Ok(form)
}
