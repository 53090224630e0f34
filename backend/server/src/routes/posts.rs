use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, instrument};

use crate::{
    blob::object_name,
    error::AppError,
    models::{NewPoll, Post},
    state,
    utils::{PaginationQuery, parse_post_id, read_post_form},
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub has_more: bool,
}

#[derive(Serialize)]
pub struct PostList {
    pub posts: Vec<Post>,
    pub pagination: Pagination,
}

pub async fn list_posts_handler(
    State(state): State<Arc<state::State>>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PostList>, AppError> {
    let page = query.to_page(state.config.page_limit, state.config.max_page_limit);
    let result = state.store.list_posts(page).await?;

    Ok(Json(PostList {
        posts: result.posts,
        pagination: Pagination {
            page: page.page,
            limit: page.limit,
            total: result.total,
            has_more: page.has_more(result.total),
        },
    }))
}

#[instrument(skip_all)]
pub async fn create_post_handler(
    State(state): State<Arc<state::State>>,
    multipart: Multipart,
) -> Result<Json<Post>, AppError> {
    let mut form = read_post_form(multipart, state.config.max_upload_bytes).await?;
    let (mut draft, image) = form.validate(true)?;

    let image_url = match image {
        Some(image) => {
            let name = object_name(&image.file_name, Utc::now());
            Some(
                state
                    .blobs
                    .upload(&name, &image.content_type, image.bytes)
                    .await?,
            )
        }
        None => None,
    };

    let poll = draft.poll.take();
    let post = state
        .store
        .insert_post(draft.into_new_post(None, image_url))
        .await?;
    info!("Created post {}", post.id);

    if let Some((question, options)) = poll {
        let poll = NewPoll {
            post_id: post.id,
            question,
            options,
        };

        // post is already stored at this point
        if let Err(e) = state.store.insert_poll(poll).await {
            error!("Error creating poll for post {}: {e}", post.id);
        }
    }

    Ok(Json(post))
}

pub async fn react_handler(
    State(state): State<Arc<state::State>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let post_id = parse_post_id(&id)?;

    let reactions = state
        .store
        .increment_reactions(post_id)
        .await?
        .ok_or(AppError::NotFound("Post not found"))?;

    Ok(Json(json!({ "reactions": reactions })))
}
