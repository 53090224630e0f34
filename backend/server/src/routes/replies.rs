use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use tracing::{info, instrument};

use crate::{
    error::AppError,
    models::{CreateReplyRequest, Reply},
    state,
    thread::{build_reply_tree, to_json},
    utils::parse_post_id,
};

pub async fn list_replies_handler(
    State(state): State<Arc<state::State>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Reply>>, AppError> {
    let post_id = parse_post_id(&id)?;

    Ok(Json(state.store.list_replies(post_id).await?))
}

/// Threads can nest thousands deep, so the body is written by
/// [`to_json`] instead of going through `Json`.
pub async fn reply_tree_handler(
    State(state): State<Arc<state::State>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let post_id = parse_post_id(&id)?;
    let replies = state.store.list_replies(post_id).await?;
    let body = to_json(&build_reply_tree(&replies))?;

    Ok(([(CONTENT_TYPE, "application/json")], body).into_response())
}

#[instrument(skip(state, payload))]
pub async fn create_reply_handler(
    State(state): State<Arc<state::State>>,
    Path(id): Path<String>,
    payload: Result<Json<CreateReplyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Reply>), AppError> {
    let post_id = parse_post_id(&id)?;
    let Json(payload) = payload?;
    let reply = payload.validate(post_id)?;

    if let Some(parent_id) = reply.parent_id {
        let parent = state
            .store
            .get_reply(parent_id)
            .await?
            .ok_or_else(|| AppError::BadRequest("Invalid parent reply".to_string()))?;

        if parent.post_id != post_id {
            return Err(AppError::BadRequest(
                "Parent reply must belong to the same post".to_string(),
            ));
        }
    }

    let reply = state.store.insert_reply(reply).await?;
    info!("Reply {} added to post {post_id}", reply.id);

    Ok((StatusCode::CREATED, Json(reply)))
}
