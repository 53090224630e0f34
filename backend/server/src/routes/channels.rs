use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::{
    blob::object_name,
    error::AppError,
    models::{Channel, ChannelId, CreateChannelRequest, Post},
    state,
    utils::{client_id, parse_channel_id, read_post_form},
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipChange {
    pub success: bool,
    pub message: String,
    pub channel_id: ChannelId,
    pub channel_name: String,
}

async fn find_channel(state: &state::State, channel_id: ChannelId) -> Result<Channel, AppError> {
    state
        .store
        .get_channel(channel_id)
        .await?
        .ok_or(AppError::NotFound("Channel not found"))
}

pub async fn list_channels_handler(
    State(state): State<Arc<state::State>>,
) -> Result<Json<Vec<Channel>>, AppError> {
    Ok(Json(state.store.list_channels().await?))
}

#[instrument(skip(state, payload))]
pub async fn create_channel_handler(
    State(state): State<Arc<state::State>>,
    payload: Result<Json<CreateChannelRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Channel>), AppError> {
    let Json(payload) = payload?;
    let channel = state.store.insert_channel(payload.validate()?).await?;
    info!("Created channel {} ({})", channel.id, channel.name);

    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn joined_channels_handler(
    State(state): State<Arc<state::State>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChannelId>>, AppError> {
    let joined = match client_id(&headers) {
        Some(client) => state.joined_channels.list(&client).await?,
        None => Vec::new(),
    };

    Ok(Json(joined))
}

/// Without a client id every call counts, matching clients that keep
/// their own membership list.
async fn change_membership(
    state: &state::State,
    headers: &HeaderMap,
    raw_id: &str,
    joining: bool,
) -> Result<MembershipChange, AppError> {
    let channel_id = parse_channel_id(raw_id)?;
    let channel = find_channel(state, channel_id).await?;

    let changed = match client_id(headers) {
        Some(client) if joining => state.joined_channels.join(&client, channel_id).await?,
        Some(client) => state.joined_channels.leave(&client, channel_id).await?,
        None => true,
    };

    if changed {
        let delta = if joining { 1 } else { -1 };
        if let Err(e) = state.store.adjust_member_count(channel_id, delta).await {
            error!("Error updating member count for channel {channel_id}: {e}");
        }
    }

    let verb = if joining { "joined" } else { "left" };

    Ok(MembershipChange {
        success: true,
        message: format!("Successfully {verb} channel {}", channel.name),
        channel_id,
        channel_name: channel.name,
    })
}

pub async fn join_channel_handler(
    State(state): State<Arc<state::State>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MembershipChange>, AppError> {
    Ok(Json(change_membership(&state, &headers, &id, true).await?))
}

pub async fn leave_channel_handler(
    State(state): State<Arc<state::State>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MembershipChange>, AppError> {
    Ok(Json(change_membership(&state, &headers, &id, false).await?))
}

pub async fn list_channel_posts_handler(
    State(state): State<Arc<state::State>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Post>>, AppError> {
    let channel_id = parse_channel_id(&id)?;

    Ok(Json(state.store.list_channel_posts(channel_id).await?))
}

#[instrument(skip(state, multipart))]
pub async fn create_channel_post_handler(
    State(state): State<Arc<state::State>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let channel_id = parse_channel_id(&id)?;
    let mut form = read_post_form(multipart, state.config.max_upload_bytes).await?;
    let (draft, image) = form.validate(false)?;

    find_channel(&state, channel_id).await?;

    // channel posts go up without the image rather than failing
    let image_url = match image {
        Some(image) => {
            let name = object_name(&image.file_name, Utc::now());
            match state
                .blobs
                .upload(&name, &image.content_type, image.bytes)
                .await
            {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Error uploading image for channel {channel_id}: {e}");
                    None
                }
            }
        }
        None => None,
    };

    let post = state
        .store
        .insert_post(draft.into_new_post(Some(channel_id), image_url))
        .await?;
    info!("Created post {} in channel {channel_id}", post.id);

    Ok((StatusCode::CREATED, Json(post)))
}
